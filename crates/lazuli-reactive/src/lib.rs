//! # Lazuli Reactive
//!
//! A resumable reactivity engine.
//!
//! Computations read [`Store`] properties; each read made while a computation
//! runs is recorded in a [`SubscriptionGraph`]. A write marks the subscribers
//! of its key dirty and hands a single coalesced flush to the host's
//! [`Scheduler`]. The flush loads each dirty computation's code through a
//! [`DeferredRef`](lazuli_loader::DeferredRef) and re-runs it.
//!
//! Because computations are addressed by deferred references rather than
//! closures, the whole graph can be [serialized](Runtime::serialize) and
//! [resumed](Runtime::resume) in another process without re-running
//! anything.
//!
//! ## Example
//!
//! ```
//! use std::rc::Rc;
//! use lazuli_loader::{Chunk, ChunkManifest, StaticFetcher};
//! use lazuli_reactive::{ComputationSpec, Container, Render, Runtime};
//! use serde_json::json;
//!
//! let fetcher = StaticFetcher::new().with_chunk("q-counter.js", |location| {
//!     Ok(Chunk::builder(location.clone())
//!         .symbol(
//!             "Counter_render",
//!             Render::new(|scope| {
//!                 let store = scope.input_store("store")?;
//!                 Ok(json!({ "count": store.get("count") }))
//!             }),
//!         )
//!         .build())
//! });
//! let manifest = ChunkManifest::new().with("Counter_render", "q-counter.js");
//! let runtime = Runtime::builder(Rc::new(fetcher)).build();
//!
//! futures::executor::block_on(async {
//!     let store = runtime.create_store(Container::new().with("count", 0));
//!     let spec = ComputationSpec::new(manifest.deferred("Counter_render").unwrap())
//!         .inputs(json!({ "store": store.id() }));
//!     let counter = runtime.mount(spec).await.unwrap();
//!
//!     store.set("count", 1).unwrap();
//!     let report = runtime.flush().await;
//!
//!     assert_eq!(report.ran, vec![counter.clone()]);
//!     assert_eq!(runtime.last_output(&counter), Some(json!({ "count": 1 })));
//! });
//! ```

pub mod computation;
pub mod config;
pub mod error;
pub mod graph;
pub mod ids;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod sink;
pub mod snapshot;
pub mod store;

pub use computation::{ComputationSpec, ComputationState, Render, Scope};
pub use config::RuntimeConfig;
pub use error::{ComputationError, ReactiveError, ReactiveResult, StaleReference};
pub use graph::{PropertyKey, Subscription, SubscriptionGraph};
pub use ids::{ComputationId, ContainerId};
pub use queue::InvalidationQueue;
pub use runtime::{FlushReport, Runtime, RuntimeBuilder};
#[cfg(feature = "tokio")]
pub use scheduler::LocalSpawnScheduler;
pub use scheduler::{FlushTask, ManualScheduler, Scheduler};
pub use sink::{ChannelSink, LogSink, RenderEvent, RenderSink};
pub use snapshot::{
	ComputationDescriptor, ContainerDescriptor, ResumeReport, Resumed, STATE_SCRIPT_ID,
	SerializedGraph,
};
pub use store::{Container, Store};
