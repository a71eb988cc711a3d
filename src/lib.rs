//! # Lazuli
//!
//! A resumable reactivity engine.
//!
//! Application state lives in reactive stores. Computations that read a store
//! property subscribe to it, and writing the property schedules them to run
//! again. Computation code is referenced lazily, by chunk and symbol, so a
//! runtime can be serialized after server-side rendering and resumed on the
//! client without executing or even loading any code until a value changes.
//!
//! ## Feature Flags
//!
//! - `loader` - Deferred references and the memoized chunk loader
//! - `reactive` - Stores, subscription graph, scheduler and resume (implies `loader`)
//! - `tokio-scheduler` - `LocalSpawnScheduler`, which spawns flushes onto a tokio `LocalSet`
//! - `full` (default) - All of the above
//!
//! ## Quick Example
//!
//! ```rust
//! use std::rc::Rc;
//! use lazuli::prelude::*;
//! use serde_json::json;
//!
//! fn fetcher() -> Rc<StaticFetcher> {
//!     Rc::new(StaticFetcher::new().with_chunk("q-greeting.js", |location| {
//!         Ok(Chunk::builder(location.clone())
//!             .symbol(
//!                 "Greeting_render",
//!                 Render::new(|scope| {
//!                     let store = scope.input_store("store")?;
//!                     let name: String = store.get_as("name")?.unwrap_or_default();
//!                     Ok(json!(format!("hello, {name}")))
//!                 }),
//!             )
//!             .build())
//!     }))
//! }
//!
//! // Server: run once and serialize the graph.
//! let server = Runtime::builder(fetcher()).build();
//! let state = futures::executor::block_on(async {
//!     let store = server.create_store(Container::new().with("name", "world"));
//!     let spec = ComputationSpec::new(DeferredRef::new("q-greeting.js", "Greeting_render"))
//!         .inputs(json!({ "store": store.id() }));
//!     server.mount(spec).await.unwrap();
//!     server.serialize().to_script_tag().unwrap()
//! });
//!
//! // Client: resume without running anything, then react to a write.
//! let client = Runtime::builder(fetcher()).build();
//! let graph = SerializedGraph::from_script_tag(&state).unwrap();
//! let resumed = client.resume(&graph).unwrap();
//! assert!(client.loader().loaded_chunks().is_empty());
//!
//! resumed.store("s0").unwrap().set("name", "lazuli").unwrap();
//! let report = futures::executor::block_on(client.flush());
//! assert_eq!(report.ran.len(), 1);
//! ```

pub mod loader;
pub mod reactive;

// Re-export loader
#[cfg(feature = "loader")]
pub use lazuli_loader::{
	Chunk, ChunkFetcher, ChunkLoader, ChunkLocation, ChunkManifest, DeferredRef, LoadError,
	LoadResult, StaticFetcher,
};

// Re-export reactive runtime
#[cfg(feature = "reactive")]
pub use lazuli_reactive::{
	ComputationError, ComputationId, ComputationSpec, ComputationState, Container, ContainerId,
	FlushReport, LogSink, ManualScheduler, ReactiveError, ReactiveResult, Render, RenderSink,
	ResumeReport, Resumed, Runtime, RuntimeConfig, Scheduler, Scope, SerializedGraph, Store,
};

#[cfg(feature = "tokio-scheduler")]
pub use lazuli_reactive::LocalSpawnScheduler;

/// Prelude module for convenient imports
///
/// Import everything commonly needed with:
/// ```rust
/// use lazuli::prelude::*;
/// ```
pub mod prelude {
	// Loader feature
	#[cfg(feature = "loader")]
	pub use crate::{Chunk, ChunkFetcher, ChunkLocation, ChunkManifest, DeferredRef, StaticFetcher};

	// Reactive feature
	#[cfg(feature = "reactive")]
	pub use crate::{
		ComputationSpec, ComputationState, Container, ContainerId, ReactiveError, ReactiveResult,
		Render, RenderSink, Runtime, RuntimeConfig, Scheduler, SerializedGraph, Store,
	};
}
