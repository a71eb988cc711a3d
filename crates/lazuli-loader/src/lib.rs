//! # Lazuli Loader
//!
//! Deferred symbol references and memoized chunk loading.
//!
//! Every unit of behavior the reactive engine may need to invoke is addressed
//! by a [`DeferredRef`]: a `(chunk, symbol)` pair that is only loaded when it is
//! actually needed. The [`ChunkLoader`] resolves references through a
//! host-provided [`ChunkFetcher`], loading each chunk at most once.
//!
//! ## Example
//!
//! ```
//! use std::rc::Rc;
//! use lazuli_loader::{Chunk, ChunkLoader, ChunkManifest, StaticFetcher};
//!
//! let fetcher = StaticFetcher::new().with_chunk("q-counter.js", |location| {
//!     Ok(Chunk::builder(location.clone()).symbol("step", 1_i64).build())
//! });
//! let loader = ChunkLoader::new(Rc::new(fetcher));
//! let manifest = ChunkManifest::new().with("step", "q-counter.js");
//!
//! let step = manifest.deferred("step").unwrap();
//! let value = futures::executor::block_on(loader.resolve_as::<i64>(&step)).unwrap();
//! assert_eq!(*value, 1);
//! ```

pub mod chunk;
pub mod deferred;
pub mod error;
pub mod loader;
pub mod manifest;

pub use chunk::{Chunk, ChunkBuilder, ChunkLocation, Symbol};
pub use deferred::{DeferredRef, RefState};
pub use error::{LoadError, LoadResult};
pub use loader::{ChunkFetcher, ChunkLoader, StaticFetcher};
pub use manifest::ChunkManifest;

// Re-exported so hosts can implement `ChunkFetcher` without naming the crate.
pub use async_trait::async_trait;
