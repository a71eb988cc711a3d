//! Deferred references and chunk loading.
//!
//! A [`DeferredRef`](lazuli_loader::DeferredRef) names a symbol inside a
//! chunk without loading it. The [`ChunkLoader`](lazuli_loader::ChunkLoader)
//! loads each chunk at most once, however many references resolve through it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use lazuli::loader::{ChunkLoader, DeferredRef, StaticFetcher};
//! ```

#[cfg(feature = "loader")]
pub use lazuli_loader::*;
