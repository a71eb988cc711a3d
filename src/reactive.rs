//! Stores, the subscription graph, flushing and resume.
//!
//! # Examples
//!
//! ```rust,no_run
//! use lazuli::reactive::{Runtime, SerializedGraph, Store};
//! ```

#[cfg(feature = "reactive")]
pub use lazuli_reactive::*;
