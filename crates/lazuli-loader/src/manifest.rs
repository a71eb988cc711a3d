//! Chunk manifest.
//!
//! The build tool emits a mapping from symbol name to the chunk that exports
//! it. The engine treats it as an opaque lookup table supplied at startup and
//! never validates it against the chunks themselves.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkLocation;
use crate::deferred::DeferredRef;
use crate::error::{LoadError, LoadResult};

/// Symbol name to chunk location table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
	symbols: BTreeMap<String, ChunkLocation>,
}

impl ChunkManifest {
	/// Creates an empty manifest.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a mapping, returning `self` for chaining.
	pub fn with(mut self, symbol: impl Into<String>, chunk: impl Into<ChunkLocation>) -> Self {
		self.insert(symbol, chunk);
		self
	}

	/// Adds or replaces a mapping.
	pub fn insert(&mut self, symbol: impl Into<String>, chunk: impl Into<ChunkLocation>) {
		self.symbols.insert(symbol.into(), chunk.into());
	}

	/// Returns the chunk that exports `symbol`.
	pub fn lookup(&self, symbol: &str) -> Option<&ChunkLocation> {
		self.symbols.get(symbol)
	}

	/// Mints an unresolved [`DeferredRef`] for `symbol`.
	///
	/// # Errors
	///
	/// Returns [`LoadError::UnknownSymbol`] if the manifest has no entry.
	pub fn deferred(&self, symbol: &str) -> LoadResult<DeferredRef> {
		self.lookup(symbol)
			.map(|chunk| DeferredRef::new(chunk.clone(), symbol))
			.ok_or_else(|| LoadError::UnknownSymbol(symbol.to_string()))
	}

	/// Returns the number of symbols.
	pub fn len(&self) -> usize {
		self.symbols.len()
	}

	/// Returns `true` if the manifest is empty.
	pub fn is_empty(&self) -> bool {
		self.symbols.is_empty()
	}

	/// Parses a manifest from JSON of the form `{"symbols": {"name": "chunk"}}`.
	pub fn from_json(json: &str) -> LoadResult<Self> {
		Ok(serde_json::from_str(json)?)
	}

	/// Serializes the manifest to JSON.
	pub fn to_json(&self) -> LoadResult<String> {
		Ok(serde_json::to_string(self)?)
	}
}
