//! Loadable code chunks.
//!
//! A chunk is the unit the build tool splits code into. Once loaded it is a
//! table of named symbols; the loader only ever evaluates a chunk once and
//! then performs independent lookups into the table.

use core::any::Any;
use core::fmt;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// A type-erased exported value.
pub type Symbol = Rc<dyn Any>;

/// Opaque location of a loadable chunk (a URL, a path, a module id...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkLocation(String);

impl ChunkLocation {
	/// Creates a chunk location.
	pub fn new(location: impl Into<String>) -> Self {
		Self(location.into())
	}

	/// Returns the location as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ChunkLocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ChunkLocation {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for ChunkLocation {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// An evaluated chunk: its location and the symbols it exports.
pub struct Chunk {
	location: ChunkLocation,
	symbols: HashMap<String, Symbol>,
}

impl Chunk {
	/// Starts building a chunk for the given location.
	pub fn builder(location: impl Into<ChunkLocation>) -> ChunkBuilder {
		ChunkBuilder {
			location: location.into(),
			symbols: HashMap::new(),
		}
	}

	/// Returns the chunk location.
	pub fn location(&self) -> &ChunkLocation {
		&self.location
	}

	/// Looks up an exported symbol.
	pub fn get(&self, name: &str) -> Option<Symbol> {
		self.symbols.get(name).cloned()
	}

	/// Returns `true` if the chunk exports `name`.
	pub fn contains(&self, name: &str) -> bool {
		self.symbols.contains_key(name)
	}

	/// Returns the exported symbol names.
	pub fn symbol_names(&self) -> impl Iterator<Item = &str> {
		self.symbols.keys().map(String::as_str)
	}

	/// Returns the number of exported symbols.
	pub fn len(&self) -> usize {
		self.symbols.len()
	}

	/// Returns `true` if the chunk exports nothing.
	pub fn is_empty(&self) -> bool {
		self.symbols.is_empty()
	}
}

impl fmt::Debug for Chunk {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut names: Vec<_> = self.symbol_names().collect();
		names.sort_unstable();
		f.debug_struct("Chunk")
			.field("location", &self.location)
			.field("symbols", &names)
			.finish()
	}
}

/// Builder for [`Chunk`].
pub struct ChunkBuilder {
	location: ChunkLocation,
	symbols: HashMap<String, Symbol>,
}

impl ChunkBuilder {
	/// Exports `value` under `name`.
	pub fn symbol<T: Any>(mut self, name: impl Into<String>, value: T) -> Self {
		self.symbols.insert(name.into(), Rc::new(value));
		self
	}

	/// Exports an already type-erased symbol under `name`.
	pub fn erased(mut self, name: impl Into<String>, value: Symbol) -> Self {
		self.symbols.insert(name.into(), value);
		self
	}

	/// Finishes the chunk.
	pub fn build(self) -> Chunk {
		Chunk {
			location: self.location,
			symbols: self.symbols,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_chunk_builder_exports_symbols() {
		let chunk = Chunk::builder("c1")
			.symbol("answer", 42_u32)
			.symbol("greeting", "hello")
			.build();

		assert_eq!(chunk.location().as_str(), "c1");
		assert_eq!(chunk.len(), 2);
		assert!(chunk.contains("answer"));

		let answer = chunk.get("answer").unwrap();
		assert_eq!(answer.downcast_ref::<u32>(), Some(&42));
		assert!(chunk.get("missing").is_none());
	}

	#[rstest]
	fn test_chunk_location_serializes_transparently() {
		let location = ChunkLocation::new("/build/q-abc123.js");
		let json = serde_json::to_string(&location).unwrap();
		assert_eq!(json, r#""/build/q-abc123.js""#);
	}
}
