//! Deferred References
//!
//! A [`DeferredRef`] names a symbol inside a chunk without loading it. It is a
//! tagged value: either unresolved (only the chunk location and symbol name are
//! known) or resolved (the loaded symbol is cached alongside).
//!
//! Clones share the resolution cache, so resolving one clone resolves all of
//! them. Only the `(chunk, symbol)` pair is serialized; a resolved value never
//! crosses a process boundary.

use core::any::Any;
use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::chunk::{ChunkLocation, Symbol};

/// Resolution state of a deferred reference.
#[derive(Clone, Default)]
pub enum RefState {
	/// Only the address of the symbol is known.
	#[default]
	Unresolved,
	/// The symbol has been loaded.
	Resolved(Symbol),
}

impl fmt::Debug for RefState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Unresolved => f.write_str("Unresolved"),
			Self::Resolved(_) => f.write_str("Resolved(..)"),
		}
	}
}

/// A lazily resolvable pointer to a named symbol inside a loadable chunk.
#[derive(Clone)]
pub struct DeferredRef {
	chunk: ChunkLocation,
	symbol: Rc<str>,
	state: Rc<RefCell<RefState>>,
}

impl DeferredRef {
	/// Creates an unresolved reference.
	pub fn new(chunk: impl Into<ChunkLocation>, symbol: impl AsRef<str>) -> Self {
		Self {
			chunk: chunk.into(),
			symbol: Rc::from(symbol.as_ref()),
			state: Rc::new(RefCell::new(RefState::Unresolved)),
		}
	}

	/// Returns the chunk location.
	pub fn chunk(&self) -> &ChunkLocation {
		&self.chunk
	}

	/// Returns the symbol name.
	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	/// Returns the cached symbol, if resolved.
	pub fn resolved(&self) -> Option<Symbol> {
		match &*self.state.borrow() {
			RefState::Resolved(value) => Some(Rc::clone(value)),
			RefState::Unresolved => None,
		}
	}

	/// Returns the cached symbol downcast to `T`, if resolved and of that type.
	pub fn resolved_as<T: Any>(&self) -> Option<Rc<T>> {
		self.resolved().and_then(|value| value.downcast::<T>().ok())
	}

	/// Returns `true` once the symbol has been loaded.
	pub fn is_resolved(&self) -> bool {
		matches!(&*self.state.borrow(), RefState::Resolved(_))
	}

	/// Returns a copy of the current state.
	pub fn state(&self) -> RefState {
		self.state.borrow().clone()
	}

	/// Stores the loaded symbol. Used by the loader.
	pub(crate) fn set_resolved(&self, value: Symbol) {
		*self.state.borrow_mut() = RefState::Resolved(value);
	}

	/// Returns a fresh, unresolved reference to the same symbol that does not
	/// share this reference's cache.
	pub fn detached(&self) -> Self {
		Self::new(self.chunk.clone(), &*self.symbol)
	}
}

impl PartialEq for DeferredRef {
	fn eq(&self, other: &Self) -> bool {
		self.chunk == other.chunk && self.symbol == other.symbol
	}
}

impl Eq for DeferredRef {}

impl fmt::Debug for DeferredRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DeferredRef")
			.field("chunk", &self.chunk)
			.field("symbol", &&*self.symbol)
			.field("state", &*self.state.borrow())
			.finish()
	}
}

impl fmt::Display for DeferredRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}#{}", self.chunk, self.symbol)
	}
}

/// Wire form of a [`DeferredRef`].
#[derive(Serialize, Deserialize)]
struct DeferredRefRepr {
	chunk: ChunkLocation,
	symbol: String,
}

impl Serialize for DeferredRef {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		DeferredRefRepr {
			chunk: self.chunk.clone(),
			symbol: self.symbol.to_string(),
		}
		.serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for DeferredRef {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let repr = DeferredRefRepr::deserialize(deserializer)?;
		Ok(Self::new(repr.chunk, repr.symbol))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_new_reference_is_unresolved() {
		let r = DeferredRef::new("c1", "f");
		assert!(!r.is_resolved());
		assert!(r.resolved().is_none());
		assert!(matches!(r.state(), RefState::Unresolved));
		assert_eq!(r.to_string(), "c1#f");
	}

	#[rstest]
	fn test_clones_share_resolution() {
		let r = DeferredRef::new("c1", "f");
		let clone = r.clone();

		r.set_resolved(Rc::new(7_i32));

		assert!(clone.is_resolved());
		assert_eq!(clone.resolved_as::<i32>().as_deref(), Some(&7));
		assert!(clone.resolved_as::<String>().is_none());
	}

	#[rstest]
	fn test_detached_does_not_share_cache() {
		let r = DeferredRef::new("c1", "f");
		r.set_resolved(Rc::new(1_u8));

		let detached = r.detached();
		assert_eq!(detached, r);
		assert!(!detached.is_resolved());
	}

	#[rstest]
	fn test_serialization_drops_resolved_value() {
		let r = DeferredRef::new("c1", "f");
		r.set_resolved(Rc::new(1_u8));

		let json = serde_json::to_value(&r).unwrap();
		assert_eq!(json, serde_json::json!({"chunk": "c1", "symbol": "f"}));

		let back: DeferredRef = serde_json::from_value(json).unwrap();
		assert_eq!(back, r);
		assert!(!back.is_resolved());
	}
}
