//! Stable identifiers for containers and computations.
//!
//! Identifiers are strings rather than counters because they must survive
//! serialization: a computation resumed in another process is looked up by
//! the same id it had when the graph was exported.

use core::borrow::Borrow;
use core::cell::Cell;
use core::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			/// Creates an identifier from any string.
			pub fn new(id: impl Into<String>) -> Self {
				Self(id.into())
			}

			/// Returns the identifier as a string slice.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<&str> for $name {
			fn from(value: &str) -> Self {
				Self::new(value)
			}
		}

		impl From<String> for $name {
			fn from(value: String) -> Self {
				Self(value)
			}
		}

		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}

		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
	};
}

string_id! {
	/// Identifier of a reactive container (a store).
	ContainerId
}

string_id! {
	/// Identifier of a computation.
	ComputationId
}

/// Mints `prefix` + counter identifiers, skipping any already taken.
#[derive(Debug)]
pub(crate) struct IdGenerator {
	prefix: String,
	next: Cell<u64>,
}

impl IdGenerator {
	pub(crate) fn new(prefix: impl Into<String>) -> Self {
		Self {
			prefix: prefix.into(),
			next: Cell::new(0),
		}
	}

	/// Returns the next id for which `taken` is false.
	pub(crate) fn next(&self, taken: impl Fn(&str) -> bool) -> String {
		loop {
			let n = self.next.get();
			self.next.set(n + 1);
			let candidate = format!("{}{}", self.prefix, n);
			if !taken(&candidate) {
				return candidate;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_generator_skips_taken_ids() {
		let ids = IdGenerator::new("c");
		let taken = ["c0", "c1", "c3"];

		let first = ids.next(|candidate| taken.contains(&candidate));
		let second = ids.next(|candidate| taken.contains(&candidate));

		assert_eq!(first, "c2");
		assert_eq!(second, "c4");
	}

	#[rstest]
	fn test_ids_serialize_as_plain_strings() {
		let id = ContainerId::new("s0");
		assert_eq!(serde_json::to_string(&id).unwrap(), r#""s0""#);
		let back: ComputationId = serde_json::from_str(r#""c7""#).unwrap();
		assert_eq!(back.as_str(), "c7");
	}
}
