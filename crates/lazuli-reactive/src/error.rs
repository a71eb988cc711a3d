//! Reactive engine error types.

use lazuli_loader::LoadError;
use thiserror::Error;

use crate::ids::{ComputationId, ContainerId};

/// Result type for engine operations.
pub type ReactiveResult<T> = Result<T, ReactiveError>;

/// Engine errors.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ReactiveError {
	/// Resolving a computation's code failed.
	#[error(transparent)]
	Load(#[from] LoadError),

	/// No computation is registered under the id.
	#[error("unknown computation: {0}")]
	UnknownComputation(ComputationId),

	/// No live container is registered under the id.
	#[error("unknown container: {0}")]
	UnknownContainer(ContainerId),

	/// A container with this id is already live.
	#[error("container '{0}' is already registered")]
	DuplicateContainer(ContainerId),

	/// A computation with this id is already registered.
	#[error("computation '{0}' is already registered")]
	DuplicateComputation(ComputationId),

	/// A synchronous run was requested before the computation's code was loaded.
	#[error("computation '{0}' has not been resolved yet")]
	NotResolved(ComputationId),

	/// A computation failed while running.
	#[error("computation '{id}' failed: {source}")]
	Computation {
		/// The failing computation.
		id: ComputationId,
		/// The reported failure.
		source: ComputationError,
	},

	/// A serialized graph references something resume could not find.
	#[error("stale reference: {0}")]
	StaleReference(StaleReference),

	/// A computation input or property value could not be (de)serialized.
	#[error("serialization error: {0}")]
	Serialization(String),

	/// Configuration error.
	#[error("configuration error: {0}")]
	Config(String),
}

impl From<serde_json::Error> for ReactiveError {
	fn from(err: serde_json::Error) -> Self {
		Self::Serialization(err.to_string())
	}
}

impl From<toml::de::Error> for ReactiveError {
	fn from(err: toml::de::Error) -> Self {
		Self::Config(err.to_string())
	}
}

/// Failure reported by a computation's own code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ComputationError {
	message: String,
}

impl ComputationError {
	/// Creates a computation error with the given message.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}

	/// Returns the message.
	pub fn message(&self) -> &str {
		&self.message
	}
}

impl From<ReactiveError> for ComputationError {
	fn from(err: ReactiveError) -> Self {
		Self::new(err.to_string())
	}
}

impl From<LoadError> for ComputationError {
	fn from(err: LoadError) -> Self {
		Self::new(err.to_string())
	}
}

impl From<serde_json::Error> for ComputationError {
	fn from(err: serde_json::Error) -> Self {
		Self::new(err.to_string())
	}
}

impl From<anyhow::Error> for ComputationError {
	fn from(err: anyhow::Error) -> Self {
		Self::new(format!("{err:#}"))
	}
}

/// An entry of a serialized graph that could not be reattached on resume.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StaleReference {
	/// A subscription names a container that was not restored.
	#[error("subscription {computation} -> {container}.{key} references a missing container")]
	SubscriptionContainer {
		/// Missing container.
		container: ContainerId,
		/// Property key of the edge.
		key: String,
		/// Subscribing computation.
		computation: ComputationId,
	},

	/// A subscription names a computation that was not restored.
	#[error("subscription {computation} -> {container}.{key} references a missing computation")]
	SubscriptionComputation {
		/// Container of the edge.
		container: ContainerId,
		/// Property key of the edge.
		key: String,
		/// Missing computation.
		computation: ComputationId,
	},

	/// A computation is owned by a container that was not restored.
	#[error("computation {computation} is owned by missing container {owner}")]
	ComputationOwner {
		/// The orphaned computation.
		computation: ComputationId,
		/// Missing owner.
		owner: ContainerId,
	},
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_computation_error_from_reactive_error() {
		let err: ComputationError =
			ReactiveError::UnknownContainer(ContainerId::new("s9")).into();
		assert_eq!(err.message(), "unknown container: s9");
	}

	#[rstest]
	fn test_stale_reference_display() {
		let stale = StaleReference::SubscriptionContainer {
			container: ContainerId::new("missing-1"),
			key: "count".to_string(),
			computation: ComputationId::new("c0"),
		};
		assert_eq!(
			stale.to_string(),
			"subscription c0 -> missing-1.count references a missing container"
		);
	}

	#[rstest]
	fn test_load_error_is_transparent() {
		let err = ReactiveError::from(LoadError::UnknownSymbol("f".to_string()));
		assert_eq!(
			err.to_string(),
			"symbol 'f' is not listed in the chunk manifest"
		);
	}
}
