//! Loader error types.

use thiserror::Error;

use crate::chunk::ChunkLocation;

/// Result type for chunk loading and symbol resolution.
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors raised while resolving a deferred reference.
///
/// `LoadError` is `Clone` because the outcome of a single chunk load is
/// shared by every caller that was waiting on that chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LoadError {
	/// The chunk manifest has no entry for the symbol.
	#[error("symbol '{0}' is not listed in the chunk manifest")]
	UnknownSymbol(String),

	/// The chunk could not be fetched or its top-level evaluation failed.
	///
	/// This is sticky: every pending and future resolve against the chunk
	/// fails with the same error.
	#[error("chunk '{chunk}' failed to load: {message}")]
	ChunkFailed {
		/// Location of the failed chunk.
		chunk: ChunkLocation,
		/// Failure description.
		message: String,
	},

	/// The chunk loaded but does not export the requested symbol.
	#[error("chunk '{chunk}' has no symbol '{symbol}'")]
	SymbolNotFound {
		/// Location of the loaded chunk.
		chunk: ChunkLocation,
		/// Missing symbol name.
		symbol: String,
	},

	/// The symbol exists but is not of the requested type.
	#[error("symbol '{symbol}' in chunk '{chunk}' is not a {expected}")]
	TypeMismatch {
		/// Location of the loaded chunk.
		chunk: ChunkLocation,
		/// Symbol name.
		symbol: String,
		/// Name of the expected Rust type.
		expected: &'static str,
	},

	/// Manifest parsing error.
	#[error("failed to parse chunk manifest: {0}")]
	ManifestParse(String),
}

impl LoadError {
	/// Creates a [`LoadError::ChunkFailed`] for the given chunk.
	pub fn chunk_failed(chunk: &ChunkLocation, message: impl Into<String>) -> Self {
		Self::ChunkFailed {
			chunk: chunk.clone(),
			message: message.into(),
		}
	}

	/// Returns `true` if the error is permanent for the whole chunk.
	pub fn is_chunk_failure(&self) -> bool {
		matches!(self, Self::ChunkFailed { .. })
	}
}

impl From<serde_json::Error> for LoadError {
	fn from(err: serde_json::Error) -> Self {
		Self::ManifestParse(err.to_string())
	}
}
