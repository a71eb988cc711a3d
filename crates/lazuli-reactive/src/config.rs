//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::ReactiveResult;

/// Default prefix for generated container ids.
const DEFAULT_CONTAINER_PREFIX: &str = "s";
/// Default prefix for generated computation ids.
const DEFAULT_COMPUTATION_PREFIX: &str = "c";

/// Runtime configuration
///
/// # Examples
///
/// ```
/// use lazuli_reactive::RuntimeConfig;
///
/// let config = RuntimeConfig::default()
///     .with_container_id_prefix("client-s")
///     .with_strict_resume(true);
/// assert_eq!(config.container_id_prefix(), "client-s");
///
/// let from_toml = RuntimeConfig::from_toml_str(
///     r#"
///     computation_id_prefix = "srv-c"
///     max_flush_passes = 16
///     "#,
/// )
/// .unwrap();
/// assert_eq!(from_toml.max_flush_passes(), Some(16));
/// assert_eq!(from_toml.container_id_prefix(), "s");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
	container_id_prefix: String,
	computation_id_prefix: String,
	strict_resume: bool,
	max_flush_passes: Option<usize>,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			container_id_prefix: DEFAULT_CONTAINER_PREFIX.to_string(),
			computation_id_prefix: DEFAULT_COMPUTATION_PREFIX.to_string(),
			strict_resume: false,
			max_flush_passes: None,
		}
	}
}

impl RuntimeConfig {
	/// Parses a configuration from TOML. Missing keys take their defaults.
	pub fn from_toml_str(source: &str) -> ReactiveResult<Self> {
		Ok(toml::from_str(source)?)
	}

	/// Prefix for generated container ids.
	pub fn container_id_prefix(&self) -> &str {
		&self.container_id_prefix
	}

	/// Prefix for generated computation ids.
	pub fn computation_id_prefix(&self) -> &str {
		&self.computation_id_prefix
	}

	/// Whether a stale reference aborts resume instead of being skipped.
	pub fn strict_resume(&self) -> bool {
		self.strict_resume
	}

	/// Maximum number of flushes that may be chained from inside flushes.
	pub fn max_flush_passes(&self) -> Option<usize> {
		self.max_flush_passes
	}

	/// Sets the container id prefix.
	pub fn with_container_id_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.container_id_prefix = prefix.into();
		self
	}

	/// Sets the computation id prefix.
	pub fn with_computation_id_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.computation_id_prefix = prefix.into();
		self
	}

	/// Enables or disables strict resume.
	pub fn with_strict_resume(mut self, strict: bool) -> Self {
		self.strict_resume = strict;
		self
	}

	/// Caps chained flushes.
	pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
		self.max_flush_passes = Some(passes);
		self
	}
}
