use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables of an island.
///
/// Usually embedded in a test suite's TOML settings:
///
/// ```toml
/// max_parallel_tenant_ops = 8
/// acquire_timeout_secs = 30
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IslandConfig {
	/// Upper bound on tenant creations and removals running at once, across all tests.
	#[serde(default = "default_parallel_ops")]
	pub max_parallel_tenant_ops: usize,
	/// Time a pool may take to answer one acquisition.
	#[serde(default)]
	pub acquire_timeout_secs: Option<u64>,
	/// Time a pool may take to initialize or dispose.
	#[serde(default)]
	pub lifecycle_timeout_secs: Option<u64>,
}

/// Returns the default bound on concurrent tenant operations.
fn default_parallel_ops() -> usize {
	16
}

impl Default for IslandConfig {
	fn default() -> Self {
		Self {
			max_parallel_tenant_ops: default_parallel_ops(),
			acquire_timeout_secs: None,
			lifecycle_timeout_secs: None,
		}
	}
}

impl IslandConfig {
	/// Parses a TOML document.
	pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	/// Concurrency bound, never zero.
	pub fn parallel_ops(&self) -> usize {
		self.max_parallel_tenant_ops.max(1)
	}

	pub fn acquire_timeout(&self) -> Option<Duration> {
		self.acquire_timeout_secs.map(Duration::from_secs)
	}

	pub fn lifecycle_timeout(&self) -> Option<Duration> {
		self.lifecycle_timeout_secs.map(Duration::from_secs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_document_uses_defaults() {
		let config = IslandConfig::from_toml("").expect("empty config");
		assert_eq!(config, IslandConfig::default());
		assert_eq!(config.parallel_ops(), 16);
		assert_eq!(config.acquire_timeout(), None);
	}

	#[test]
	fn parses_all_fields() {
		let config = IslandConfig::from_toml("max_parallel_tenant_ops = 0\nacquire_timeout_secs = 5\nlifecycle_timeout_secs = 60\n").expect("config");
		assert_eq!(config.parallel_ops(), 1);
		assert_eq!(config.acquire_timeout(), Some(Duration::from_secs(5)));
		assert_eq!(config.lifecycle_timeout(), Some(Duration::from_secs(60)));
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let err = IslandConfig::from_toml("parallelism = 3").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}
}
