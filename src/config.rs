//! Cache configuration and validation.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, retry::RetryPolicy};

/// Default time-to-live for cached entries (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
/// Default namespace prepended to every store key.
pub const DEFAULT_KEY_PREFIX: &str = "resilient-cache";
/// Default cache name used in logs and metrics.
pub const DEFAULT_NAME: &str = "default";

/// Configuration for a [`ResilientCache`](crate::ResilientCache).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// Cache name used to label logs and metrics.
	pub name: String,
	/// Namespace prepended to keys before they reach the store.
	pub key_prefix: String,
	/// Lifetime of freshly written entries.
	pub ttl: Duration,
	/// When disabled the cache always fetches and never touches the store.
	pub enable_cache: bool,
	/// Serialise overlapping calls for the same key so only one fetch runs at a time.
	pub coalesce_in_flight: bool,
	/// Retry configuration applied to every fetch.
	pub retry: RetryPolicy,
}
impl CacheConfig {
	/// Validate the configuration, failing fast on values that would misbehave at call time.
	pub fn validate(&self) -> Result<()> {
		if self.name.trim().is_empty() {
			return Err(Error::Validation { field: "name", reason: "Must not be empty.".into() });
		}
		if self.key_prefix.is_empty() {
			return Err(Error::Validation {
				field: "key_prefix",
				reason: "Must not be empty.".into(),
			});
		}

		validate_ttl(self.ttl)?;

		self.retry.validate()
	}
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			name: DEFAULT_NAME.into(),
			key_prefix: DEFAULT_KEY_PREFIX.into(),
			ttl: DEFAULT_TTL,
			enable_cache: true,
			coalesce_in_flight: false,
			retry: RetryPolicy::default(),
		}
	}
}

pub(crate) fn validate_ttl(ttl: Duration) -> Result<()> {
	if ttl.is_zero() {
		return Err(Error::Validation { field: "ttl", reason: "Must be greater than zero.".into() });
	}
	if TimeDelta::from_std(ttl).is_err() {
		return Err(Error::Validation {
			field: "ttl",
			reason: "Exceeds the representable timestamp range.".into(),
		});
	}

	Ok(())
}
