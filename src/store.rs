//! Key-value persistence backends for cache entries.

pub mod file;
pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

// std
use std::fmt::Debug;
// self
use crate::_prelude::*;

/// Synchronous string key-value store holding serialised cache entries.
///
/// Implementations only guarantee that writing a key replaces that key. Every operation may fail;
/// the cache treats failures as "no cached value" and never surfaces them to consumers.
pub trait KeyValueStore: Debug + Send + Sync {
	/// Short backend name used in logs.
	fn name(&self) -> &'static str;

	/// Read the raw value stored under `key`, returning `None` on a miss.
	fn get(&self, key: &str) -> Result<Option<String>>;

	/// Store `value` under `key`, replacing any previous value.
	fn set(&self, key: &str, value: &str) -> Result<()>;

	/// Remove `key`; removing an absent key is not an error.
	fn remove(&self, key: &str) -> Result<()>;
}
impl<S> KeyValueStore for Arc<S>
where
	S: ?Sized + KeyValueStore,
{
	fn name(&self) -> &'static str {
		(**self).name()
	}

	fn get(&self, key: &str) -> Result<Option<String>> {
		(**self).get(key)
	}

	fn set(&self, key: &str, value: &str) -> Result<()> {
		(**self).set(key, value)
	}

	fn remove(&self, key: &str) -> Result<()> {
		(**self).remove(key)
	}
}
