//! In-process store backed by a hash map.

// std
use std::{
	collections::HashMap,
	sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
// self
use crate::{_prelude::*, store::KeyValueStore};

/// Thread-safe in-memory store.
///
/// Contents live as long as the process; suitable as the default backend and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: RwLock<HashMap<String, String>>,
}
impl MemoryStore {
	/// Create an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored keys.
	pub fn len(&self) -> usize {
		self.read().map(|entries| entries.len()).unwrap_or_default()
	}

	/// Whether the store holds no keys.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, String>>> {
		self.entries.read().map_err(|_| Error::Store("Memory store lock poisoned.".into()))
	}

	fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, String>>> {
		self.entries.write().map_err(|_| Error::Store("Memory store lock poisoned.".into()))
	}
}
impl KeyValueStore for MemoryStore {
	fn name(&self) -> &'static str {
		"memory"
	}

	fn get(&self, key: &str) -> Result<Option<String>> {
		Ok(self.read()?.get(key).cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<()> {
		self.write()?.insert(key.to_owned(), value.to_owned());

		Ok(())
	}

	fn remove(&self, key: &str) -> Result<()> {
		self.write()?.remove(key);

		Ok(())
	}
}
