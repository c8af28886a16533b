//! Redis-backed store for sharing cache entries across restarts and hosts.

// std
use std::sync::Mutex;
// crates.io
use redis::Commands;
// self
use crate::{_prelude::*, store::KeyValueStore};

/// Default bound on connecting and on every read or write.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Store backed by a blocking Redis connection.
///
/// Each operation is a single round trip on one shared connection, bounded by the I/O timeout so
/// an unresponsive server surfaces as a store error instead of stalling the caller. Entry expiry
/// is decided by the cache from the encoded timestamps, so keys are written without a Redis TTL
/// and remain available as stale fallbacks.
pub struct RedisStore {
	connection: Mutex<redis::Connection>,
	io_timeout: Duration,
}
impl RedisStore {
	/// Connect using the supplied client and [`DEFAULT_IO_TIMEOUT`].
	pub fn connect(client: &redis::Client) -> Result<Self> {
		Self::connect_with_timeout(client, DEFAULT_IO_TIMEOUT)
	}

	/// Connect using the supplied client; `io_timeout` bounds the connect and every command.
	pub fn connect_with_timeout(client: &redis::Client, io_timeout: Duration) -> Result<Self> {
		if io_timeout.is_zero() {
			return Err(Error::Validation {
				field: "io_timeout",
				reason: "Must be greater than zero.".into(),
			});
		}

		let connection = client.get_connection_with_timeout(io_timeout)?;

		connection.set_read_timeout(Some(io_timeout))?;
		connection.set_write_timeout(Some(io_timeout))?;

		Ok(Self { connection: Mutex::new(connection), io_timeout })
	}

	/// Connect to the Redis server at `url` (for example `redis://127.0.0.1/`).
	pub fn open(url: &str) -> Result<Self> {
		Self::connect(&redis::Client::open(url)?)
	}

	/// Bound applied to each command.
	pub fn io_timeout(&self) -> Duration {
		self.io_timeout
	}

	fn with_connection<T>(
		&self,
		op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
	) -> Result<T> {
		let mut connection =
			self.connection.lock().map_err(|_| Error::Store("Redis connection lock poisoned.".into()))?;

		Ok(op(&mut connection)?)
	}
}
impl std::fmt::Debug for RedisStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RedisStore").field("io_timeout", &self.io_timeout).finish_non_exhaustive()
	}
}
impl KeyValueStore for RedisStore {
	fn name(&self) -> &'static str {
		"redis"
	}

	fn get(&self, key: &str) -> Result<Option<String>> {
		self.with_connection(|conn| conn.get(key))
	}

	fn set(&self, key: &str, value: &str) -> Result<()> {
		self.with_connection(|conn| conn.set::<_, _, ()>(key, value))
	}

	fn remove(&self, key: &str) -> Result<()> {
		self.with_connection(|conn| conn.del::<_, ()>(key))
	}
}
