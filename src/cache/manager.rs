//! Cache orchestrator: serve fresh entries, otherwise fetch with retries and fall back to stale.

// std
use std::{collections::HashMap, future::Future, sync::Mutex};
// crates.io
use serde::{Serialize, de::DeserializeOwned};
use tokio::{
	sync::{Mutex as AsyncMutex, OwnedMutexGuard},
	time,
};
// self
use crate::{
	_prelude::*,
	cache::{
		codec,
		entry::CacheEntry,
		state::{CallState, ObservableResult},
	},
	clock::{Clock, SystemClock},
	config::{self, CacheConfig},
	fetch::FetchError,
	metrics::CacheMetrics,
	retry::{AttemptBudget, RetryExecutor, RetryPolicy},
	store::{KeyValueStore, memory::MemoryStore},
};

type FlightRegistry = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Per-call overrides for TTL and deadline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchOptions {
	ttl: Option<Duration>,
	deadline: Option<Instant>,
}
impl FetchOptions {
	/// Options that defer to the cache configuration.
	pub fn new() -> Self {
		Self::default()
	}

	/// Override the TTL of entries written by this call; zero is rejected.
	pub fn with_ttl(mut self, ttl: Duration) -> Result<Self> {
		config::validate_ttl(ttl)?;

		self.ttl = Some(ttl);

		Ok(self)
	}

	/// Abort retrying once `deadline` passes and fall back to whatever is cached.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);

		self
	}

	/// Shorthand for a deadline `budget` from now.
	pub fn with_timeout(self, budget: Duration) -> Self {
		let deadline = Instant::now().checked_add(budget);

		match deadline {
			Some(deadline) => self.with_deadline(deadline),
			None => self,
		}
	}

	/// TTL override, if any.
	pub fn ttl(&self) -> Option<Duration> {
		self.ttl
	}

	/// Deadline, if any.
	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}
}

/// Builder for [`ResilientCache`].
#[derive(Debug, Default)]
pub struct ResilientCacheBuilder {
	config: CacheConfig,
	store: Option<Arc<dyn KeyValueStore>>,
	clock: Option<Arc<dyn Clock>>,
}
impl ResilientCacheBuilder {
	/// Create a builder with default configuration, an in-memory store, and the system clock.
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the whole configuration.
	pub fn config(mut self, config: CacheConfig) -> Self {
		self.config = config;

		self
	}

	/// Name used in logs and metrics.
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.config.name = name.into();

		self
	}

	/// Namespace prepended to store keys.
	pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.config.key_prefix = prefix.into();

		self
	}

	/// Default TTL for written entries.
	pub fn ttl(mut self, ttl: Duration) -> Self {
		self.config.ttl = ttl;

		self
	}

	/// Retry policy applied to every fetch.
	pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.config.retry = policy;

		self
	}

	/// Toggle reading and writing the store.
	pub fn enable_cache(mut self, enabled: bool) -> Self {
		self.config.enable_cache = enabled;

		self
	}

	/// Toggle per-key serialisation of overlapping calls.
	pub fn coalesce_in_flight(mut self, enabled: bool) -> Self {
		self.config.coalesce_in_flight = enabled;

		self
	}

	/// Persist entries in `store`.
	pub fn store(mut self, store: impl KeyValueStore + 'static) -> Self {
		self.store = Some(Arc::new(store));

		self
	}

	/// Persist entries in an already shared store.
	pub fn shared_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
		self.store = Some(store);

		self
	}

	/// Read time from `clock`.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Validate the configuration and construct the cache.
	pub fn build(self) -> Result<ResilientCache> {
		self.config.validate()?;

		let metrics = CacheMetrics::new(self.config.name.as_str());

		Ok(ResilientCache {
			config: Arc::new(self.config),
			store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
			clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
			in_flight: Arc::new(Mutex::new(HashMap::new())),
			metrics,
		})
	}
}

/// Keyed, persistent, retrying cache around arbitrary async fetch functions.
///
/// Construct one per application and share it by cloning; clones reference the same store,
/// configuration, and metrics. Calls never fail: every outcome is an [`ObservableResult`].
#[derive(Clone, Debug)]
pub struct ResilientCache {
	config: Arc<CacheConfig>,
	store: Arc<dyn KeyValueStore>,
	clock: Arc<dyn Clock>,
	in_flight: FlightRegistry,
	metrics: Arc<CacheMetrics>,
}
impl ResilientCache {
	/// Build a cache with `config`, an in-memory store, and the system clock.
	pub fn new(config: CacheConfig) -> Result<Self> {
		Self::builder().config(config).build()
	}

	/// Create a [`ResilientCacheBuilder`] for advanced configuration.
	pub fn builder() -> ResilientCacheBuilder {
		ResilientCacheBuilder::new()
	}

	/// Active configuration.
	pub fn config(&self) -> &CacheConfig {
		&self.config
	}

	/// Access the per-cache metrics accumulator.
	pub fn metrics(&self) -> Arc<CacheMetrics> {
		self.metrics.clone()
	}

	/// Return the cached value for `key` if fresh, otherwise fetch it.
	pub async fn get<T, K, F, Fut, E>(&self, key: K, fetch: F) -> ObservableResult<T>
	where
		T: Serialize + DeserializeOwned,
		K: AsRef<str>,
		F: FnMut() -> Fut,
		Fut: Future<Output = std::result::Result<T, E>>,
		E: Into<FetchError>,
	{
		self.resolve(key.as_ref(), FetchOptions::default(), fetch, Mode::Get, || {}).await
	}

	/// [`get`](Self::get) with per-call overrides.
	pub async fn get_with<T, K, F, Fut, E>(
		&self,
		key: K,
		options: FetchOptions,
		fetch: F,
	) -> ObservableResult<T>
	where
		T: Serialize + DeserializeOwned,
		K: AsRef<str>,
		F: FnMut() -> Fut,
		Fut: Future<Output = std::result::Result<T, E>>,
		E: Into<FetchError>,
	{
		self.resolve(key.as_ref(), options, fetch, Mode::Get, || {}).await
	}

	/// Always fetch, bypassing any fresh entry; still falls back to stored data on failure.
	pub async fn refresh<T, K, F, Fut, E>(&self, key: K, fetch: F) -> ObservableResult<T>
	where
		T: Serialize + DeserializeOwned,
		K: AsRef<str>,
		F: FnMut() -> Fut,
		Fut: Future<Output = std::result::Result<T, E>>,
		E: Into<FetchError>,
	{
		self.resolve(key.as_ref(), FetchOptions::default(), fetch, Mode::Refresh, || {}).await
	}

	/// [`refresh`](Self::refresh) with per-call overrides.
	pub async fn refresh_with<T, K, F, Fut, E>(
		&self,
		key: K,
		options: FetchOptions,
		fetch: F,
	) -> ObservableResult<T>
	where
		T: Serialize + DeserializeOwned,
		K: AsRef<str>,
		F: FnMut() -> Fut,
		Fut: Future<Output = std::result::Result<T, E>>,
		E: Into<FetchError>,
	{
		self.resolve(key.as_ref(), options, fetch, Mode::Refresh, || {}).await
	}

	/// Remove the entry for `key`; the next `get` behaves as a cold cache.
	pub fn invalidate(&self, key: impl AsRef<str>) -> Result<()> {
		let key = key.as_ref();

		self.store.remove(&self.store_key(key))?;

		tracing::debug!(cache = %self.config.name, key, "cache entry invalidated");

		Ok(())
	}

	/// Stored entry for `key`, fresh or stale, without fetching.
	pub fn peek<T>(&self, key: impl AsRef<str>) -> Option<CacheEntry<T>>
	where
		T: DeserializeOwned,
	{
		if !self.config.enable_cache {
			return None;
		}

		self.load_entry(key.as_ref())
	}

	/// Whether `key` currently holds an unexpired entry.
	pub fn is_fresh(&self, key: impl AsRef<str>) -> bool {
		self.peek::<serde::de::IgnoredAny>(key)
			.is_some_and(|entry| entry.is_fresh(self.clock.now()))
	}

	/// Core algorithm shared by `get`/`refresh`; `on_fetch` fires once when fetching begins.
	#[tracing::instrument(
		level = "debug",
		skip(self, options, fetch, on_fetch),
		fields(cache = %self.config.name)
	)]
	pub(crate) async fn resolve<T, F, Fut, E>(
		&self,
		key: &str,
		options: FetchOptions,
		mut fetch: F,
		mode: Mode,
		on_fetch: impl FnOnce(),
	) -> ObservableResult<T>
	where
		T: Serialize + DeserializeOwned,
		F: FnMut() -> Fut,
		Fut: Future<Output = std::result::Result<T, E>>,
		E: Into<FetchError>,
	{
		let use_store = self.config.enable_cache;

		if use_store
			&& mode == Mode::Get
			&& let Some(value) = self.fresh_value(key)
		{
			return self.served_from_cache(value);
		}

		let _flight = if use_store && self.config.coalesce_in_flight {
			let flight = self.enter_flight(key).await;

			// A coalesced caller may already have written a fresh entry.
			if mode == Mode::Get
				&& let Some(value) = self.fresh_value(key)
			{
				return self.served_from_cache(value);
			}

			Some(flight)
		} else {
			None
		};

		on_fetch();

		let ttl = options.ttl.unwrap_or(self.config.ttl);
		let started = Instant::now();

		match self.fetch_with_retry(&mut fetch, options.deadline).await {
			Ok(value) => {
				if use_store {
					self.persist(key, &value, ttl);
				}

				self.metrics.record_miss();
				self.metrics.record_fetch_success(started.elapsed());

				CallState::Resolved { value, from_cache: false }.into_result()
			},
			Err(error) => {
				self.metrics.record_fetch_error();

				let fallback =
					if use_store { self.load_entry::<T>(key) } else { None };

				match fallback {
					Some(entry) => {
						tracing::warn!(
							key,
							error = %error,
							created_at = %entry.created_at(),
							"fetch failed, serving stale data"
						);

						self.metrics.record_hit(true);

						CallState::DegradedResolved { value: entry.into_value(), error }.into_result()
					},
					None => {
						tracing::warn!(key, error = %error, "fetch failed with no cached fallback");

						self.metrics.record_miss();

						CallState::Failed { error }.into_result()
					},
				}
			},
		}
	}

	async fn fetch_with_retry<T, F, Fut, E>(
		&self,
		fetch: &mut F,
		deadline: Option<Instant>,
	) -> std::result::Result<T, FetchError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = std::result::Result<T, E>>,
		E: Into<FetchError>,
	{
		let mut executor = RetryExecutor::new(&self.config.retry, deadline);
		let mut state = CallState::<()>::Idle;

		while let AttemptBudget::Granted { attempt, timeout } = executor.begin_attempt() {
			state.begin_attempt(attempt);

			let attempt_future = async { fetch().await.map_err(Into::<FetchError>::into) };
			let outcome = match timeout {
				Some(limit) => time::timeout(limit, attempt_future)
					.await
					.unwrap_or_else(|_| Err(FetchError::timed_out(limit))),
				None => attempt_future.await,
			};
			let error = match outcome {
				Ok(value) => {
					tracing::debug!(attempt, "fetch succeeded");

					return Ok(value);
				},
				Err(error) => error,
			};

			tracing::debug!(attempt, error = %error, retryable = error.is_retryable(), "fetch attempt failed");

			let backoff = executor.next_backoff(&error);

			state.attempt_failed(error);

			match backoff {
				Some(delay) => {
					self.metrics.record_retry();

					if !delay.is_zero() {
						time::sleep(delay).await;
					}
				},
				None => break,
			}
		}

		Err(state.last_error().cloned().unwrap_or_else(|| {
			FetchError::transient("Deadline elapsed before the fetch could be attempted.")
		}))
	}

	fn served_from_cache<T>(&self, value: T) -> ObservableResult<T> {
		tracing::debug!("serving fresh cache entry");

		self.metrics.record_hit(false);

		CallState::Resolved { value, from_cache: true }.into_result()
	}

	fn fresh_value<T>(&self, key: &str) -> Option<T>
	where
		T: DeserializeOwned,
	{
		let entry = self.load_entry::<T>(key)?;

		if entry.is_fresh(self.clock.now()) {
			Some(entry.into_value())
		} else {
			tracing::debug!(key, expires_at = %entry.expires_at(), "cache entry expired");

			None
		}
	}

	/// Read and decode the stored entry regardless of expiry, evicting anything unreadable.
	fn load_entry<T>(&self, key: &str) -> Option<CacheEntry<T>>
	where
		T: DeserializeOwned,
	{
		let store_key = self.store_key(key);
		let raw = match self.store.get(&store_key) {
			Ok(raw) => raw?,
			Err(err) => {
				tracing::warn!(key, store = self.store.name(), error = %err, "cache read failed");
				self.evict(&store_key);

				return None;
			},
		};

		match codec::decode::<T>(&raw) {
			Ok(entry) => Some(entry),
			Err(err) => {
				tracing::warn!(key, error = %err, "discarding undecodable cache entry");
				self.evict(&store_key);

				None
			},
		}
	}

	fn persist<T>(&self, key: &str, value: &T, ttl: Duration)
	where
		T: Serialize,
	{
		let store_key = self.store_key(key);
		let entry = CacheEntry::new(value, self.clock.now(), ttl);
		let written = codec::encode(&entry).and_then(|raw| self.store.set(&store_key, &raw));

		match written {
			Ok(()) => tracing::debug!(key, expires_at = %entry.expires_at(), "cache entry stored"),
			Err(err) => {
				tracing::warn!(key, store = self.store.name(), error = %err, "cache write failed")
			},
		}
	}

	fn evict(&self, store_key: &str) {
		if let Err(err) = self.store.remove(store_key) {
			tracing::warn!(store_key, error = %err, "failed to evict unreadable cache entry");
		}
	}

	fn store_key(&self, key: &str) -> String {
		format!("{}:{key}", self.config.key_prefix)
	}

	async fn enter_flight(&self, key: &str) -> FlightGuard {
		let lock = {
			let mut registry = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

			registry.entry(key.to_owned()).or_default().clone()
		};
		let guard = lock.lock_owned().await;

		FlightGuard { key: key.to_owned(), registry: self.in_flight.clone(), guard: Some(guard) }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
	Get,
	Refresh,
}

/// Holds the per-key lock for a coalesced call and prunes the registry on release.
struct FlightGuard {
	key: String,
	registry: FlightRegistry,
	guard: Option<OwnedMutexGuard<()>>,
}
impl Drop for FlightGuard {
	fn drop(&mut self) {
		drop(self.guard.take());

		let mut registry = self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

		if registry.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
			registry.remove(&self.key);
		}
	}
}
