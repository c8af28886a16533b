//! Observable adapter that exposes one cached query to a UI layer.
//!
//! A [`Resource`] owns the current key and fetch function of a view, publishes
//! `ObservableResult<Arc<T>>` snapshots over a [`watch`] channel, and offers `refresh` and
//! `clear_cache` as imperative actions. The published `Arc<T>` is reused as long as the value
//! compares equal, so subscribers can detect real changes with `Arc::ptr_eq`.

// std
use std::sync::Mutex;
// crates.io
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	cache::{
		manager::{FetchOptions, Mode, ResilientCache},
		state::ObservableResult,
	},
	fetch::SharedFetch,
	key::CacheKey,
};

/// Snapshot type published to subscribers.
pub type Snapshot<T> = ObservableResult<Arc<T>>;

struct Query<T> {
	key: CacheKey,
	fetch: SharedFetch<T>,
	generation: u64,
}

/// One cached query bound to a consumer.
pub struct Resource<T> {
	cache: ResilientCache,
	options: FetchOptions,
	query: Mutex<Query<T>>,
	state: watch::Sender<Snapshot<T>>,
}
impl<T> Resource<T>
where
	T: PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
	/// Bind `fetch` under `key`; nothing is requested until [`load`](Self::load).
	pub fn new(cache: ResilientCache, key: impl Into<CacheKey>, fetch: SharedFetch<T>) -> Self {
		let (state, _) = watch::channel(ObservableResult::pending());

		Self {
			cache,
			options: FetchOptions::default(),
			query: Mutex::new(Query { key: key.into(), fetch, generation: 0 }),
			state,
		}
	}

	/// Apply per-call overrides to every request this resource issues.
	pub fn with_options(mut self, options: FetchOptions) -> Self {
		self.options = options;

		self
	}

	/// Subscribe to snapshot updates.
	pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
		self.state.subscribe()
	}

	/// Latest published snapshot.
	pub fn current(&self) -> Snapshot<T> {
		self.state.borrow().clone()
	}

	/// Key currently bound to the resource.
	pub fn key(&self) -> CacheKey {
		self.lock_query().key.clone()
	}

	/// Resolve the current key through the cache, serving a fresh entry when available.
	pub async fn load(&self) -> Snapshot<T> {
		self.run(Mode::Get).await
	}

	/// Fetch the current key, bypassing any fresh entry.
	pub async fn refresh(&self) -> Snapshot<T> {
		self.run(Mode::Refresh).await
	}

	/// Drop the stored entry for the current key; the published snapshot is left untouched.
	pub fn clear_cache(&self) -> Result<()> {
		let key = self.key();

		self.cache.invalidate(&key)
	}

	/// Rebind the resource to a new query, reloading when the key changed.
	///
	/// Results of calls still running for the previous key are discarded when they complete.
	pub async fn set_query(&self, key: impl Into<CacheKey>, fetch: SharedFetch<T>) -> Snapshot<T> {
		let key = key.into();
		let changed = {
			let mut query = self.lock_query();

			query.fetch = fetch;

			if query.key == key {
				false
			} else {
				query.key = key;
				query.generation = query.generation.wrapping_add(1);

				true
			}
		};

		if changed { self.load().await } else { self.current() }
	}

	async fn run(&self, mode: Mode) -> Snapshot<T> {
		let (key, fetch, generation) = {
			let query = self.lock_query();

			(query.key.clone(), query.fetch.clone(), query.generation)
		};
		let result = self
			.cache
			.resolve(key.as_str(), self.options, || fetch(), mode, || self.mark_loading(generation))
			.await;

		self.publish(generation, result);

		self.current()
	}

	fn mark_loading(&self, generation: u64) {
		if !self.is_current(generation) {
			return;
		}

		self.state.send_if_modified(|snapshot| {
			if snapshot.loading {
				false
			} else {
				snapshot.loading = true;

				true
			}
		});
	}

	fn publish(&self, generation: u64, result: ObservableResult<T>) {
		if !self.is_current(generation) {
			tracing::debug!(generation, "discarding result for superseded query");

			return;
		}

		self.state.send_if_modified(|snapshot| {
			let data = match (&snapshot.data, result.data) {
				(Some(previous), Some(next)) if **previous == next => Some(previous.clone()),
				(_, next) => next.map(Arc::new),
			};
			let next = ObservableResult {
				data,
				loading: false,
				error: result.error,
				is_from_cache: result.is_from_cache,
			};
			let changed = !same_snapshot(snapshot, &next);

			*snapshot = next;

			changed
		});
	}

	fn is_current(&self, generation: u64) -> bool {
		self.lock_query().generation == generation
	}

	fn lock_query(&self) -> std::sync::MutexGuard<'_, Query<T>> {
		self.query.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}
impl<T> std::fmt::Debug for Resource<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let key = self.query.lock().map(|query| query.key.clone()).ok();

		f.debug_struct("Resource").field("key", &key).finish_non_exhaustive()
	}
}

fn same_snapshot<T>(a: &Snapshot<T>, b: &Snapshot<T>) -> bool {
	let same_data = match (&a.data, &b.data) {
		(Some(a), Some(b)) => Arc::ptr_eq(a, b),
		(None, None) => true,
		_ => false,
	};

	same_data && a.loading == b.loading && a.error == b.error && a.is_from_cache == b.is_from_cache
}
