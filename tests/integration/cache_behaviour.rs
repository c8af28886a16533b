//! Integration coverage for hit, expiry, retry, fallback, and invalidation behaviour.

// std
use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration,
};
// crates.io
use chrono::{DateTime, Utc};
use resilient_cache::{
	CacheEntry, FetchError, KeyValueStore, ManualClock, MemoryStore, ResilientCache, Result,
	cache::codec,
};
use tokio::time::Instant;

const PREFIX: &str = "resilient-cache";

fn t0() -> DateTime<Utc> {
	DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).expect("timestamp")
}

fn build(store: Arc<MemoryStore>, clock: Arc<ManualClock>, ttl: Duration) -> ResilientCache {
	ResilientCache::builder().shared_store(store).clock(clock).ttl(ttl).build().expect("cache")
}

fn seed<T: serde::Serialize>(store: &MemoryStore, key: &str, entry: &CacheEntry<T>) {
	store
		.set(&format!("{PREFIX}:{key}"), &codec::encode(entry).expect("encode"))
		.expect("seed");
}

#[derive(Debug)]
struct BrokenStore;
impl KeyValueStore for BrokenStore {
	fn name(&self) -> &'static str {
		"broken"
	}

	fn get(&self, _: &str) -> Result<Option<String>> {
		Err(resilient_cache::Error::Store("disk quota exceeded".into()))
	}

	fn set(&self, _: &str, _: &str) -> Result<()> {
		Err(resilient_cache::Error::Store("disk quota exceeded".into()))
	}

	fn remove(&self, _: &str) -> Result<()> {
		Err(resilient_cache::Error::Store("disk quota exceeded".into()))
	}
}

#[tokio::test]
async fn habits_list_is_fetched_once_then_served_from_cache() {
	let _ = tracing_subscriber::fmt::try_init();

	let cache = ResilientCache::builder()
		.ttl(Duration::from_millis(300_000))
		.build()
		.expect("cache");
	let calls = &AtomicU32::new(0);
	let fetch = move || async move {
		calls.fetch_add(1, Ordering::SeqCst);

		Ok::<_, FetchError>(vec!["run".to_owned(), "read".to_owned()])
	};
	let first = cache.get("habits:list", fetch).await;

	assert!(!first.loading);
	assert_eq!(first.data.as_deref(), Some(&["run".to_owned(), "read".to_owned()][..]));
	assert!(!first.is_from_cache);
	assert!(first.error.is_none());

	let second = cache.get("habits:list", fetch).await;

	assert_eq!(second.data, first.data);
	assert!(second.is_from_cache);
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	let metrics = cache.metrics().snapshot();

	assert_eq!(metrics.total_requests, 2);
	assert_eq!(metrics.cache_hits, 1);
}

#[tokio::test]
async fn live_entry_short_circuits_the_fetch() {
	let store = Arc::new(MemoryStore::new());
	let clock = Arc::new(ManualClock::new(t0()));
	let cache = build(store.clone(), clock, Duration::from_secs(60));

	seed(&store, "tasks", &CacheEntry::new(vec![1, 2, 3], t0(), Duration::from_secs(60)));

	let calls = &AtomicU32::new(0);
	let result = cache
		.get("tasks", move || async move {
			calls.fetch_add(1, Ordering::SeqCst);

			Ok::<Vec<i32>, FetchError>(Vec::new())
		})
		.await;

	assert_eq!(calls.load(Ordering::SeqCst), 0);
	assert_eq!(result.data, Some(vec![1, 2, 3]));
	assert!(result.is_from_cache);
}

#[tokio::test]
async fn expiry_boundary_follows_the_ttl() {
	let store = Arc::new(MemoryStore::new());
	let clock = Arc::new(ManualClock::new(t0()));
	let cache = build(store, clock.clone(), Duration::from_millis(5_000));
	let calls = &AtomicU32::new(0);
	let fetch = move || async move { Ok::<_, FetchError>(calls.fetch_add(1, Ordering::SeqCst)) };

	cache.get("moods", fetch).await;

	clock.set(t0() + chrono::TimeDelta::milliseconds(4_999));

	assert!(cache.get("moods", fetch).await.is_from_cache);
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	clock.set(t0() + chrono::TimeDelta::milliseconds(5_001));

	let expired = cache.get("moods", fetch).await;

	assert!(!expired.is_from_cache);
	assert_eq!(expired.data, Some(1));
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_exponential_backoff() {
	let cache = ResilientCache::builder().build().expect("cache");
	let attempts = &Mutex::new(Vec::new());
	let started = Instant::now();
	let result = cache
		.get("journal", move || async move {
			let attempt = {
				let mut attempts = attempts.lock().expect("attempts");

				attempts.push(started.elapsed());
				attempts.len()
			};

			if attempt < 3 {
				Err(FetchError::transient(format!("attempt {attempt} failed")))
			} else {
				Ok("dear diary".to_owned())
			}
		})
		.await;
	let attempts = attempts.lock().expect("attempts").clone();

	assert_eq!(
		attempts,
		vec![Duration::ZERO, Duration::from_millis(1_000), Duration::from_millis(3_000)]
	);
	assert_eq!(result.data.as_deref(), Some("dear diary"));
	assert!(!result.is_from_cache);
	assert!(result.error.is_none());
	assert_eq!(cache.metrics().snapshot().retries, 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fall_back_to_the_expired_entry() {
	let store = Arc::new(MemoryStore::new());
	let clock = Arc::new(ManualClock::new(t0()));
	let cache = build(store.clone(), clock.clone(), Duration::from_secs(60));

	seed(&store, "routines", &CacheEntry::new("stretch".to_owned(), t0(), Duration::from_secs(60)));
	clock.advance(Duration::from_secs(3_600));

	let calls = &AtomicU32::new(0);
	let result = cache
		.get("routines", move || async move {
			calls.fetch_add(1, Ordering::SeqCst);

			Err::<String, _>(FetchError::transient("service unavailable"))
		})
		.await;

	assert_eq!(calls.load(Ordering::SeqCst), 3);
	assert_eq!(result.data.as_deref(), Some("stretch"));
	assert!(result.is_from_cache);
	assert_eq!(result.error.as_deref(), Some("service unavailable"));
	assert!(result.is_degraded());
	assert_eq!(cache.metrics().snapshot().stale_serves, 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_without_an_entry_report_the_error() {
	let cache = ResilientCache::builder().build().expect("cache");
	let result = cache
		.get("events", || async { Err::<Vec<String>, _>(FetchError::transient("network down")) })
		.await;

	assert!(result.data.is_none());
	assert!(!result.loading);
	assert_eq!(result.error.as_deref(), Some("network down"));
	assert!(!result.is_from_cache);
}

#[tokio::test]
async fn refresh_bypasses_a_live_entry() {
	let cache = ResilientCache::builder().build().expect("cache");
	let calls = &AtomicU32::new(0);
	let fetch = move || async move { Ok::<_, FetchError>(calls.fetch_add(1, Ordering::SeqCst)) };

	cache.get("tasks", fetch).await;

	let refreshed = cache.refresh("tasks", fetch).await;

	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(refreshed.data, Some(1));
	assert!(!refreshed.is_from_cache);
	assert_eq!(cache.get("tasks", fetch).await.data, Some(1));
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_falls_back_to_the_live_entry() {
	let cache = ResilientCache::builder().build().expect("cache");

	cache.get("moods", || async { Ok::<_, FetchError>(5_u8) }).await;

	let result = cache
		.refresh("moods", || async { Err::<u8, _>(FetchError::permanent("forbidden")) })
		.await;

	assert_eq!(result.data, Some(5));
	assert!(result.is_degraded());
}

#[tokio::test]
async fn invalidate_turns_the_next_get_into_a_cold_read() -> Result<()> {
	let cache = ResilientCache::builder().build().expect("cache");
	let calls = &AtomicU32::new(0);
	let fetch = move || async move { Ok::<_, FetchError>(calls.fetch_add(1, Ordering::SeqCst)) };

	cache.get("habits", fetch).await;
	cache.invalidate("habits")?;

	let result = cache.get("habits", fetch).await;

	assert!(!result.is_from_cache);
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	Ok(())
}

#[tokio::test]
async fn corrupt_entries_are_treated_as_absent_and_evicted() {
	let store = Arc::new(MemoryStore::new());
	let cache = ResilientCache::builder().shared_store(store.clone()).build().expect("cache");
	let store_key = format!("{PREFIX}:journal");

	store.set(&store_key, "{definitely not json").expect("seed");

	let result = cache
		.get("journal", || async { Err::<String, _>(FetchError::permanent("offline")) })
		.await;

	assert!(result.is_failed());
	assert!(store.get(&store_key).expect("get").is_none());

	store.set(&store_key, "{definitely not json").expect("seed");

	let recovered = cache.get("journal", || async { Ok::<_, FetchError>("fresh".to_owned()) }).await;

	assert_eq!(recovered.data.as_deref(), Some("fresh"));
	assert!(cache.peek::<String>("journal").is_some());
}

#[tokio::test]
async fn storage_failures_never_reach_the_consumer() {
	let cache = ResilientCache::builder().store(BrokenStore).build().expect("cache");
	let result = cache.get("tasks", || async { Ok::<_, FetchError>(vec!["ship".to_owned()]) }).await;

	assert_eq!(result.data, Some(vec!["ship".to_owned()]));
	assert!(result.error.is_none());
	assert!(cache.invalidate("tasks").is_err());
}

#[test]
fn zero_ttl_is_rejected_at_construction() {
	let err = ResilientCache::builder().ttl(Duration::ZERO).build().unwrap_err();

	assert!(matches!(err, resilient_cache::Error::Validation { field: "ttl", .. }));
}
