//! Consumer-facing resource behaviour over a shared cache.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicU32, Ordering},
	},
	time::Duration,
};
// crates.io
use resilient_cache::{
	FetchError, ResilientCache, Resource, RetryPolicy,
	fetch::{self, SharedFetch},
};

fn flaky(healthy: Arc<AtomicBool>, calls: Arc<AtomicU32>) -> SharedFetch<Vec<String>> {
	fetch::shared(move || {
		let healthy = healthy.clone();
		let calls = calls.clone();

		async move {
			calls.fetch_add(1, Ordering::SeqCst);

			if healthy.load(Ordering::SeqCst) {
				Ok(vec!["water plants".to_owned()])
			} else {
				Err(FetchError::transient("gateway timeout"))
			}
		}
	})
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_showing_the_last_known_data() {
	let _ = tracing_subscriber::fmt::try_init();
	let cache = ResilientCache::builder()
		.retry_policy(RetryPolicy { base_delay: Duration::from_millis(50), ..RetryPolicy::default() })
		.build()
		.expect("cache");
	let healthy = Arc::new(AtomicBool::new(true));
	let calls = Arc::new(AtomicU32::new(0));
	let resource = Resource::new(cache, "tasks", flaky(healthy.clone(), calls.clone()));
	let loaded = resource.load().await;

	healthy.store(false, Ordering::SeqCst);

	let degraded = resource.refresh().await;

	assert_eq!(calls.load(Ordering::SeqCst), 4);
	assert!(degraded.is_degraded());
	assert_eq!(degraded.error.as_deref(), Some("gateway timeout"));
	assert!(Arc::ptr_eq(
		loaded.data.as_ref().expect("loaded"),
		degraded.data.as_ref().expect("degraded")
	));
}

#[tokio::test]
async fn resources_sharing_a_cache_share_entries() {
	let cache = ResilientCache::builder().build().expect("cache");
	let calls = Arc::new(AtomicU32::new(0));
	let healthy = Arc::new(AtomicBool::new(true));
	let list = Resource::new(cache.clone(), "tasks", flaky(healthy.clone(), calls.clone()));
	let badge = Resource::new(cache, "tasks", flaky(healthy, calls.clone()));

	list.load().await;

	let snapshot = badge.load().await;

	assert!(snapshot.is_from_cache);
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}
