//! Entries written through a file store survive a new cache instance.

// std
use std::{
	sync::atomic::{AtomicU32, Ordering},
	time::Duration,
};
// crates.io
use resilient_cache::{FetchError, FileStore, ResilientCache};
use tempfile::TempDir;

#[tokio::test]
async fn file_store_entries_outlive_the_cache_instance() {
	let root = TempDir::new().expect("temp dir");
	let calls = &AtomicU32::new(0);
	let fetch = move || async move {
		calls.fetch_add(1, Ordering::SeqCst);

		Ok::<_, FetchError>(vec!["meditate".to_owned()])
	};

	{
		let cache = ResilientCache::builder()
			.store(FileStore::open(root.path()).expect("store"))
			.ttl(Duration::from_secs(300))
			.build()
			.expect("cache");

		assert!(!cache.get("routines", fetch).await.is_from_cache);
	}

	let reopened = ResilientCache::builder()
		.store(FileStore::open(root.path()).expect("store"))
		.ttl(Duration::from_secs(300))
		.build()
		.expect("cache");
	let result = reopened.get("routines", fetch).await;

	assert!(result.is_from_cache);
	assert_eq!(result.data, Some(vec!["meditate".to_owned()]));
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert!(reopened.is_fresh("routines"));
}

#[tokio::test]
async fn key_prefixes_isolate_caches_sharing_a_directory() {
	let root = TempDir::new().expect("temp dir");
	let alice = ResilientCache::builder()
		.store(FileStore::open(root.path()).expect("store"))
		.key_prefix("alice")
		.build()
		.expect("cache");
	let bob = ResilientCache::builder()
		.store(FileStore::open(root.path()).expect("store"))
		.key_prefix("bob")
		.build()
		.expect("cache");

	alice.get("journal", || async { Ok::<_, FetchError>("alice's page".to_owned()) }).await;

	assert!(bob.peek::<String>("journal").is_none());
	assert_eq!(
		alice.peek::<String>("journal").map(|entry| entry.into_value()).as_deref(),
		Some("alice's page")
	);
}
