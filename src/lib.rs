//! Resilient async data-fetch cache with TTL persistence, exponential-backoff retries, and stale
//! fallback on failure.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod clock;
pub mod consumer;
pub mod fetch;
pub mod http;
pub mod key;
pub mod metrics;
pub mod retry;
pub mod store;

mod config;
mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::{
		codec::DecodeError,
		entry::CacheEntry,
		manager::{FetchOptions, ResilientCache, ResilientCacheBuilder},
		state::ObservableResult,
	},
	clock::{Clock, ManualClock, SystemClock},
	config::{CacheConfig, DEFAULT_KEY_PREFIX, DEFAULT_NAME, DEFAULT_TTL},
	consumer::Resource,
	error::{Error, Result},
	fetch::FetchError,
	key::CacheKey,
	retry::{JitterStrategy, RetryPolicy},
	store::{KeyValueStore, file::FileStore, memory::MemoryStore},
};
