//! Per-cache telemetry.
//!
//! Every [`ResilientCache`](crate::ResilientCache) owns one [`CacheMetrics`]. The atomic counters
//! are always kept; with the `metrics` feature each observation is also forwarded to the global
//! `metrics` recorder under the `resilient_cache_*` names, labelled `cache=<name>`.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
#[cfg(feature = "metrics")] use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "metrics")] use smallvec::SmallVec;
// self
use crate::_prelude::*;

const REQUESTS: &str = "resilient_cache_requests_total";
const HITS: &str = "resilient_cache_hits_total";
const STALE: &str = "resilient_cache_stale_total";
const MISSES: &str = "resilient_cache_misses_total";
const FETCHES: &str = "resilient_cache_fetch_total";
const RETRIES: &str = "resilient_cache_retries_total";
#[cfg(feature = "metrics")]
const FETCH_SECONDS: &str = "resilient_cache_fetch_duration_seconds";

#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Outcome counters of one cache.
#[derive(Debug)]
pub struct CacheMetrics {
	cache: Arc<str>,
	total_requests: AtomicU64,
	cache_hits: AtomicU64,
	stale_serves: AtomicU64,
	fetch_successes: AtomicU64,
	fetch_errors: AtomicU64,
	retries: AtomicU64,
	last_fetch_micros: AtomicU64,
}
impl CacheMetrics {
	/// Counters for the cache called `cache`.
	pub fn new(cache: impl Into<Arc<str>>) -> Arc<Self> {
		Arc::new(Self {
			cache: cache.into(),
			total_requests: AtomicU64::new(0),
			cache_hits: AtomicU64::new(0),
			stale_serves: AtomicU64::new(0),
			fetch_successes: AtomicU64::new(0),
			fetch_errors: AtomicU64::new(0),
			retries: AtomicU64::new(0),
			last_fetch_micros: AtomicU64::new(0),
		})
	}

	/// Cache name used as the `cache` label.
	pub fn cache(&self) -> &str {
		&self.cache
	}

	/// A call answered from the store; `stale` marks a fallback after a failed fetch.
	pub fn record_hit(&self, stale: bool) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
		self.emit(REQUESTS, None);
		self.emit(HITS, None);

		if stale {
			self.stale_serves.fetch_add(1, Ordering::Relaxed);
			self.emit(STALE, None);
		}
	}

	/// A call the store could not answer.
	pub fn record_miss(&self) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
		self.emit(REQUESTS, None);
		self.emit(MISSES, None);
	}

	/// A fetch sequence that succeeded after `elapsed`, backoff included.
	pub fn record_fetch_success(&self, elapsed: Duration) {
		self.fetch_successes.fetch_add(1, Ordering::Relaxed);
		self.last_fetch_micros
			.store(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX), Ordering::Relaxed);
		self.emit(FETCHES, Some("success"));

		#[cfg(feature = "metrics")]
		metrics::histogram!(FETCH_SECONDS, self.labels(None).iter()).record(elapsed.as_secs_f64());
	}

	/// A fetch sequence that ran out of attempts or time.
	pub fn record_fetch_error(&self) {
		self.fetch_errors.fetch_add(1, Ordering::Relaxed);
		self.emit(FETCHES, Some("error"));
	}

	/// One backoff followed by another attempt.
	pub fn record_retry(&self) {
		self.retries.fetch_add(1, Ordering::Relaxed);
		self.emit(RETRIES, None);
	}

	/// Point-in-time copy of the counters.
	pub fn snapshot(&self) -> CacheMetricsSnapshot {
		CacheMetricsSnapshot {
			total_requests: self.total_requests.load(Ordering::Relaxed),
			cache_hits: self.cache_hits.load(Ordering::Relaxed),
			stale_serves: self.stale_serves.load(Ordering::Relaxed),
			fetch_successes: self.fetch_successes.load(Ordering::Relaxed),
			fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
			retries: self.retries.load(Ordering::Relaxed),
			last_fetch_micros: match self.last_fetch_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}

	#[cfg(feature = "metrics")]
	fn emit(&self, name: &'static str, status: Option<&'static str>) {
		metrics::counter!(name, self.labels(status).iter()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	fn emit(&self, _: &'static str, _: Option<&'static str>) {}

	#[cfg(feature = "metrics")]
	fn labels(&self, status: Option<&'static str>) -> SmallVec<[Label; 2]> {
		let mut labels = SmallVec::new();

		labels.push(Label::new("cache", self.cache.to_string()));

		if let Some(status) = status {
			labels.push(Label::new("status", status));
		}

		labels
	}
}

/// Counter values returned by [`CacheMetrics::snapshot`].
#[derive(Clone, Debug, PartialEq)]
pub struct CacheMetricsSnapshot {
	/// `get`/`refresh` calls observed.
	pub total_requests: u64,
	/// Calls answered from the store, stale fallbacks included.
	pub cache_hits: u64,
	/// Calls answered with stale data after a failed fetch.
	pub stale_serves: u64,
	/// Fetch sequences that ended in success.
	pub fetch_successes: u64,
	/// Fetch sequences that ended in failure.
	pub fetch_errors: u64,
	/// Individual retries performed.
	pub retries: u64,
	/// Microsecond latency of the most recent successful fetch.
	pub last_fetch_micros: Option<u64>,
}
impl CacheMetricsSnapshot {
	/// Share of calls answered from the store, stale fallbacks included.
	pub fn hit_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.cache_hits as f64 / self.total_requests as f64
		}
	}

	/// Share of calls answered with stale data after a failed fetch.
	pub fn stale_ratio(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.stale_serves as f64 / self.total_requests as f64
		}
	}
}

/// Install a global Prometheus recorder; later calls are no-ops.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Handle of the recorder installed by [`install_default_exporter`], for rendering scrapes.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}
