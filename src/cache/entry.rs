//! Time-stamped cache entry.

// self
use crate::_prelude::*;

/// A cached value together with its write time and expiry.
///
/// Entries are immutable; a refresh writes a new entry rather than touching an existing one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry<T> {
	value: T,
	created_at: DateTime<Utc>,
	expires_at: DateTime<Utc>,
}
impl<T> CacheEntry<T> {
	/// Create an entry written at `created_at` that expires after `ttl`.
	///
	/// Expiry saturates at the largest representable timestamp.
	pub fn new(value: T, created_at: DateTime<Utc>, ttl: Duration) -> Self {
		let expires_at = TimeDelta::from_std(ttl)
			.ok()
			.and_then(|ttl| created_at.checked_add_signed(ttl))
			.unwrap_or(DateTime::<Utc>::MAX_UTC);

		Self { value, created_at, expires_at }
	}

	/// Rebuild an entry from explicit timestamps, rejecting `expires_at < created_at`.
	pub fn from_parts(
		value: T,
		created_at: DateTime<Utc>,
		expires_at: DateTime<Utc>,
	) -> Option<Self> {
		(expires_at >= created_at).then_some(Self { value, created_at, expires_at })
	}

	/// Borrow the cached value.
	pub fn value(&self) -> &T {
		&self.value
	}

	/// Take ownership of the cached value.
	pub fn into_value(self) -> T {
		self.value
	}

	/// When the entry was written.
	pub fn created_at(&self) -> DateTime<Utc> {
		self.created_at
	}

	/// When the entry stops being fresh.
	pub fn expires_at(&self) -> DateTime<Utc> {
		self.expires_at
	}

	/// Whether the entry may be served without fetching; inclusive of `expires_at`.
	pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
		now <= self.expires_at
	}

	/// Whether the entry has passed its expiry.
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		!self.is_fresh(now)
	}

	/// Time elapsed since the entry was written, clamped at zero.
	pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
		(now - self.created_at).max(TimeDelta::zero())
	}
}
