//! Wall-clock sources used for entry timestamps and expiration checks.

// std
use std::{fmt::Debug, sync::Mutex};
// self
use crate::_prelude::*;

/// Supplies the current wall-clock time.
///
/// Entry timestamps are persisted, so the clock reports UTC time rather than a monotonic instant.
pub trait Clock: Debug + Send + Sync {
	/// Current UTC time.
	fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Manually driven clock for deterministic expiration tests.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<DateTime<Utc>>,
}
impl ManualClock {
	/// Create a clock frozen at `start`.
	pub fn new(start: DateTime<Utc>) -> Self {
		Self { now: Mutex::new(start) }
	}

	/// Move the clock forward by `delta`.
	pub fn advance(&self, delta: Duration) {
		let delta = TimeDelta::from_std(delta).unwrap_or(TimeDelta::MAX);
		let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

		*now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
	}

	/// Jump the clock to an absolute time.
	pub fn set(&self, at: DateTime<Utc>) {
		*self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = at;
	}
}
impl Default for ManualClock {
	fn default() -> Self {
		Self::new(Utc::now())
	}
}
impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}
