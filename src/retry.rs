//! Retry policy and the executor that budgets attempts for one cache call.

// std
use std::cell::RefCell;
// crates.io
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, fetch::FetchError};

thread_local! {
	static SMALL_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_rng(&mut rand::rng()));
}

/// Default number of fetch attempts per call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);
/// Default exponential growth factor between retries.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Supported jitter strategies for retry policies.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
	/// No jitter; deterministic backoff schedule.
	#[default]
	None,
	/// Randomize each delay within the upper fifth of the computed backoff.
	Full,
	/// Decorrelated jitter per AWS architecture guidance.
	Decorrelated,
}

/// Bounded exponential-backoff retry configuration.
///
/// The policy is pure: it answers whether to retry and how long to wait, and the cache performs
/// the actual sleep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Total fetch attempts per call, including the first one.
	pub max_attempts: u32,
	/// Delay before the second attempt.
	pub base_delay: Duration,
	/// Multiplier applied to the delay after each failed attempt.
	pub backoff_factor: f64,
	/// Optional upper bound on any single delay.
	pub max_delay: Option<Duration>,
	/// Strategy used to randomize the computed backoff.
	pub jitter: JitterStrategy,
	/// Optional time allowance for each individual attempt.
	pub attempt_timeout: Option<Duration>,
	/// Optional wall-clock budget for the whole retry sequence.
	pub deadline: Option<Duration>,
}
impl RetryPolicy {
	/// Policy that performs exactly one attempt.
	pub fn no_retry() -> Self {
		Self { max_attempts: 1, ..Self::default() }
	}

	/// Validate invariants for retry configuration.
	pub fn validate(&self) -> Result<()> {
		if self.max_attempts == 0 {
			return Err(Error::Validation {
				field: "retry.max_attempts",
				reason: "Must be at least 1.".into(),
			});
		}
		if self.base_delay.is_zero() {
			return Err(Error::Validation {
				field: "retry.base_delay",
				reason: "Must be greater than zero.".into(),
			});
		}
		if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
			return Err(Error::Validation {
				field: "retry.backoff_factor",
				reason: "Must be a finite number of at least 1.".into(),
			});
		}
		if let Some(max_delay) = self.max_delay
			&& max_delay < self.base_delay
		{
			return Err(Error::Validation {
				field: "retry.max_delay",
				reason: "Must be greater than or equal to base_delay.".into(),
			});
		}
		if self.attempt_timeout.is_some_and(|timeout| timeout.is_zero()) {
			return Err(Error::Validation {
				field: "retry.attempt_timeout",
				reason: "Must be greater than zero when set.".into(),
			});
		}
		if self.deadline.is_some_and(|deadline| deadline.is_zero()) {
			return Err(Error::Validation {
				field: "retry.deadline",
				reason: "Must be greater than zero when set.".into(),
			});
		}

		Ok(())
	}

	/// Whether a failed `attempt` (1-based) may be followed by another one.
	///
	/// Non-retryable errors short-circuit regardless of the remaining attempt budget.
	pub fn should_retry(&self, attempt: u32, error: &FetchError) -> bool {
		error.is_retryable() && attempt < self.max_attempts
	}

	/// Deterministic delay after a failed `attempt`: `base_delay * backoff_factor^(attempt - 1)`.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
		let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
		let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);

		match self.max_delay {
			Some(max_delay) => delay.min(max_delay),
			None => delay,
		}
	}

	/// Delay after a failed `attempt` with the configured jitter applied.
	pub fn backoff_for(&self, attempt: u32) -> Duration {
		let bounded = self.delay_for(attempt);

		match self.jitter {
			JitterStrategy::None => bounded,
			JitterStrategy::Full => random_within(bounded.mul_f64(0.8).max(self.base_delay), bounded),
			JitterStrategy::Decorrelated => {
				let ceiling = bounded.saturating_mul(3);
				let ceiling = match self.max_delay {
					Some(max_delay) => ceiling.min(max_delay),
					None => ceiling,
				};

				random_within(self.base_delay, ceiling.max(self.base_delay))
			},
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			base_delay: DEFAULT_BASE_DELAY,
			backoff_factor: DEFAULT_BACKOFF_FACTOR,
			max_delay: None,
			jitter: JitterStrategy::None,
			attempt_timeout: None,
			deadline: None,
		}
	}
}

/// Result of budgeting a fetch attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptBudget {
	/// Another attempt is permitted.
	Granted {
		/// 1-based number of the upcoming attempt.
		attempt: u32,
		/// Time allowance for the attempt, if bounded.
		timeout: Option<Duration>,
	},
	/// Attempts or time exhausted; no further attempts allowed.
	Exhausted,
}

/// Tracks attempts and the time budget for a single `get`/`refresh` call.
#[derive(Debug)]
pub struct RetryExecutor<'a> {
	policy: &'a RetryPolicy,
	deadline: Option<Instant>,
	attempts_used: u32,
}
impl<'a> RetryExecutor<'a> {
	/// Create an executor; the effective deadline is the earlier of the policy's and `call_deadline`.
	pub fn new(policy: &'a RetryPolicy, call_deadline: Option<Instant>) -> Self {
		let policy_deadline = policy.deadline.and_then(|budget| Instant::now().checked_add(budget));
		let deadline = match (policy_deadline, call_deadline) {
			(Some(a), Some(b)) => Some(a.min(b)),
			(a, b) => a.or(b),
		};

		Self { policy, deadline, attempts_used: 0 }
	}

	/// Budget the next attempt, consuming it when granted.
	pub fn begin_attempt(&mut self) -> AttemptBudget {
		if self.attempts_used >= self.policy.max_attempts {
			return AttemptBudget::Exhausted;
		}

		let remaining = self.remaining_budget();

		if remaining.is_some_and(|remaining| remaining.is_zero()) {
			return AttemptBudget::Exhausted;
		}

		let timeout = match (self.policy.attempt_timeout, remaining) {
			(Some(timeout), Some(remaining)) => Some(timeout.min(remaining)),
			(timeout, remaining) => timeout.or(remaining),
		};

		self.attempts_used = self.attempts_used.saturating_add(1);

		AttemptBudget::Granted { attempt: self.attempts_used, timeout }
	}

	/// Number of attempts already started.
	pub fn attempts_used(&self) -> u32 {
		self.attempts_used
	}

	/// Remaining wall-clock budget, or `None` when the call is unbounded.
	pub fn remaining_budget(&self) -> Option<Duration> {
		self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
	}

	/// Backoff to wait after the current attempt failed with `error`.
	///
	/// Returns `None` when the policy refuses another attempt or the wait would outlast the
	/// deadline, in which case the caller should stop immediately.
	pub fn next_backoff(&self, error: &FetchError) -> Option<Duration> {
		if !self.policy.should_retry(self.attempts_used, error) {
			tracing::debug!(
				attempt = self.attempts_used,
				retryable = error.is_retryable(),
				"retry budget exhausted"
			);

			return None;
		}

		let delay = self.policy.backoff_for(self.attempts_used);

		if let Some(remaining) = self.remaining_budget()
			&& delay >= remaining
		{
			tracing::debug!(attempt = self.attempts_used, ?delay, ?remaining, "deadline precludes retry");

			return None;
		}

		tracing::debug!(attempt = self.attempts_used, ?delay, "retry backoff computed");

		Some(delay)
	}
}

fn random_within(min: Duration, max: Duration) -> Duration {
	if max <= min {
		return max;
	}
	SMALL_RNG.with(|cell| {
		let mut rng = cell.borrow_mut();
		let nanos = max.as_nanos() - min.as_nanos();
		let jitter = rng.random_range(0..=nanos.min(u64::MAX as u128));

		min + Duration::from_nanos(jitter as u64)
	})
}
