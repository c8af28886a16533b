//! Per-call state machine and the consumer-facing result projection.

// crates.io
use serde::Serialize;
// self
use crate::fetch::FetchError;

/// Lifecycle of one `get`/`refresh` call.
///
/// `Idle → Resolved` on a cache hit, otherwise
/// `Idle → Fetching → … → Resolved | DegradedResolved | Failed`. Nothing survives the call except
/// what was written to the store.
#[derive(Clone, Debug, PartialEq)]
pub enum CallState<T> {
	/// Nothing has happened yet.
	Idle,
	/// An attempt is running; carries the error of the previous attempt, if any.
	Fetching {
		/// 1-based attempt number.
		attempt: u32,
		/// Failure of the previous attempt.
		last_error: Option<FetchError>,
	},
	/// A value is available, either from the store or a completed fetch.
	Resolved {
		/// Resolved value.
		value: T,
		/// Whether the value came from the store rather than a fetch.
		from_cache: bool,
	},
	/// Fetching failed but a stored (possibly expired) value is being served.
	DegradedResolved {
		/// Stored value served in place of fresh data.
		value: T,
		/// Failure that forced the fallback.
		error: FetchError,
	},
	/// Fetching failed and nothing was stored to fall back to.
	Failed {
		/// Final failure.
		error: FetchError,
	},
}
impl<T> CallState<T> {
	/// Whether the call has reached a terminal state.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Resolved { .. } | Self::DegradedResolved { .. } | Self::Failed { .. })
	}

	/// Enter the next fetch attempt, carrying forward the previous failure.
	pub fn begin_attempt(&mut self, attempt: u32) {
		let last_error = match std::mem::replace(self, Self::Idle) {
			Self::Fetching { last_error, .. } => last_error,
			_ => None,
		};

		*self = Self::Fetching { attempt, last_error };
	}

	/// Record a failed attempt without leaving the fetching state.
	pub fn attempt_failed(&mut self, error: FetchError) {
		if let Self::Fetching { last_error, .. } = self {
			*last_error = Some(error);
		}
	}

	/// Error of the most recent failed attempt.
	pub fn last_error(&self) -> Option<&FetchError> {
		match self {
			Self::Fetching { last_error, .. } => last_error.as_ref(),
			Self::DegradedResolved { error, .. } | Self::Failed { error } => Some(error),
			_ => None,
		}
	}

	/// Project the state into what consumers observe.
	pub fn into_result(self) -> ObservableResult<T> {
		match self {
			Self::Idle => ObservableResult::empty(),
			Self::Fetching { .. } => ObservableResult::pending(),
			Self::Resolved { value, from_cache } => ObservableResult {
				data: Some(value),
				loading: false,
				error: None,
				is_from_cache: from_cache,
			},
			Self::DegradedResolved { value, error } => ObservableResult {
				data: Some(value),
				loading: false,
				error: Some(error.message().to_owned()),
				is_from_cache: true,
			},
			Self::Failed { error } => ObservableResult {
				data: None,
				loading: false,
				error: Some(error.message().to_owned()),
				is_from_cache: false,
			},
		}
	}
}

/// What a consumer sees: `{ data, loading, error, isFromCache }`.
///
/// `is_from_cache` together with `error` distinguishes a fresh success (`false`, `None`), a cache
/// hit (`true`, `None`), and stale data served after a failure (`true`, `Some`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservableResult<T> {
	/// Resolved value, if any.
	pub data: Option<T>,
	/// Whether a fetch is in progress.
	pub loading: bool,
	/// Message of the failure that ended the last fetch, if any.
	pub error: Option<String>,
	/// Whether `data` came from the store rather than a just-completed fetch.
	pub is_from_cache: bool,
}
impl<T> ObservableResult<T> {
	/// Initial state before anything has been requested.
	pub fn empty() -> Self {
		Self { data: None, loading: false, error: None, is_from_cache: false }
	}

	/// State while the first fetch is in flight.
	pub fn pending() -> Self {
		Self { data: None, loading: true, error: None, is_from_cache: false }
	}

	/// Whether stale data is being served after a failed fetch.
	pub fn is_degraded(&self) -> bool {
		self.is_from_cache && self.error.is_some() && self.data.is_some()
	}

	/// Whether the call failed with nothing to show.
	pub fn is_failed(&self) -> bool {
		self.data.is_none() && self.error.is_some()
	}

	/// Map the carried value, preserving the flags.
	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ObservableResult<U> {
		ObservableResult {
			data: self.data.map(f),
			loading: self.loading,
			error: self.error,
			is_from_cache: self.is_from_cache,
		}
	}
}
impl<T> Default for ObservableResult<T> {
	fn default() -> Self {
		Self::empty()
	}
}
