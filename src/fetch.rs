//! Fetch-function contract and failure classification.

// std
use std::{future::Future, pin::Pin};
// crates.io
use http::StatusCode;
// self
use crate::_prelude::*;

/// Boxed future produced by a [`SharedFetch`].
pub type BoxFetchFuture<T> =
	Pin<Box<dyn Future<Output = std::result::Result<T, FetchError>> + Send + 'static>>;
/// Type-erased, clonable fetch function.
pub type SharedFetch<T> = Arc<dyn Fn() -> BoxFetchFuture<T> + Send + Sync>;

/// Failure reported by a fetch function.
///
/// The message is what consumers see in `ObservableResult::error`; `retryable` decides whether the
/// retry policy may spend another attempt on it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
	message: String,
	retryable: bool,
}
impl FetchError {
	/// Failure worth retrying (network blip, overloaded upstream).
	pub fn transient(message: impl Into<String>) -> Self {
		Self { message: message.into(), retryable: true }
	}

	/// Failure that retrying cannot fix (authorization, malformed request).
	pub fn permanent(message: impl Into<String>) -> Self {
		Self { message: message.into(), retryable: false }
	}

	/// A single attempt exceeded its time allowance.
	pub fn timed_out(limit: Duration) -> Self {
		Self::transient(format!("Fetch attempt timed out after {limit:?}."))
	}

	/// Classify an upstream HTTP status.
	pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
		Self { message: message.into(), retryable: is_retryable_status(status) }
	}

	/// Human-readable failure description.
	pub fn message(&self) -> &str {
		&self.message
	}

	/// Whether another attempt may succeed.
	pub fn is_retryable(&self) -> bool {
		self.retryable
	}
}
impl From<&str> for FetchError {
	fn from(value: &str) -> Self {
		Self::transient(value)
	}
}
impl From<String> for FetchError {
	fn from(value: String) -> Self {
		Self::transient(value)
	}
}
impl From<std::io::Error> for FetchError {
	fn from(value: std::io::Error) -> Self {
		Self::transient(value.to_string())
	}
}
impl From<serde_json::Error> for FetchError {
	fn from(value: serde_json::Error) -> Self {
		Self::permanent(value.to_string())
	}
}
impl From<reqwest::Error> for FetchError {
	fn from(value: reqwest::Error) -> Self {
		if let Some(status) = value.status() {
			Self::from_status(status, value.to_string())
		} else if value.is_decode() || value.is_builder() {
			Self::permanent(value.to_string())
		} else {
			Self::transient(value.to_string())
		}
	}
}
impl From<Error> for FetchError {
	fn from(value: Error) -> Self {
		match value {
			Error::Reqwest(err) => err.into(),
			Error::HttpStatus { status, .. } => {
				let message = value.to_string();

				Self::from_status(status, message)
			},
			Error::Io(_) | Error::Store(_) => Self::transient(value.to_string()),
			other => Self::permanent(other.to_string()),
		}
	}
}

/// Whether an upstream status is worth retrying.
///
/// Server errors, `408 Request Timeout`, and `429 Too Many Requests` are transient; every other
/// status (notably `401`/`403`) short-circuits the retry loop.
pub fn is_retryable_status(status: StatusCode) -> bool {
	status.is_server_error()
		|| status == StatusCode::REQUEST_TIMEOUT
		|| status == StatusCode::TOO_MANY_REQUESTS
}

/// Erase a fetch closure into a [`SharedFetch`].
pub fn shared<T, F, Fut, E>(fetch: F) -> SharedFetch<T>
where
	F: Fn() -> Fut + Send + Sync + 'static,
	Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
	E: Into<FetchError>,
	T: 'static,
{
	Arc::new(move || {
		let fut = fetch();

		Box::pin(async move { fut.await.map_err(Into::into) })
	})
}
