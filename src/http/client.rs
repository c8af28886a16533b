//! Reqwest-backed JSON source usable as a cache fetch function.

// crates.io
use http::{
	HeaderValue,
	header::{ACCEPT, AUTHORIZATION},
};
use reqwest::{Client, redirect::Policy};
use serde::de::DeserializeOwned;
use url::Url;
// self
use crate::{_prelude::*, key::CacheKey};

/// Default size guard for response bodies (4 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 4 * 1_048_576;
/// Maximum redirect depth.
pub const MAX_REDIRECTS: usize = 10;

/// Remote JSON endpoint for one entity collection or query.
///
/// Errors come back as crate [`Error`]s; converting them into
/// [`FetchError`](crate::FetchError) classifies `401`/`403`/`404` as permanent and `5xx`, `408`,
/// `429`, and transport failures as retryable.
#[derive(Clone, Debug)]
pub struct JsonSource {
	client: Client,
	url: Url,
	bearer_token: Option<String>,
	max_response_bytes: u64,
}
impl JsonSource {
	/// Build a source for `url` with the default reqwest client.
	pub fn new(url: impl AsRef<str>) -> Result<Self> {
		let client = Client::builder()
			.redirect(Policy::limited(MAX_REDIRECTS))
			.user_agent(format!("resilient-cache/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(Duration::from_secs(5))
			.build()?;

		Ok(Self::with_client(client, Url::parse(url.as_ref())?))
	}

	/// Build a source using the supplied HTTP client.
	pub fn with_client(client: Client, url: Url) -> Self {
		Self { client, url, bearer_token: None, max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES }
	}

	/// Send `Authorization: Bearer <token>` with every request.
	pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
		self.bearer_token = Some(token.into());

		self
	}

	/// Reject bodies larger than `limit` bytes.
	pub fn max_response_bytes(mut self, limit: u64) -> Self {
		self.max_response_bytes = limit;

		self
	}

	/// Endpoint URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Cache key derived from the endpoint URL, query string included.
	pub fn cache_key(&self) -> Result<CacheKey> {
		CacheKey::for_query("http", self.url.as_str())
	}

	/// GET the endpoint and decode the JSON body.
	pub async fn fetch<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut builder = self
			.client
			.get(self.url.clone())
			.header(ACCEPT, HeaderValue::from_static("application/json"));

		if let Some(token) = &self.bearer_token {
			let value =
				HeaderValue::from_str(&format!("Bearer {token}")).map_err(|err| Error::Validation {
					field: "bearer_token",
					reason: format!("Invalid header value: {err}."),
				})?;

			builder = builder.header(AUTHORIZATION, value);
		}

		let start = Instant::now();
		let response = builder.send().await?;
		let status = response.status();

		if !status.is_success() {
			let body = response.text().await.ok();

			return Err(Error::HttpStatus { status, url: self.url.clone(), body });
		}
		if let Some(length) = response.content_length()
			&& length > self.max_response_bytes
		{
			return Err(self.oversized(length));
		}

		let bytes = response.bytes().await?;

		if bytes.len() as u64 > self.max_response_bytes {
			return Err(self.oversized(bytes.len() as u64));
		}

		let value = serde_json::from_slice(&bytes)?;

		tracing::debug!(
			url = %self.url,
			status = %status,
			elapsed = ?start.elapsed(),
			bytes = bytes.len(),
			"json fetch complete"
		);

		Ok(value)
	}

	fn oversized(&self, size: u64) -> Error {
		Error::Validation {
			field: "max_response_bytes",
			reason: format!(
				"Response size {size} bytes exceeds the configured guard of {limit} bytes.",
				limit = self.max_response_bytes
			),
		}
	}
}
