//! JSON encoding of cache entries for string key-value stores.
//!
//! The encoded form is `{"v":1,"value":…,"createdAt":…,"expiresAt":…}` with RFC 3339 timestamps.
//! Anything that fails to decode is reported as a [`DecodeError`], which the cache treats exactly
//! like a missing entry.

// crates.io
use serde::{Deserialize, Serialize, de::DeserializeOwned};
// self
use crate::{_prelude::*, cache::entry::CacheEntry};

/// Current encoding version.
pub const ENCODING_VERSION: u32 = 1;

/// Failure to turn a stored string back into a [`CacheEntry`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
	/// The payload is not valid JSON or does not match the expected shape.
	#[error("Malformed cache entry: {0}")]
	Malformed(#[from] serde_json::Error),
	/// The payload was written by an incompatible encoder.
	#[error("Unsupported cache entry encoding version {0}.")]
	UnsupportedVersion(u32),
	/// The timestamps violate `expires_at >= created_at`.
	#[error("Cache entry expires before it was created.")]
	InvertedTimestamps,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Encoded<'a, T> {
	v: u32,
	value: &'a T,
	created_at: DateTime<Utc>,
	expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Decoded<T> {
	v: u32,
	value: T,
	created_at: DateTime<Utc>,
	expires_at: DateTime<Utc>,
}

/// Serialise an entry to its stored string form.
pub fn encode<T>(entry: &CacheEntry<T>) -> Result<String>
where
	T: Serialize,
{
	let encoded = Encoded {
		v: ENCODING_VERSION,
		value: entry.value(),
		created_at: entry.created_at(),
		expires_at: entry.expires_at(),
	};

	Ok(serde_json::to_string(&encoded)?)
}

/// Parse a stored string back into an entry.
pub fn decode<T>(raw: &str) -> std::result::Result<CacheEntry<T>, DecodeError>
where
	T: DeserializeOwned,
{
	let decoded: Decoded<T> = serde_json::from_str(raw)?;

	if decoded.v != ENCODING_VERSION {
		return Err(DecodeError::UnsupportedVersion(decoded.v));
	}

	CacheEntry::from_parts(decoded.value, decoded.created_at, decoded.expires_at)
		.ok_or(DecodeError::InvertedTimestamps)
}
