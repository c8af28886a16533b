//! Cache key construction.

// std
use std::fmt::{Display, Formatter, Result as FmtResult};
// crates.io
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Opaque identifier of one logical query.
///
/// The cache never partitions keys on its own; distinct parameter sets must produce distinct keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Arc<str>);
impl CacheKey {
	/// Wrap a caller-supplied key verbatim.
	pub fn new(raw: impl Into<Arc<str>>) -> Self {
		Self(raw.into())
	}

	/// Derive a key from a namespace and a serialisable parameter set.
	///
	/// Parameters are hashed as JSON with sorted object keys, so map ordering never changes the
	/// key while any change in value does.
	pub fn for_query<P>(namespace: &str, params: &P) -> Result<Self>
	where
		P: ?Sized + Serialize,
	{
		if namespace.is_empty() {
			return Err(Error::Validation {
				field: "namespace",
				reason: "Must not be empty.".into(),
			});
		}

		let value = serde_json::to_value(params)?;
		let canonical = serde_json::to_vec(&value)?;
		let digest = Sha256::digest(&canonical);

		Ok(Self(format!("{namespace}:{}", BASE64_URL_SAFE_NO_PAD.encode(digest)).into()))
	}

	/// Borrow the key as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for CacheKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl From<&str> for CacheKey {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl From<String> for CacheKey {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}
