//! Directory-backed store that survives process restarts.

// std
use std::{
	fs,
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// crates.io
use base64::prelude::*;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
// self
use crate::{_prelude::*, store::KeyValueStore};

/// Stores each key as one file inside a directory.
///
/// File names are the SHA-256 digest of the key, so arbitrary keys map to safe paths. Writes go
/// through a temporary file and a rename, so readers never observe a half-written value.
#[derive(Clone, Debug)]
pub struct FileStore {
	root: PathBuf,
}
impl FileStore {
	/// Open (and create if needed) a store rooted at `root`.
	pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
		let root = root.into();

		fs::create_dir_all(&root)?;

		Ok(Self { root })
	}

	/// Directory holding the entry files.
	pub fn root(&self) -> &Path {
		&self.root
	}

	fn path_for(&self, key: &str) -> PathBuf {
		let digest = Sha256::digest(key.as_bytes());

		self.root.join(format!("{}.json", BASE64_URL_SAFE_NO_PAD.encode(digest)))
	}
}
impl KeyValueStore for FileStore {
	fn name(&self) -> &'static str {
		"file"
	}

	fn get(&self, key: &str) -> Result<Option<String>> {
		match fs::read_to_string(self.path_for(key)) {
			Ok(raw) => Ok(Some(raw)),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
			Err(err) => Err(err.into()),
		}
	}

	fn set(&self, key: &str, value: &str) -> Result<()> {
		let mut staging = NamedTempFile::new_in(&self.root)?;

		staging.write_all(value.as_bytes())?;
		staging.as_file().sync_all()?;
		staging.persist(self.path_for(key)).map_err(|err| err.error)?;

		Ok(())
	}

	fn remove(&self, key: &str) -> Result<()> {
		match fs::remove_file(self.path_for(key)) {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
			Err(err) => Err(err.into()),
		}
	}
}
