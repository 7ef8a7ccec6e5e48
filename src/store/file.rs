//! File-backed [`SharedStorage`] so separate processes can observe each other's markers.

// std
use std::{
	ffi::OsString,
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
	process,
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::{
	_prelude::*,
	store::{SharedStorage, StorageError},
};

/// Persists entries to a JSON file after each mutation and re-reads it on every lookup.
///
/// Writers replace the file through an atomic rename, so readers in other processes never see
/// a partially written snapshot. The backend has no change notifications; listeners poll.
#[derive(Clone, Debug)]
pub struct FileStorage {
	path: PathBuf,
	write_lock: Arc<Mutex<()>>,
}
impl FileStorage {
	/// Opens (or creates the parent directory for) a storage file at the provided path.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		Ok(Self { path, write_lock: Default::default() })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, String>, StorageError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StorageError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StorageError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StorageError::Backend {
				message: format!("Failed to create storage directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, contents: &HashMap<String, String>) -> Result<(), StorageError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StorageError::Serialization {
				message: format!("Failed to serialize storage snapshot: {e}"),
			})?;
		let tmp_path = self.scratch_path();
		let written = Self::write_scratch(&tmp_path, &serialized).and_then(|()| {
			fs::rename(&tmp_path, &self.path).map_err(|e| StorageError::Backend {
				message: format!("Failed to replace {}: {e}", self.path.display()),
			})
		});

		if written.is_err() {
			let _ = fs::remove_file(&tmp_path);
		}

		written
	}

	/// Unique sibling of the storage file; writers in other processes never share it.
	fn scratch_path(&self) -> PathBuf {
		static SEQ: AtomicU64 = AtomicU64::new(0);

		let mut name = self.path.file_name().map(OsString::from).unwrap_or_default();

		name.push(format!(".{}.{}.tmp", process::id(), SEQ.fetch_add(1, Ordering::Relaxed)));

		self.path.with_file_name(name)
	}

	fn write_scratch(tmp_path: &Path, serialized: &[u8]) -> Result<(), StorageError> {
		let mut file = File::create(tmp_path).map_err(|e| StorageError::Backend {
			message: format!("Failed to create {}: {e}", tmp_path.display()),
		})?;

		file.write_all(serialized).map_err(|e| StorageError::Backend {
			message: format!("Failed to write {}: {e}", tmp_path.display()),
		})?;
		file.sync_all().map_err(|e| StorageError::Backend {
			message: format!("Failed to sync {}: {e}", tmp_path.display()),
		})
	}

	fn mutate(&self, apply: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock();
		let mut snapshot = Self::load_snapshot(&self.path)?;

		apply(&mut snapshot);

		self.persist(&snapshot)
	}
}
impl SharedStorage for FileStorage {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(Self::load_snapshot(&self.path)?.remove(key))
	}

	fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
		self.mutate(|snapshot| {
			snapshot.insert(key.to_owned(), value);
		})
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.mutate(|snapshot| {
			snapshot.remove(key);
		})
	}
}
