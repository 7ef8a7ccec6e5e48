//! In-process [`SharedStorage`] with change notifications, shared by cloning.

// crates.io
use tokio::sync::broadcast;
// self
use crate::{
	_prelude::*,
	store::{SharedStorage, StorageChange, StorageError},
};

const CHANGE_CAPACITY: usize = 64;

type StorageMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps entries in-process; clones observe each other's writes.
#[derive(Clone, Debug)]
pub struct MemoryStorage {
	map: StorageMap,
	changes: broadcast::Sender<StorageChange>,
}
impl MemoryStorage {
	fn notify(&self, key: &str, value: Option<String>) {
		// No subscribers is fine; the value is still stored.
		let _ = self.changes.send(StorageChange { key: key.to_owned(), value });
	}
}
impl Default for MemoryStorage {
	fn default() -> Self {
		let (changes, _) = broadcast::channel(CHANGE_CAPACITY);

		Self { map: Default::default(), changes }
	}
}
impl SharedStorage for MemoryStorage {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.map.read().get(key).cloned())
	}

	fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
		self.map.write().insert(key.to_owned(), value.clone());
		self.notify(key, Some(value));

		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		let removed = self.map.write().remove(key);

		if removed.is_some() {
			self.notify(key, None);
		}

		Ok(())
	}

	fn subscribe(&self) -> Option<broadcast::Receiver<StorageChange>> {
		Some(self.changes.subscribe())
	}
}
