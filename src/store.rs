//! Per-tab token storage plus the shared key-value storage used by the cross-tab fallback.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

// crates.io
use tokio::sync::broadcast;
// self
use crate::{_prelude::*, auth::AccessToken};

/// Holder of the current tab's [`AccessToken`].
///
/// Every outgoing request reads it; only renewal, login, and teardown write it. Locks are held
/// for a single read or write and never across an `.await`.
#[derive(Debug, Default)]
pub struct TokenStore(RwLock<Option<AccessToken>>);
impl TokenStore {
	/// Returns the current token, if any.
	pub fn get(&self) -> Option<AccessToken> {
		self.0.read().clone()
	}

	/// Replaces the current token.
	pub fn set(&self, token: AccessToken) {
		*self.0.write() = Some(token);
	}

	/// Removes the current token, returning the previous value.
	pub fn clear(&self) -> Option<AccessToken> {
		self.0.write().take()
	}

	/// Whether a token is present.
	pub fn is_present(&self) -> bool {
		self.0.read().is_some()
	}
}

/// Key-value storage visible to every tab (the equivalent of browser `localStorage`).
pub trait SharedStorage
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`.
	fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

	/// Removes `key`.
	fn remove(&self, key: &str) -> Result<(), StorageError>;

	/// Subscribes to change notifications.
	///
	/// Backends that cannot observe writes made elsewhere return `None`; listeners then fall
	/// back to polling [`get`](SharedStorage::get).
	fn subscribe(&self) -> Option<broadcast::Receiver<StorageChange>> {
		None
	}
}

/// Change notification emitted by storages that support [`SharedStorage::subscribe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageChange {
	/// Key that changed.
	pub key: String,
	/// New value, or `None` when the key was removed.
	pub value: Option<String>,
}

/// Error type produced by [`SharedStorage`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StorageError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
