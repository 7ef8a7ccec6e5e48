//! Locally cached user identity that teardown must wipe.

// self
use crate::_prelude::*;

/// User identity cached by a tab after login (display name, roles, etc.).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	/// Stable user identifier.
	pub user_id: String,
	/// Optional human-readable name shown by the UI.
	pub display_name: Option<String>,
	/// Role labels as reported by the API; never interpreted here.
	#[serde(default)]
	pub roles: Vec<String>,
}
impl Identity {
	/// Creates an identity with no display name or roles.
	pub fn new(user_id: impl Into<String>) -> Self {
		Self { user_id: user_id.into(), display_name: None, roles: Vec::new() }
	}

	/// Sets the display name.
	pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
		self.display_name = Some(name.into());

		self
	}

	/// Replaces the role labels.
	pub fn with_roles<I, S>(mut self, roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.roles = roles.into_iter().map(Into::into).collect();

		self
	}
}

/// Thread-safe slot holding the current tab's [`Identity`].
#[derive(Debug, Default)]
pub struct IdentityCache(RwLock<Option<Identity>>);
impl IdentityCache {
	/// Returns a copy of the cached identity.
	pub fn get(&self) -> Option<Identity> {
		self.0.read().clone()
	}

	/// Replaces the cached identity.
	pub fn set(&self, identity: Identity) {
		*self.0.write() = Some(identity);
	}

	/// Removes the cached identity, returning the previous value.
	pub fn clear(&self) -> Option<Identity> {
		self.0.write().take()
	}

	/// Whether an identity is cached.
	pub fn is_present(&self) -> bool {
		self.0.read().is_some()
	}
}
