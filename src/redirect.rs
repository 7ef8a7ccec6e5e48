//! Login destination resolution and non-reversible navigation.

// self
use crate::{_prelude::*, config::GatewayConfig, error::ConfigError};

/// Computes the canonical login URL, guarding against same-origin redirect loops.
///
/// The login page lives outside the application. When the configured login origin turns out to
/// be the application's own origin (a common misconfiguration when both are served behind one
/// host), navigating there would loop back into the app, so the explicit fallback origin is used
/// instead. The decision is made once, when the resolver is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedirectResolver {
	login_url: Url,
}
impl RedirectResolver {
	/// Resolves and validates the login destination for `config`.
	pub fn new(config: &GatewayConfig) -> Result<Self, ConfigError> {
		let app = config.app_origin.origin();
		let origin = if config.login_origin.origin() == app {
			config
				.fallback_login_origin
				.as_ref()
				.filter(|fallback| fallback.origin() != app)
				.ok_or_else(|| ConfigError::LoginLoop { url: config.login_origin.to_string() })?
		} else {
			&config.login_origin
		};
		let login_url = origin
			.join(&config.login_path)
			.map_err(|source| ConfigError::InvalidUrl { field: "login_path", source })?;

		Ok(Self { login_url })
	}

	/// Returns the login destination.
	pub fn resolve_login_url(&self) -> Url {
		self.login_url.clone()
	}

	/// Whether `url` already points at the login page (query and fragment ignored).
	pub fn is_login_page(&self, url: &Url) -> bool {
		url.origin() == self.login_url.origin() && url.path() == self.login_url.path()
	}
}

/// Navigation collaborator provided by the UI layer.
pub trait Navigator
where
	Self: Send + Sync,
{
	/// Location currently displayed, if known.
	fn current(&self) -> Option<Url>;

	/// Replaces the current history entry with `url`, so "back" cannot return to it.
	fn replace(&self, url: Url) -> Result<(), NavigationError>;
}

/// Error raised by a [`Navigator`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum NavigationError {
	/// The navigator refused the destination.
	#[error("Navigation to {url} was rejected: {reason}.")]
	Rejected {
		/// Destination that was refused.
		url: String,
		/// Navigator-supplied reason.
		reason: String,
	},
}

#[derive(Debug)]
struct HistoryState {
	entries: Vec<Url>,
	index: usize,
	replacements: usize,
}

/// In-memory browser-style history used by headless runtimes, demos, and tests.
#[derive(Debug)]
pub struct MemoryHistory(Mutex<HistoryState>);
impl MemoryHistory {
	/// Creates a history whose only entry is `start`.
	pub fn new(start: Url) -> Self {
		Self(Mutex::new(HistoryState { entries: vec![start], index: 0, replacements: 0 }))
	}

	/// Pushes a new entry, discarding any forward entries.
	pub fn push(&self, url: Url) {
		let mut state = self.0.lock();
		let keep = state.index + 1;

		state.entries.truncate(keep);
		state.entries.push(url);
		state.index = keep;
	}

	/// Moves one entry back, returning the new current location if there was one.
	pub fn back(&self) -> Option<Url> {
		let mut state = self.0.lock();

		if state.index == 0 {
			return None;
		}

		state.index -= 1;

		Some(state.entries[state.index].clone())
	}

	/// Number of entries, including forward entries.
	pub fn len(&self) -> usize {
		self.0.lock().entries.len()
	}

	/// Whether the history holds no entries; never true for a history built with [`new`](Self::new).
	pub fn is_empty(&self) -> bool {
		self.0.lock().entries.is_empty()
	}

	/// Number of [`Navigator::replace`] calls served so far.
	pub fn replacements(&self) -> usize {
		self.0.lock().replacements
	}
}
impl Navigator for MemoryHistory {
	fn current(&self) -> Option<Url> {
		let state = self.0.lock();

		state.entries.get(state.index).cloned()
	}

	fn replace(&self, url: Url) -> Result<(), NavigationError> {
		let mut state = self.0.lock();
		let index = state.index;

		state.entries[index] = url;
		state.replacements += 1;

		Ok(())
	}
}
