//! Per-tab session state: token store, identity cache, teardown guard, and redirect plumbing.
//!
//! A [`Session`] is built once per runtime and shared (behind `Arc`) by every gateway clone and
//! by the cross-tab listener. It owns the only mutable shared state of a tab: the token store
//! and the pending-renewal slot. Cross-tab coordination goes through its
//! [`InvalidationBus`], never through shared memory.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use tokio::{
	runtime::Handle,
	sync::{broadcast, watch},
	task::JoinHandle,
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Identity, IdentityCache},
	bus::{ChannelHub, CrossTabListener, InvalidationBus},
	config::GatewayConfig,
	gateway::{GatewayMetrics, RefreshSlot},
	notice::{NoticeOrigin, SessionEvent, SignOutNotice},
	obs::{obs_debug, obs_info, obs_warn},
	redirect::{MemoryHistory, Navigator, RedirectResolver},
	store::{MemoryStorage, SharedStorage, TokenStore},
};

const EVENT_CAPACITY: usize = 16;

/// Identifier of one tab (one gateway runtime); used for diagnostics only.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(String);
impl TabId {
	/// Wraps an explicit identifier.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Generates a random identifier.
	pub fn random() -> Self {
		Self(format!("{:016x}", rand::random::<u64>()))
	}

	/// Borrows the identifier.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for TabId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TabId({})", self.0)
	}
}
impl Display for TabId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Coarse lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
	/// Requests may renew the token.
	Active,
	/// Teardown ran; further invalidations are no-ops until the next login.
	SignedOut,
}

/// State owned by a single tab.
pub struct Session {
	/// Identifier of this tab.
	pub tab: TabId,
	/// Shared configuration.
	pub config: Arc<GatewayConfig>,
	/// Current access token.
	pub tokens: TokenStore,
	/// Cached user identity.
	pub identity: IdentityCache,
	/// Counters for renewals, retries, and teardowns.
	pub metrics: Arc<GatewayMetrics>,
	/// Cross-tab mechanism selected at startup.
	pub bus: InvalidationBus,
	pub(crate) pending: RefreshSlot,
	redirect: RedirectResolver,
	navigator: Arc<dyn Navigator>,
	signed_out: AtomicBool,
	events: broadcast::Sender<SessionEvent>,
	redirected: watch::Sender<Option<Url>>,
}
impl Session {
	/// Creates a builder for the provided configuration.
	pub fn builder(config: GatewayConfig) -> SessionBuilder {
		SessionBuilder::new(config)
	}

	/// Stores the credentials obtained by a login and re-arms teardown.
	pub fn establish(&self, token: AccessToken, identity: Option<Identity>) {
		self.tokens.set(token);

		match identity {
			Some(identity) => self.identity.set(identity),
			None => {
				self.identity.clear();
			},
		}

		self.redirected.send_replace(None);
		self.signed_out.store(false, Ordering::Release);

		obs_info!("Session established for tab {}.", self.tab);
	}

	/// Current lifecycle state.
	pub fn state(&self) -> SessionState {
		if self.signed_out.load(Ordering::Acquire) {
			SessionState::SignedOut
		} else {
			SessionState::Active
		}
	}

	/// Whether teardown has run since the last login.
	pub fn is_signed_out(&self) -> bool {
		self.state() == SessionState::SignedOut
	}

	/// Whether a renewal is currently in flight for this tab.
	pub fn is_refreshing(&self) -> bool {
		self.pending.is_pending()
	}

	/// Subscribes to same-tab [`SessionEvent`]s.
	pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
		self.events.subscribe()
	}

	/// Canonical login destination.
	pub fn login_url(&self) -> Url {
		self.redirect.resolve_login_url()
	}

	/// Navigation collaborator used for redirects.
	pub fn navigator(&self) -> &Arc<dyn Navigator> {
		&self.navigator
	}

	/// Resolves once the post-teardown redirect has happened, returning its destination.
	pub async fn redirected(&self) -> Url {
		let mut receiver = self.redirected.subscribe();
		// The sender lives as long as `self`, so the wait only ends with a value.
		let url = match receiver.wait_for(Option::is_some).await {
			Ok(value) => value.clone(),
			Err(_) => None,
		};

		url.unwrap_or_else(|| self.login_url())
	}

	/// Subscribes to cross-tab invalidations. Call at startup, before other tabs may publish.
	pub fn listen(self: &Arc<Self>) -> CrossTabListener {
		CrossTabListener::new(Arc::clone(self))
	}

	/// Subscribes and drives the listener on the current tokio runtime; must be called inside one.
	pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
		tokio::spawn(self.listen().run())
	}

	/// Flips the session to signed out and wipes local credentials.
	///
	/// Returns `None` when another teardown already won the race.
	pub(crate) fn begin_sign_out(&self, origin: NoticeOrigin) -> Option<SignOutNotice> {
		if self
			.signed_out
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return None;
		}

		self.tokens.clear();
		self.identity.clear();

		Some(SignOutNotice::new(origin, self.login_url(), self.config.notice_countdown))
	}

	/// Publishes the notice locally and navigates once it settles.
	pub(crate) fn finish_sign_out(self: &Arc<Self>, notice: SignOutNotice) {
		self.emit(SessionEvent::SignedOut(notice.clone()));

		match Handle::try_current() {
			Ok(handle) => {
				let session = Arc::clone(self);

				handle.spawn(async move {
					notice.settled().await;
					session.navigate(notice.redirect_to);
				});
			},
			Err(_) => {
				obs_debug!("No async runtime available; redirecting without a countdown.");

				self.navigate(notice.redirect_to);
			},
		}
	}

	pub(crate) fn emit(&self, event: SessionEvent) {
		// Having no UI subscribers is not an error.
		let _ = self.events.send(event);
	}

	/// Whether the navigator already shows the login page.
	pub(crate) fn on_login_page(&self) -> bool {
		self.navigator.current().is_some_and(|current| self.redirect.is_login_page(&current))
	}

	fn navigate(&self, url: Url) {
		if !self.is_signed_out() {
			obs_debug!("Session was re-established during the countdown; staying put.");

			return;
		}
		if self.on_login_page() {
			self.redirected.send_replace(Some(url));

			return;
		}

		match self.navigator.replace(url.clone()) {
			Ok(()) => {
				self.redirected.send_replace(Some(url));
			},
			Err(e) => obs_warn!("Redirect to the login page failed: {e}"),
		}
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("tab", &self.tab)
			.field("state", &self.state())
			.field("bus", &self.bus.mechanism())
			.field("token_present", &self.tokens.is_present())
			.finish()
	}
}

/// Builder for [`Session`] values.
pub struct SessionBuilder {
	config: GatewayConfig,
	tab: Option<TabId>,
	hub: Option<ChannelHub>,
	storage: Option<Arc<dyn SharedStorage>>,
	navigator: Option<Arc<dyn Navigator>>,
	token: Option<AccessToken>,
	identity: Option<Identity>,
}
impl SessionBuilder {
	/// Creates a builder for `config`.
	pub fn new(config: GatewayConfig) -> Self {
		Self {
			config,
			tab: None,
			hub: None,
			storage: None,
			navigator: None,
			token: None,
			identity: None,
		}
	}

	/// Uses an explicit tab identifier instead of a random one.
	pub fn tab(mut self, tab: TabId) -> Self {
		self.tab = Some(tab);

		self
	}

	/// Makes the shared channel primitive available; without it the storage fallback is used.
	pub fn channel_hub(mut self, hub: ChannelHub) -> Self {
		self.hub = Some(hub);

		self
	}

	/// Sets the shared storage used by the fallback (defaults to a private in-memory storage).
	pub fn storage(mut self, storage: Arc<dyn SharedStorage>) -> Self {
		self.storage = Some(storage);

		self
	}

	/// Sets the navigator (defaults to a [`MemoryHistory`] starting at the app origin).
	pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
		self.navigator = Some(navigator);

		self
	}

	/// Seeds the token store, e.g. with a token restored at startup.
	pub fn token(mut self, token: AccessToken) -> Self {
		self.token = Some(token);

		self
	}

	/// Seeds the identity cache.
	pub fn identity(mut self, identity: Identity) -> Self {
		self.identity = Some(identity);

		self
	}

	/// Validates the redirect configuration and builds the session.
	pub fn build(self) -> Result<Arc<Session>> {
		let redirect = RedirectResolver::new(&self.config)?;
		let storage = self.storage.unwrap_or_else(|| Arc::new(MemoryStorage::default()));
		let bus = InvalidationBus::detect(self.hub.as_ref(), storage, &self.config);
		let navigator = self
			.navigator
			.unwrap_or_else(|| Arc::new(MemoryHistory::new(self.config.app_origin.clone())));
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		let (redirected, _) = watch::channel(None);
		let tokens = TokenStore::default();
		let identity = IdentityCache::default();

		if let Some(token) = self.token {
			tokens.set(token);
		}
		if let Some(seed) = self.identity {
			identity.set(seed);
		}

		let session = Session {
			tab: self.tab.unwrap_or_else(TabId::random),
			config: Arc::new(self.config),
			tokens,
			identity,
			metrics: Default::default(),
			bus,
			pending: Default::default(),
			redirect,
			navigator,
			signed_out: AtomicBool::new(false),
			events,
			redirected,
		};

		obs_debug!("Session {} uses the {} invalidation bus.", session.tab, session.bus.mechanism());

		Ok(Arc::new(session))
	}
}
impl Debug for SessionBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBuilder")
			.field("tab", &self.tab)
			.field("channel_hub", &self.hub.is_some())
			.field("storage_set", &self.storage.is_some())
			.finish()
	}
}
