// self
use crate::{
	_prelude::*,
	bus::{BusSubscription, InvalidationKind, SessionInvalidationEvent},
	notice::{NoticeOrigin, SignOutNotice},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, obs_debug, obs_info},
	session::Session,
};

/// What a tab did with one cross-tab invalidation.
#[derive(Clone, Debug)]
pub enum ListenOutcome {
	/// Local state was cleared and a redirect scheduled.
	SignedOut(SignOutNotice),
	/// The session was already torn down (including by this tab's own broadcast).
	AlreadySignedOut,
	/// The tab already shows the login page; nothing was done.
	OnLoginPage,
}

/// Reacts to invalidations broadcast by other tabs.
///
/// The listener never calls the API: it only clears local state, shows the notice, and
/// navigates. Handling is idempotent, so repeated events are harmless.
#[derive(Debug)]
pub struct CrossTabListener {
	session: Arc<Session>,
	subscription: BusSubscription,
}
impl CrossTabListener {
	/// Subscribes to `session`'s bus.
	pub fn new(session: Arc<Session>) -> Self {
		let subscription = session.bus.subscribe();

		Self { session, subscription }
	}

	/// Applies one event to the local session.
	pub fn handle(&self, event: SessionInvalidationEvent) -> ListenOutcome {
		let _guard = FlowSpan::new(FlowKind::Listen, "handle").entered();
		let SessionInvalidationEvent { kind: InvalidationKind::Logout } = event;

		if self.session.on_login_page() {
			obs_debug!("Ignoring logout broadcast while on the login page.");

			return ListenOutcome::OnLoginPage;
		}

		obs::record_flow_outcome(FlowKind::Listen, FlowOutcome::Attempt);

		match self.session.begin_sign_out(NoticeOrigin::CrossTab) {
			Some(notice) => {
				obs_info!("Signed out by another tab; redirecting to {}.", notice.redirect_to);
				obs::record_flow_outcome(FlowKind::Listen, FlowOutcome::Success);

				self.session.finish_sign_out(notice.clone());

				ListenOutcome::SignedOut(notice)
			},
			None => ListenOutcome::AlreadySignedOut,
		}
	}

	/// Waits for the next event and handles it; `None` once the bus is closed.
	pub async fn next(&mut self) -> Option<ListenOutcome> {
		let event = self.subscription.recv().await?;

		Some(self.handle(event))
	}

	/// Handles events until the bus is closed.
	pub async fn run(mut self) {
		while self.next().await.is_some() {}
	}
}
