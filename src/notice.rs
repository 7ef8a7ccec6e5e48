//! Same-tab session events and the dismissible sign-out notice.

// crates.io
use tokio::sync::Notify;
// self
use crate::_prelude::*;

/// Local (same-tab) notification emitted by a session.
#[derive(Clone, Debug)]
pub enum SessionEvent {
	/// A renewal stored a fresh access token.
	Renewed,
	/// The session was torn down; the UI should show the notice.
	SignedOut(SignOutNotice),
}

/// Where a teardown originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoticeOrigin {
	/// This tab's own renewal failed.
	Local,
	/// Another tab broadcast an invalidation.
	CrossTab,
}

/// Auto-dismissing "signed out, redirecting" notice.
///
/// Navigation happens once [`settled`](SignOutNotice::settled) resolves: when the countdown
/// elapses or as soon as the user calls [`confirm`](SignOutNotice::confirm). Clones share the
/// same confirmation state.
#[derive(Clone, Debug)]
pub struct SignOutNotice {
	/// Where the teardown came from.
	pub origin: NoticeOrigin,
	/// Login destination the tab will navigate to.
	pub redirect_to: Url,
	/// Time before automatic navigation.
	pub countdown: Duration,
	confirmed: Arc<Notify>,
}
impl SignOutNotice {
	/// Creates a notice with its own confirmation state.
	pub fn new(origin: NoticeOrigin, redirect_to: Url, countdown: Duration) -> Self {
		Self { origin, redirect_to, countdown, confirmed: Default::default() }
	}

	/// Skips the rest of the countdown.
	pub fn confirm(&self) {
		// `notify_one` stores a permit, so confirming before anyone awaits still counts.
		self.confirmed.notify_one();
	}

	/// Resolves when the countdown elapses or the notice is confirmed.
	pub async fn settled(&self) {
		if self.countdown.is_zero() {
			return;
		}

		tokio::select! {
			_ = tokio::time::sleep(self.countdown.unsigned_abs()) => {},
			_ = self.confirmed.notified() => {},
		}
	}

	/// User-facing message for the notice.
	pub fn message(&self) -> String {
		let seconds = self.countdown.whole_seconds().max(0);

		match self.origin {
			NoticeOrigin::Local =>
				format!("Your session has ended. Redirecting to sign in in {seconds}s."),
			NoticeOrigin::CrossTab => format!(
				"You were signed out in another window. Redirecting to sign in in {seconds}s."
			),
		}
	}
}
