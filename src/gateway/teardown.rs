// crates.io
use tokio::runtime::Handle;
// self
use crate::{
	_prelude::*,
	gateway::SessionGateway,
	http::{ApiRequest, Transport},
	notice::{NoticeOrigin, SignOutNotice},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, obs_debug, obs_info, obs_warn},
};

impl<T> SessionGateway<T>
where
	T: ?Sized + Transport,
{
	/// Tears the session down and tells every other tab.
	///
	/// Idempotent: only the first call after a login clears state, revokes, broadcasts, and
	/// schedules the redirect; later calls return `None` immediately. Never blocks on the revoke
	/// call or the redirect.
	pub fn invalidate(&self) -> Option<SignOutNotice> {
		const KIND: FlowKind = FlowKind::Teardown;

		let _guard = FlowSpan::new(KIND, "invalidate").entered();
		let notice = self.session.begin_sign_out(NoticeOrigin::Local)?;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.session.metrics.record_teardown();
		obs_info!("Session torn down; notifying other tabs.");

		self.spawn_revoke();

		match self.session.bus.publish(&self.session.tab) {
			Ok(()) => {
				self.session.metrics.record_broadcast();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(e) => {
				obs_warn!("Failed to broadcast the logout: {e}");
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		self.session.finish_sign_out(notice.clone());

		Some(notice)
	}

	fn spawn_revoke(&self) {
		let url = match self.session.config.revoke_url() {
			Ok(url) => url,
			Err(e) => {
				obs_warn!("Skipping the revoke call: {e}");

				return;
			},
		};
		let Ok(handle) = Handle::try_current() else {
			obs_warn!("No async runtime available; skipping the revoke call.");

			return;
		};
		let transport = Arc::clone(&self.transport);

		handle.spawn(async move {
			match transport.send(ApiRequest::post(url)).await {
				Ok(response) if response.is_success() => obs_debug!("Server-side session revoked."),
				Ok(response) => obs_warn!("Revoke call answered HTTP {}.", response.status),
				Err(e) => obs_warn!("Revoke call failed: {e}"),
			}
		});
	}
}
