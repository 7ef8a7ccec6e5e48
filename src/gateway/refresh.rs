//! Single-flight token renewal.
//!
//! A tab holds at most one [`PendingRefresh`]. The first request that needs a renewal becomes
//! the leader and issues the renewal call; every request that arrives while it is in flight
//! waits on the same cell. The leader stores the outcome (token saved, or store cleared and the
//! session torn down) and empties the slot before publishing it, so no waiter can observe a
//! half-finished state or a slot that still points at a settled renewal. A later 401 always
//! finds an empty slot and starts a new renewal, whether the previous one succeeded or failed.

// crates.io
use http::HeaderValue;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::{RefreshFailed, RefreshFailureKind},
	gateway::SessionGateway,
	http::{ApiRequest, Transport},
	notice::SessionEvent,
	obs::{self, FlowKind, FlowOutcome, FlowSpan, obs_debug, obs_info, obs_warn},
};

type RefreshOutcome = Result<AccessToken, RefreshFailed>;

#[derive(Debug, Default)]
pub(crate) struct PendingRefresh(AsyncOnceCell<RefreshOutcome>);
impl PendingRefresh {
	async fn wait(&self) -> RefreshOutcome {
		self.0.wait().await.clone()
	}
}

/// Slot holding the tab's in-flight renewal, if any.
#[derive(Debug, Default)]
pub(crate) struct RefreshSlot(Mutex<Option<Arc<PendingRefresh>>>);
impl RefreshSlot {
	pub(crate) fn is_pending(&self) -> bool {
		self.0.lock().is_some()
	}

	fn join_or_lead(&self) -> Flight<'_> {
		let mut slot = self.0.lock();

		if let Some(pending) = slot.as_ref() {
			return Flight::Join(Arc::clone(pending));
		}

		let pending = Arc::new(PendingRefresh::default());

		*slot = Some(Arc::clone(&pending));

		Flight::Lead(LeaderGuard { slot: self, pending, settled: false })
	}

	fn release(&self, pending: &Arc<PendingRefresh>) {
		let mut slot = self.0.lock();

		if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, pending)) {
			*slot = None;
		}
	}
}

enum Flight<'a> {
	Join(Arc<PendingRefresh>),
	Lead(LeaderGuard<'a>),
}

/// Ownership of the pending renewal; publishes `Abandoned` if dropped before settling.
struct LeaderGuard<'a> {
	slot: &'a RefreshSlot,
	pending: Arc<PendingRefresh>,
	settled: bool,
}
impl LeaderGuard<'_> {
	async fn settle(mut self, outcome: RefreshOutcome) {
		self.slot.release(&self.pending);

		// Only the leader ever sets the cell, so this cannot lose a race.
		let _ = self.pending.0.set(outcome).await;

		self.settled = true;
	}
}
impl Drop for LeaderGuard<'_> {
	fn drop(&mut self) {
		if self.settled {
			return;
		}

		self.slot.release(&self.pending);

		let _ = self.pending.0.set_blocking(Err(RefreshFailed::new(RefreshFailureKind::Abandoned)));
	}
}

#[derive(Debug, Serialize)]
struct RenewRequest<'a> {
	context: &'a str,
}

#[derive(Debug, Deserialize)]
struct RenewResponse {
	#[serde(default)]
	token: Option<String>,
}

impl<T> SessionGateway<T>
where
	T: ?Sized + Transport,
{
	/// Returns a fresh access token, joining the in-flight renewal or starting one.
	pub async fn acquire(&self) -> Result<AccessToken, RefreshFailed> {
		let current = self.session.tokens.get();

		self.acquire_after(current.as_ref()).await
	}

	/// Like [`acquire`](Self::acquire), but returns the stored token right away when it already
	/// differs from `stale`, the token the failed request was sent with.
	///
	/// A renewal whose leader was dropped before settling has no outcome; its waiters race for
	/// the slot again and one of them re-issues the call.
	pub(crate) async fn acquire_after(
		&self,
		stale: Option<&AccessToken>,
	) -> Result<AccessToken, RefreshFailed> {
		loop {
			if let Some(token) = self.renewed_elsewhere(stale) {
				return Ok(token);
			}

			let outcome = match self.session.pending.join_or_lead() {
				Flight::Join(pending) => {
					self.session.metrics.record_renewal_join();
					obs_debug!("Joining the in-flight renewal.");

					pending.wait().await
				},
				Flight::Lead(leader) => {
					// A renewal may have settled between the check above and taking the slot.
					let outcome = match self.renewed_elsewhere(stale) {
						Some(token) => Ok(token),
						None => self.lead_renewal().await,
					};

					leader.settle(outcome.clone()).await;

					outcome
				},
			};

			match outcome {
				Err(RefreshFailed { kind: RefreshFailureKind::Abandoned }) => {
					obs_debug!("Previous renewal was abandoned; retrying.");
				},
				outcome => return outcome,
			}
		}
	}

	fn renewed_elsewhere(&self, stale: Option<&AccessToken>) -> Option<AccessToken> {
		self.session.tokens.get().filter(|current| stale != Some(current))
	}

	async fn lead_renewal(&self) -> RefreshOutcome {
		const KIND: FlowKind = FlowKind::Renew;

		let span = FlowSpan::new(KIND, "lead_renewal");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.session.metrics.record_renewal_attempt();

		let outcome = span.instrument(self.renew()).await;

		match &outcome {
			Ok(token) => {
				self.session.tokens.set(token.clone());
				self.session.metrics.record_renewal_success();
				self.session.emit(SessionEvent::Renewed);
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				obs_info!("Access token renewed.");
			},
			Err(e) => {
				self.session.tokens.clear();
				self.session.metrics.record_renewal_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				obs_warn!("{e}");

				// Tear down before waiters are released so they all observe the signed-out state.
				self.invalidate();
			},
		}

		outcome
	}

	async fn renew(&self) -> RefreshOutcome {
		let url = self
			.session
			.config
			.renew_url()
			.map_err(|e| RefreshFailed::new(RefreshFailureKind::Request(e.to_string())))?;
		let mut request = ApiRequest::post(url);

		if let Some(context) = self.session.config.context_marker.as_deref() {
			request = request
				.with_json(&RenewRequest { context })
				.map_err(|e| RefreshFailed::new(RefreshFailureKind::Request(e.to_string())))?;
		}

		let response = self
			.transport
			.send(request)
			.await
			.map_err(|e| RefreshFailed::new(RefreshFailureKind::Network(e.to_string())))?;

		if !response.is_success() {
			return Err(RefreshFailed::new(RefreshFailureKind::Status(response.status.as_u16())));
		}

		let payload = response
			.json::<RenewResponse>()
			.map_err(|e| RefreshFailed::new(RefreshFailureKind::Malformed(e.to_string())))?;

		let token = payload
			.token
			.filter(|token| !token.is_empty())
			.map(AccessToken::new)
			.ok_or_else(|| RefreshFailed::new(RefreshFailureKind::MissingToken))?;

		// A token that cannot travel in a header would wedge every later request.
		HeaderValue::from_str(&token.bearer()).map_err(|_| {
			RefreshFailed::new(RefreshFailureKind::Malformed(
				"token contains characters that cannot be sent".into(),
			))
		})?;

		Ok(token)
	}
}
