//! Authenticated request gateway: bearer attachment, 401 recovery, and retry-once semantics.
//!
//! [`SessionGateway::send_with`] is the single entry point every protected call goes through.
//! A `401 Unauthorized` is read as "session expired": the first one seen by a logical request
//! joins (or starts) the tab's single in-flight renewal, and the request is replayed exactly once
//! with the fresh token. When renewal fails the session is torn down and every waiting request
//! gets its original 401 back. Other statuses, `403` included, pass through untouched.

mod metrics;
mod refresh;
mod teardown;

pub use metrics::*;

pub(crate) use refresh::RefreshSlot;

// crates.io
use http::Method;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	http::{ApiRequest, ApiResponse, Transport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, obs_debug, obs_warn},
	session::Session,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Gateway backed by the bundled reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestGateway = SessionGateway<ReqwestTransport>;

/// Per-request retry marker.
///
/// The flag flips from `false` to `true` at most once; a 401 on an attempt that already retried
/// is returned to the caller without another renewal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestAttempt {
	retried: bool,
}
impl RequestAttempt {
	/// Creates a fresh attempt context.
	pub const fn new() -> Self {
		Self { retried: false }
	}

	/// Whether the request has already been replayed after a renewal.
	pub const fn retried(&self) -> bool {
		self.retried
	}

	/// Marks the attempt as retried; returns `false` when it already was.
	pub fn mark_retried(&mut self) -> bool {
		!std::mem::replace(&mut self.retried, true)
	}
}

/// Authenticated HTTP gateway shared by every call site of one tab.
///
/// Clones share the transport and the [`Session`], so the token store and the pending-renewal
/// slot stay per-tab singletons.
pub struct SessionGateway<T>
where
	T: ?Sized + Transport,
{
	/// HTTP transport used for API, renewal, and revoke calls.
	pub transport: Arc<T>,
	/// Tab-local session state.
	pub session: Arc<Session>,
}
impl<T> SessionGateway<T>
where
	T: ?Sized + Transport,
{
	/// Wraps `transport` around `session`.
	pub fn new(transport: Arc<T>, session: Arc<Session>) -> Self {
		Self { transport, session }
	}

	/// Builds a request for `path` relative to the configured API base.
	pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest> {
		Ok(ApiRequest::new(method, self.session.config.endpoint(path)?))
	}

	/// Whether a renewal is currently in flight for this tab.
	pub fn is_refreshing(&self) -> bool {
		self.session.is_refreshing()
	}

	/// Sends `request` as a fresh logical request.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		let mut attempt = RequestAttempt::new();

		self.send_with(request, &mut attempt).await
	}

	/// Sends `request`, threading an explicit retry marker.
	///
	/// Transport errors propagate unchanged; they are never read as session expiry.
	pub async fn send_with(
		&self,
		request: ApiRequest,
		attempt: &mut RequestAttempt,
	) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Send;

		let span = FlowSpan::new(KIND, "send_with");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let sent_with = self.session.tokens.get();
				let response = self.dispatch(request.clone(), sent_with.as_ref()).await?;

				if !response.is_unauthorized() {
					return Ok(response);
				}
				if !attempt.mark_retried() {
					obs_debug!("Replayed request was rejected again; returning the 401.");

					return Ok(response);
				}

				match self.acquire_after(sent_with.as_ref()).await {
					Ok(token) => {
						self.session.metrics.record_retry();

						self.dispatch(request, Some(&token)).await
					},
					Err(e) => {
						obs_warn!("{e} Returning the original 401.");

						// The renewal leader already tore the session down; this is a no-op then.
						self.invalidate();

						Ok(response)
					},
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn dispatch(
		&self,
		request: ApiRequest,
		token: Option<&AccessToken>,
	) -> Result<ApiResponse> {
		let request = match token {
			Some(token) => request.authorize(token)?,
			None => request,
		};

		Ok(self.transport.send(request).await?)
	}
}
#[cfg(feature = "reqwest")]
impl SessionGateway<ReqwestTransport> {
	/// Builds a gateway around a cookie-aware reqwest transport using the session's timeout.
	pub fn with_reqwest(session: Arc<Session>) -> Result<Self> {
		let transport = ReqwestTransport::new(session.config.request_timeout)?;

		Ok(Self::new(Arc::new(transport), session))
	}
}
impl<T> Clone for SessionGateway<T>
where
	T: ?Sized + Transport,
{
	fn clone(&self) -> Self {
		Self { transport: Arc::clone(&self.transport), session: Arc::clone(&self.session) }
	}
}
impl<T> Debug for SessionGateway<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionGateway").field("session", &self.session).finish()
	}
}
