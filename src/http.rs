//! Transport primitives for gateway calls.
//!
//! [`Transport`] is the gateway's only dependency on an HTTP stack. The gateway hands it fully
//! prepared [`ApiRequest`] values (bearer header already attached) and inspects the returned
//! [`ApiResponse`] status. Timeouts belong here, not in the renewal coordinator: a renewal that
//! never resolves suspends its waiters until the transport gives up.

// crates.io
use http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
	header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::{ConfigError, TransportError},
};

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks able to execute gateway requests.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can be shared by the
/// gateway and the detached revoke task, and their futures must be `Send`.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Executes the request and returns the raw response.
	///
	/// Non-success statuses are responses, not errors; only failures to obtain a response at
	/// all (DNS, TCP, TLS, timeouts) map to [`TransportError`].
	fn send(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// HTTP-shaped request descriptor passed through the gateway.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Request headers.
	pub headers: HeaderMap,
	/// Raw request body.
	pub body: Vec<u8>,
}
impl ApiRequest {
	/// Creates a request with no headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::POST, url)
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Serializes `body` as JSON and sets the content type.
	pub fn with_json<T>(mut self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		self.body = serde_json::to_vec(body)?;
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(self)
	}

	/// Returns the bearer token currently attached, if any.
	pub fn bearer(&self) -> Option<&str> {
		self.headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
	}

	/// Attaches `token` as the bearer credential, replacing any previous one.
	pub(crate) fn authorize(mut self, token: &AccessToken) -> Result<Self, ConfigError> {
		let mut value = HeaderValue::from_str(&token.bearer())
			.map_err(|_| ConfigError::InvalidHeader { name: "authorization" })?;

		value.set_sensitive(true);
		self.headers.insert(AUTHORIZATION, value);

		Ok(self)
	}
}

/// Status, headers, and body returned by a [`Transport`].
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response with the provided status and an empty body.
	pub fn new(status: StatusCode) -> Self {
		Self { status, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Creates a response carrying a JSON body.
	pub fn json_body(status: StatusCode, body: &serde_json::Value) -> Self {
		let mut response = Self::new(status);

		response.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		response.body = body.to_string().into_bytes();

		response
	}

	/// Whether the status is in the 2xx range.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Whether the status signals an expired or missing session (401).
	///
	/// Permission denials (403) are deliberately not included.
	pub fn is_unauthorized(&self) -> bool {
		self.status == StatusCode::UNAUTHORIZED
	}

	/// Decodes the body as JSON, reporting the path of the first offending field.
	pub fn json<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// The client keeps a cookie store so the server-held refresh credential rides along with
/// renewal and revoke calls, and it never follows redirects: a redirect to an HTML login page
/// must surface as a status, not be silently swallowed.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a cookie-aware, non-redirecting client with the provided request timeout.
	pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.cookie_store(true)
			.redirect(reqwest::redirect::Policy::none())
			.timeout(timeout.unsigned_abs())
			.build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let ApiRequest { method, url, headers, body } = request;
			let response = self
				.0
				.request(method, url.clone())
				.headers(headers)
				.body(body)
				.send()
				.await
				.map_err(|e| TransportError::network(&url, e))?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body =
				response.bytes().await.map_err(|e| TransportError::network(&url, e))?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}
