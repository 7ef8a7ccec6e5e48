//! Gateway-level error types shared across the transport, session, and storage layers.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Shared storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StorageError,
	),
	/// Navigation collaborator rejected a redirect.
	#[error(transparent)]
	Navigation(#[from] crate::redirect::NavigationError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Session renewal failed; the session has been torn down.
	#[error(transparent)]
	Refresh(#[from] RefreshFailed),
}

/// Configuration and validation failures raised by the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A required setting was not supplied.
	#[error("Missing required setting `{0}`.")]
	MissingField(&'static str),
	/// A URL setting cannot be parsed or joined.
	#[error("Setting `{field}` is not a valid URL.")]
	InvalidUrl {
		/// Setting that failed validation.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A URL setting has no usable origin (e.g. `data:` or `file:` URLs).
	#[error("Setting `{field}` must be an http(s) URL: {url}.")]
	OpaqueOrigin {
		/// Setting that failed validation.
		field: &'static str,
		/// Offending URL.
		url: String,
	},
	/// Login origin and its fallback both point back at the application.
	#[error("Login destination {url} resolves to the application origin and no usable fallback is configured.")]
	LoginLoop {
		/// Login URL that would loop.
		url: String,
	},
	/// The storage poll interval must be positive.
	#[error("The storage poll interval must be positive.")]
	NonPositivePollInterval,
	/// A header value (typically the bearer token) contains invalid bytes.
	#[error("Header `{name}` contains characters that cannot be sent.")]
	InvalidHeader {
		/// Header name.
		name: &'static str,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Body(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// Target URL of the failed call.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: &Url, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { url: url.to_string(), source: Box::new(src) }
	}
}

/// Uniform renewal failure observed by every request waiting on the same renewal.
///
/// The [`kind`](RefreshFailed::kind) is kept for diagnostics only; callers treat every failure
/// the same way and tear the session down.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Session renewal failed: {kind}.")]
pub struct RefreshFailed {
	/// Sub-cause of the failure.
	pub kind: RefreshFailureKind,
}
impl RefreshFailed {
	pub(crate) fn new(kind: RefreshFailureKind) -> Self {
		Self { kind }
	}
}

/// Diagnostic sub-cause carried by [`RefreshFailed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshFailureKind {
	/// The renewal endpoint could not be reached.
	Network(String),
	/// The renewal endpoint answered with a non-success status.
	Status(u16),
	/// The renewal response body was not valid JSON of the expected shape.
	Malformed(String),
	/// The renewal response had no usable `token` field.
	MissingToken,
	/// The renewal request could not be built.
	Request(String),
	/// The task driving the renewal was dropped before it settled; waiters retry.
	Abandoned,
}
impl Display for RefreshFailureKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Network(message) => write!(f, "network error ({message})"),
			Self::Status(status) => write!(f, "HTTP {status}"),
			Self::Malformed(message) => write!(f, "malformed response ({message})"),
			Self::MissingToken => f.write_str("response is missing the token field"),
			Self::Request(message) => write!(f, "request could not be built ({message})"),
			Self::Abandoned => f.write_str("renewal was abandoned"),
		}
	}
}
