//! Validated gateway configuration and its builder.
//!
//! The API base URL and the canonical login origin are supplied by the environment; everything
//! else has a default. [`GatewayConfig::from_env`] reads the `SESSION_GATEWAY_*` variables for
//! deployments that configure the gateway through the process environment.

// std
use std::env;
// self
use crate::{_prelude::*, error::ConfigError};

/// Environment variable holding the API base URL.
pub const ENV_API_BASE: &str = "SESSION_GATEWAY_API_BASE";
/// Environment variable holding the application's own origin.
pub const ENV_APP_ORIGIN: &str = "SESSION_GATEWAY_APP_ORIGIN";
/// Environment variable holding the canonical login origin.
pub const ENV_LOGIN_ORIGIN: &str = "SESSION_GATEWAY_LOGIN_ORIGIN";
/// Environment variable holding the fallback login origin.
pub const ENV_LOGIN_FALLBACK_ORIGIN: &str = "SESSION_GATEWAY_LOGIN_FALLBACK_ORIGIN";
/// Environment variable holding the renewal context marker.
pub const ENV_CONTEXT: &str = "SESSION_GATEWAY_CONTEXT";

/// Immutable configuration shared by every component of one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
	/// Base URL that relative API paths are joined onto.
	pub api_base: Url,
	/// Origin the application itself is served from.
	pub app_origin: Url,
	/// Canonical authentication entry point origin.
	pub login_origin: Url,
	/// Origin used when `login_origin` turns out to be the application's own origin.
	pub fallback_login_origin: Option<Url>,
	/// Path of the login page on the login origin.
	pub login_path: String,
	/// Path of the renewal endpoint relative to `api_base`.
	pub renew_path: String,
	/// Path of the revoke endpoint relative to `api_base`.
	pub revoke_path: String,
	/// Name of the shared cross-tab channel.
	pub channel_name: String,
	/// Shared storage key used by the fallback invalidation marker.
	pub storage_key: String,
	/// Optional device/context marker sent with renewal calls.
	pub context_marker: Option<String>,
	/// How long the sign-out notice stays up before navigation.
	pub notice_countdown: Duration,
	/// Interval between polls of storages without change notifications.
	pub storage_poll_interval: Duration,
	/// Per-request timeout applied by the bundled reqwest transport.
	pub request_timeout: Duration,
}
impl GatewayConfig {
	/// Creates a new builder.
	pub fn builder() -> GatewayConfigBuilder {
		GatewayConfigBuilder::new()
	}

	/// Builds a configuration from the `SESSION_GATEWAY_*` environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Builds a configuration from an arbitrary variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let parse = |name: &'static str| -> Result<Option<Url>, ConfigError> {
			lookup(name)
				.filter(|value| !value.trim().is_empty())
				.map(|value| {
					Url::parse(value.trim())
						.map_err(|source| ConfigError::InvalidUrl { field: name, source })
				})
				.transpose()
		};
		let mut builder = Self::builder();

		if let Some(url) = parse(ENV_API_BASE)? {
			builder = builder.api_base(url);
		}
		if let Some(url) = parse(ENV_APP_ORIGIN)? {
			builder = builder.app_origin(url);
		}
		if let Some(url) = parse(ENV_LOGIN_ORIGIN)? {
			builder = builder.login_origin(url);
		}
		if let Some(url) = parse(ENV_LOGIN_FALLBACK_ORIGIN)? {
			builder = builder.fallback_login_origin(url);
		}
		if let Some(marker) = lookup(ENV_CONTEXT).filter(|value| !value.is_empty()) {
			builder = builder.context_marker(marker);
		}

		builder.build()
	}

	/// Joins `path` onto the API base URL.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		self.api_base
			.join(path.trim_start_matches('/'))
			.map_err(|source| ConfigError::InvalidUrl { field: "path", source })
	}

	/// Absolute URL of the renewal endpoint.
	pub fn renew_url(&self) -> Result<Url, ConfigError> {
		self.endpoint(&self.renew_path)
	}

	/// Absolute URL of the revoke endpoint.
	pub fn revoke_url(&self) -> Result<Url, ConfigError> {
		self.endpoint(&self.revoke_path)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		validate_http("api_base", &self.api_base)?;
		validate_http("app_origin", &self.app_origin)?;
		validate_http("login_origin", &self.login_origin)?;

		if let Some(fallback) = self.fallback_login_origin.as_ref() {
			validate_http("fallback_login_origin", fallback)?;
		}
		if !self.storage_poll_interval.is_positive() {
			return Err(ConfigError::NonPositivePollInterval);
		}

		self.renew_url()?;
		self.revoke_url()?;

		Ok(())
	}
}

/// Builder for [`GatewayConfig`] values.
#[derive(Debug)]
pub struct GatewayConfigBuilder {
	/// API base URL (required).
	pub api_base: Option<Url>,
	/// Application origin (required).
	pub app_origin: Option<Url>,
	/// Login origin (required).
	pub login_origin: Option<Url>,
	/// Optional fallback login origin.
	pub fallback_login_origin: Option<Url>,
	/// Login page path.
	pub login_path: String,
	/// Renewal endpoint path.
	pub renew_path: String,
	/// Revoke endpoint path.
	pub revoke_path: String,
	/// Cross-tab channel name.
	pub channel_name: String,
	/// Fallback storage key.
	pub storage_key: String,
	/// Optional renewal context marker.
	pub context_marker: Option<String>,
	/// Sign-out notice countdown.
	pub notice_countdown: Duration,
	/// Storage poll interval.
	pub storage_poll_interval: Duration,
	/// Transport request timeout.
	pub request_timeout: Duration,
}
impl GatewayConfigBuilder {
	const DEFAULT_CHANNEL: &'static str = "auth";
	const DEFAULT_LOGIN_PATH: &'static str = "/login";
	const DEFAULT_NOTICE_COUNTDOWN: Duration = Duration::seconds(3);
	const DEFAULT_POLL_INTERVAL: Duration = Duration::seconds(1);
	const DEFAULT_RENEW_PATH: &'static str = "/auth/refresh";
	const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(30);
	const DEFAULT_REVOKE_PATH: &'static str = "/auth/logout";
	const DEFAULT_STORAGE_KEY: &'static str = "auth:logout";

	/// Creates a builder seeded with defaults for every optional setting.
	pub fn new() -> Self {
		Self {
			api_base: None,
			app_origin: None,
			login_origin: None,
			fallback_login_origin: None,
			login_path: Self::DEFAULT_LOGIN_PATH.into(),
			renew_path: Self::DEFAULT_RENEW_PATH.into(),
			revoke_path: Self::DEFAULT_REVOKE_PATH.into(),
			channel_name: Self::DEFAULT_CHANNEL.into(),
			storage_key: Self::DEFAULT_STORAGE_KEY.into(),
			context_marker: None,
			notice_countdown: Self::DEFAULT_NOTICE_COUNTDOWN,
			storage_poll_interval: Self::DEFAULT_POLL_INTERVAL,
			request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
		}
	}

	/// Sets the API base URL.
	pub fn api_base(mut self, url: Url) -> Self {
		self.api_base = Some(url);

		self
	}

	/// Sets the application's own origin.
	pub fn app_origin(mut self, url: Url) -> Self {
		self.app_origin = Some(url);

		self
	}

	/// Sets the canonical login origin.
	pub fn login_origin(mut self, url: Url) -> Self {
		self.login_origin = Some(url);

		self
	}

	/// Sets the origin used when the login origin loops back to the application.
	pub fn fallback_login_origin(mut self, url: Url) -> Self {
		self.fallback_login_origin = Some(url);

		self
	}

	/// Overrides the login page path (defaults to `/login`).
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Overrides the renewal endpoint path (defaults to `/auth/refresh`).
	pub fn renew_path(mut self, path: impl Into<String>) -> Self {
		self.renew_path = path.into();

		self
	}

	/// Overrides the revoke endpoint path (defaults to `/auth/logout`).
	pub fn revoke_path(mut self, path: impl Into<String>) -> Self {
		self.revoke_path = path.into();

		self
	}

	/// Overrides the cross-tab channel name (defaults to `auth`).
	pub fn channel_name(mut self, name: impl Into<String>) -> Self {
		self.channel_name = name.into();

		self
	}

	/// Overrides the fallback storage key (defaults to `auth:logout`).
	pub fn storage_key(mut self, key: impl Into<String>) -> Self {
		self.storage_key = key.into();

		self
	}

	/// Sets the device/context marker sent with renewal calls.
	pub fn context_marker(mut self, marker: impl Into<String>) -> Self {
		self.context_marker = Some(marker.into());

		self
	}

	/// Overrides the sign-out notice countdown (defaults to 3 seconds, negative clamps to zero).
	pub fn notice_countdown(mut self, countdown: Duration) -> Self {
		self.notice_countdown = if countdown.is_negative() { Duration::ZERO } else { countdown };

		self
	}

	/// Overrides the storage poll interval (defaults to 1 second).
	pub fn storage_poll_interval(mut self, interval: Duration) -> Self {
		self.storage_poll_interval = interval;

		self
	}

	/// Overrides the transport request timeout (defaults to 30 seconds).
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<GatewayConfig, ConfigError> {
		let mut api_base = self.api_base.ok_or(ConfigError::MissingField("api_base"))?;

		// Relative joins would otherwise replace the last path segment.
		if !api_base.path().ends_with('/') {
			let path = format!("{}/", api_base.path());

			api_base.set_path(&path);
		}

		let config = GatewayConfig {
			api_base,
			app_origin: self.app_origin.ok_or(ConfigError::MissingField("app_origin"))?,
			login_origin: self.login_origin.ok_or(ConfigError::MissingField("login_origin"))?,
			fallback_login_origin: self.fallback_login_origin,
			login_path: self.login_path,
			renew_path: self.renew_path,
			revoke_path: self.revoke_path,
			channel_name: self.channel_name,
			storage_key: self.storage_key,
			context_marker: self.context_marker,
			notice_countdown: self.notice_countdown,
			storage_poll_interval: self.storage_poll_interval,
			request_timeout: self.request_timeout,
		};

		config.validate()?;

		Ok(config)
	}
}
impl Default for GatewayConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn validate_http(field: &'static str, url: &Url) -> Result<(), ConfigError> {
	match url.scheme() {
		"http" | "https" if url.origin().is_tuple() => Ok(()),
		_ => Err(ConfigError::OpaqueOrigin { field, url: url.to_string() }),
	}
}
