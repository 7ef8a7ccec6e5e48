//! Fixtures shared by the integration tests: a scripted in-process transport and tab builders.

#![allow(dead_code)]

// std
use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration};
// crates.io
use http::{Method, StatusCode};
use parking_lot::Mutex;
use session_gateway::{
	auth::{AccessToken, Identity},
	bus::ChannelHub,
	config::GatewayConfig,
	error::TransportError,
	gateway::SessionGateway,
	http::{ApiRequest, ApiResponse, Transport, TransportFuture},
	redirect::MemoryHistory,
	session::{Session, TabId},
	store::SharedStorage,
	url::Url,
};
use time::Duration;

pub const APP_ORIGIN: &str = "https://shop.example.com";
pub const LOGIN_URL: &str = "https://auth.example.com/login";
pub const API_BASE: &str = "https://api.example.com/";

type Handler = dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync;

/// In-process [`Transport`] answering from a closure and logging every call it receives.
pub struct ScriptedTransport {
	handler: Box<Handler>,
	delays: HashMap<String, StdDuration>,
	log: Mutex<Vec<ApiRequest>>,
}
impl ScriptedTransport {
	pub fn new<F>(handler: F) -> Self
	where
		F: 'static + Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync,
	{
		Self { handler: Box::new(handler), delays: HashMap::new(), log: Mutex::new(Vec::new()) }
	}

	/// Transport that fails the test if it is ever called.
	pub fn silent() -> Self {
		Self::new(|request| panic!("Idle tab must not call the API, got {}.", request.url))
	}

	/// Delays responses for `path` so concurrent callers pile up behind it.
	pub fn with_delay(mut self, path: &str, delay: StdDuration) -> Self {
		self.delays.insert(path.to_owned(), delay);

		self
	}

	pub fn requests(&self) -> Vec<ApiRequest> {
		self.log.lock().clone()
	}

	pub fn calls_to(&self, path: &str) -> usize {
		self.log.lock().iter().filter(|request| request.url.path() == path).count()
	}

	pub fn calls_with_bearer(&self, prefix: &str, token: &str) -> usize {
		self.log
			.lock()
			.iter()
			.filter(|request| request.url.path().starts_with(prefix))
			.filter(|request| request.bearer() == Some(token))
			.count()
	}
}
impl Transport for ScriptedTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			self.log.lock().push(request.clone());

			if let Some(delay) = self.delays.get(request.url.path()) {
				tokio::time::sleep(*delay).await;
			}

			(self.handler)(&request)
		})
	}
}

pub fn url(value: &str) -> Url {
	Url::parse(value).expect("Fixture URL should parse.")
}

pub fn status(code: u16) -> ApiResponse {
	ApiResponse::new(StatusCode::from_u16(code).expect("Fixture status should be valid."))
}

pub fn json(code: u16, body: serde_json::Value) -> ApiResponse {
	ApiResponse::json_body(StatusCode::from_u16(code).expect("Fixture status should be valid."), &body)
}

pub fn test_config(api_base: &str) -> GatewayConfig {
	GatewayConfig::builder()
		.api_base(url(api_base))
		.app_origin(url(APP_ORIGIN))
		.login_origin(url("https://auth.example.com"))
		.notice_countdown(Duration::ZERO)
		.storage_poll_interval(Duration::milliseconds(10))
		.build()
		.expect("Test configuration should build.")
}

/// One simulated tab: its gateway plus the history its redirects land in.
pub struct Tab {
	pub gateway: SessionGateway<ScriptedTransport>,
	pub history: Arc<MemoryHistory>,
}
impl Tab {
	pub fn session(&self) -> &Arc<Session> {
		&self.gateway.session
	}

	pub fn transport(&self) -> &Arc<ScriptedTransport> {
		&self.gateway.transport
	}

	pub fn get(&self, path: &str) -> ApiRequest {
		self.gateway.request(Method::GET, path).expect("Fixture path should join onto the API base.")
	}
}

pub struct TabBuilder {
	name: &'static str,
	config: GatewayConfig,
	hub: Option<ChannelHub>,
	storage: Option<Arc<dyn SharedStorage>>,
	token: Option<&'static str>,
}
impl TabBuilder {
	pub fn new(name: &'static str) -> Self {
		Self { name, config: test_config(API_BASE), hub: None, storage: None, token: None }
	}

	pub fn config(mut self, config: GatewayConfig) -> Self {
		self.config = config;

		self
	}

	pub fn hub(mut self, hub: &ChannelHub) -> Self {
		self.hub = Some(hub.clone());

		self
	}

	pub fn storage(mut self, storage: Arc<dyn SharedStorage>) -> Self {
		self.storage = Some(storage);

		self
	}

	pub fn token(mut self, token: &'static str) -> Self {
		self.token = Some(token);

		self
	}

	pub fn build(self, transport: ScriptedTransport) -> Tab {
		let history = Arc::new(MemoryHistory::new(url(&format!("{APP_ORIGIN}/"))));

		history.push(url(&format!("{APP_ORIGIN}/orders")));

		let mut builder = Session::builder(self.config)
			.tab(TabId::new(self.name))
			.navigator(history.clone())
			.identity(Identity::new(format!("user-of-{}", self.name)));

		if let Some(hub) = self.hub {
			builder = builder.channel_hub(hub);
		}
		if let Some(storage) = self.storage {
			builder = builder.storage(storage);
		}
		if let Some(token) = self.token {
			builder = builder.token(AccessToken::new(token));
		}

		let session = builder.build().expect("Test session should build.");

		Tab { gateway: SessionGateway::new(Arc::new(transport), session), history }
	}
}

/// Polls `condition` until it holds or roughly two seconds pass.
pub async fn eventually<F>(mut condition: F) -> bool
where
	F: FnMut() -> bool,
{
	for _ in 0..400 {
		if condition() {
			return true;
		}

		tokio::time::sleep(StdDuration::from_millis(5)).await;
	}

	condition()
}

/// Awaits `future`, failing the test after five seconds.
pub async fn within<F>(future: F) -> F::Output
where
	F: Future,
{
	tokio::time::timeout(StdDuration::from_secs(5), future)
		.await
		.expect("Operation should finish within five seconds.")
}
