//! Two tabs share one channel hub. Tab A's renewal is rejected, it tears its session down, and
//! tab B follows the broadcast to the login page without touching the API.
//!
//! Run with `cargo run --example two_tabs`.

// std
use std::sync::Arc;
// crates.io
use color_eyre::{Result, eyre::eyre};
use http::{Method, StatusCode};
use session_gateway::{
	auth::{AccessToken, Identity},
	bus::ChannelHub,
	config::GatewayConfig,
	error::TransportError,
	gateway::SessionGateway,
	http::{ApiRequest, ApiResponse, Transport, TransportFuture},
	notice::SessionEvent,
	redirect::{MemoryHistory, Navigator},
	session::{Session, TabId},
	url::Url,
};
use time::Duration;

/// Backend whose refresh cookie has expired: every call answers 401.
struct ExpiredBackend;
impl Transport for ExpiredBackend {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			println!("  -> {} {}", request.method, request.url);

			Ok::<_, TransportError>(ApiResponse::new(StatusCode::UNAUTHORIZED))
		})
	}
}

fn open_tab(
	name: &str,
	config: &GatewayConfig,
	hub: &ChannelHub,
) -> Result<(SessionGateway<ExpiredBackend>, Arc<MemoryHistory>)> {
	let history = Arc::new(MemoryHistory::new(Url::parse("https://shop.example.com/orders")?));
	let session = Session::builder(config.clone())
		.tab(TabId::new(name))
		.channel_hub(hub.clone())
		.navigator(history.clone())
		.token(AccessToken::new("expired"))
		.identity(Identity::new("user-42").with_display_name("Ada"))
		.build()?;

	Ok((SessionGateway::new(Arc::new(ExpiredBackend), session), history))
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = GatewayConfig::builder()
		.api_base(Url::parse("https://api.example.com/")?)
		.app_origin(Url::parse("https://shop.example.com")?)
		.login_origin(Url::parse("https://auth.example.com")?)
		.notice_countdown(Duration::milliseconds(300))
		.build()?;
	let hub = ChannelHub::default();
	let (tab_a, history_a) = open_tab("tab-a", &config, &hub)?;
	let (tab_b, history_b) = open_tab("tab-b", &config, &hub)?;
	let _listener_a = tab_a.session.spawn_listener();
	let _listener_b = tab_b.session.spawn_listener();
	let mut notices_b = tab_b.session.events();

	println!("tab-a requests /api/orders");

	let request = tab_a.request(Method::GET, "/api/orders")?;
	let response = tab_a.send(request).await?;

	println!("tab-a got HTTP {}", response.status);

	match notices_b.recv().await? {
		SessionEvent::SignedOut(notice) => println!("tab-b notice: {}", notice.message()),
		SessionEvent::Renewed => return Err(eyre!("tab-b unexpectedly renewed")),
	}

	let landed_a = tab_a.session.redirected().await;
	let landed_b = tab_b.session.redirected().await;

	println!("tab-a landed on {landed_a} (history at {:?})", history_a.current().map(String::from));
	println!("tab-b landed on {landed_b} (history at {:?})", history_b.current().map(String::from));

	Ok(())
}
