mod common;

// std
use std::sync::{
	Arc,
	atomic::{AtomicU32, Ordering},
};
// crates.io
use http::{Method, StatusCode};
use serde_json::json;
// self
use common::*;
use session_gateway::{
	auth::AccessToken,
	bus::{ChannelHub, SessionInvalidationEvent},
	config::GatewayConfig,
	error::{Error, TransportError},
	gateway::RequestAttempt,
	notice::{NoticeOrigin, SessionEvent},
	redirect::Navigator,
};

const RENEW: &str = "/auth/refresh";
const REVOKE: &str = "/auth/logout";

fn renewing_api(fresh: &'static str) -> ScriptedTransport {
	ScriptedTransport::new(move |request| match request.url.path() {
		RENEW => Ok(json(200, json!({ "token": fresh }))),
		REVOKE => Ok(status(204)),
		_ if request.bearer() == Some(fresh) => Ok(json(200, json!({ "ok": true }))),
		_ => Ok(status(401)),
	})
}

fn failing_renewal(code: u16) -> ScriptedTransport {
	ScriptedTransport::new(move |request| match request.url.path() {
		RENEW => Ok(status(code)),
		REVOKE => Ok(status(204)),
		_ => Ok(status(401)),
	})
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_renewal() {
	let tab = TabBuilder::new("tab-a")
		.token("expired")
		.build(renewing_api("abc").with_delay(RENEW, std::time::Duration::from_millis(50)));
	let mut events = tab.session().events();
	let (a, b, c, d, e) = tokio::join!(
		tab.gateway.send(tab.get("/api/a")),
		tab.gateway.send(tab.get("/api/b")),
		tab.gateway.send(tab.get("/api/c")),
		tab.gateway.send(tab.get("/api/d")),
		tab.gateway.send(tab.get("/api/e")),
	);

	for response in [a, b, c, d, e] {
		assert_eq!(response.expect("Replayed request should succeed.").status, StatusCode::OK);
	}

	assert_eq!(tab.transport().calls_to(RENEW), 1);
	assert_eq!(tab.transport().calls_with_bearer("/api/", "expired"), 5);
	assert_eq!(tab.transport().calls_with_bearer("/api/", "abc"), 5);
	assert_eq!(tab.session().tokens.get(), Some(AccessToken::new("abc")));
	assert!(!tab.gateway.is_refreshing());

	let metrics = &tab.session().metrics;

	assert_eq!(metrics.renewal_attempts(), 1);
	assert_eq!(metrics.renewal_successes(), 1);
	assert_eq!(metrics.renewal_joins(), 4);
	assert_eq!(metrics.retries(), 5);
	assert!(matches!(events.try_recv(), Ok(SessionEvent::Renewed)));
}

#[tokio::test]
async fn failed_renewal_tears_down_once_and_returns_original_401s() {
	let hub = ChannelHub::default();
	let mut observer = hub.channel("auth").subscribe();
	let tab = TabBuilder::new("tab-a")
		.hub(&hub)
		.token("expired")
		.build(failing_renewal(500).with_delay(RENEW, std::time::Duration::from_millis(50)));
	let mut events = tab.session().events();
	let (a, b, c, d, e) = tokio::join!(
		tab.gateway.send(tab.get("/api/a")),
		tab.gateway.send(tab.get("/api/b")),
		tab.gateway.send(tab.get("/api/c")),
		tab.gateway.send(tab.get("/api/d")),
		tab.gateway.send(tab.get("/api/e")),
	);

	for response in [a, b, c, d, e] {
		assert_eq!(
			response.expect("Renewal failure should not surface as an error.").status,
			StatusCode::UNAUTHORIZED
		);
	}

	assert_eq!(tab.transport().calls_to(RENEW), 1);
	assert_eq!(tab.transport().calls_with_bearer("/api/", "expired"), 5);
	assert!(tab.session().is_signed_out());
	assert!(!tab.session().tokens.is_present());
	assert!(!tab.session().identity.is_present());
	assert!(!tab.gateway.is_refreshing());

	let metrics = &tab.session().metrics;

	assert_eq!(metrics.renewal_failures(), 1);
	assert_eq!(metrics.teardowns(), 1);
	assert_eq!(metrics.broadcasts(), 1);
	assert_eq!(metrics.retries(), 0);
	assert_eq!(observer.try_recv().ok(), Some(SessionInvalidationEvent::logout()));
	assert!(observer.try_recv().is_err());

	match events.try_recv() {
		Ok(SessionEvent::SignedOut(notice)) => {
			assert_eq!(notice.origin, NoticeOrigin::Local);
			assert_eq!(notice.redirect_to.as_str(), LOGIN_URL);
		},
		other => panic!("Expected a single sign-out notice, got {other:?}."),
	}

	assert!(events.try_recv().is_err());
	assert!(eventually(|| tab.transport().calls_to(REVOKE) == 1).await);
	assert_eq!(within(tab.session().redirected()).await.as_str(), LOGIN_URL);
	assert_eq!(tab.history.current(), Some(url(LOGIN_URL)));
	assert_eq!(tab.history.back(), Some(url(&format!("{APP_ORIGIN}/"))));
}

#[tokio::test]
async fn replayed_request_is_not_renewed_twice() {
	let tab = TabBuilder::new("tab-a").token("expired").build(ScriptedTransport::new(
		|request| match request.url.path() {
			RENEW => Ok(json(200, json!({ "token": "abc" }))),
			_ => Ok(status(401)),
		},
	));
	let response =
		tab.gateway.send(tab.get("/api/orders")).await.expect("Send should return a response.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert_eq!(tab.transport().calls_to(RENEW), 1);
	assert_eq!(tab.transport().calls_to("/api/orders"), 2);
	assert!(!tab.session().is_signed_out());
	assert_eq!(tab.session().metrics.teardowns(), 0);

	let mut attempt = RequestAttempt::new();

	assert!(attempt.mark_retried());

	let response = tab
		.gateway
		.send_with(tab.get("/api/orders"), &mut attempt)
		.await
		.expect("Send should return a response.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert_eq!(tab.transport().calls_to(RENEW), 1);
}

#[tokio::test]
async fn settled_renewal_frees_the_slot_for_the_next_expiry() {
	let generation = Arc::new(AtomicU32::new(1));
	let server_generation = Arc::clone(&generation);
	let tab = TabBuilder::new("tab-a").token("t0").build(ScriptedTransport::new(move |request| {
		let valid = format!("t{}", server_generation.load(Ordering::SeqCst));

		match request.url.path() {
			RENEW => Ok(json(200, json!({ "token": valid }))),
			_ if request.bearer() == Some(valid.as_str()) => Ok(status(200)),
			_ => Ok(status(401)),
		}
	}));
	let first = tab.gateway.send(tab.get("/api/a")).await.expect("First send should succeed.");

	assert_eq!(first.status, StatusCode::OK);
	assert_eq!(tab.session().tokens.get(), Some(AccessToken::new("t1")));

	generation.store(2, Ordering::SeqCst);

	let second = tab.gateway.send(tab.get("/api/b")).await.expect("Second send should succeed.");

	assert_eq!(second.status, StatusCode::OK);
	assert_eq!(tab.transport().calls_to(RENEW), 2);
	assert_eq!(tab.session().tokens.get(), Some(AccessToken::new("t2")));
}

#[tokio::test]
async fn renewal_without_token_field_is_a_failure() {
	let tab = TabBuilder::new("tab-a").token("expired").build(ScriptedTransport::new(
		|request| match request.url.path() {
			RENEW => Ok(json(200, json!({ "token": "" }))),
			REVOKE => Ok(status(204)),
			_ => Ok(status(401)),
		},
	));
	let response =
		tab.gateway.send(tab.get("/api/orders")).await.expect("Send should return a response.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert!(tab.session().is_signed_out());
	assert_eq!(tab.session().metrics.renewal_failures(), 1);
}

#[tokio::test]
async fn renewal_sends_the_context_marker() {
	let config = GatewayConfig::builder()
		.api_base(url(API_BASE))
		.app_origin(url(APP_ORIGIN))
		.login_origin(url("https://auth.example.com"))
		.context_marker("web-7")
		.build()
		.expect("Context configuration should build.");
	let tab = TabBuilder::new("tab-a").config(config).token("expired").build(renewing_api("abc"));

	tab.gateway.send(tab.get("/api/orders")).await.expect("Send should return a response.");

	let renewal = tab
		.transport()
		.requests()
		.into_iter()
		.find(|request| request.url.path() == RENEW)
		.expect("A renewal call should have been made.");
	let body: serde_json::Value =
		serde_json::from_slice(&renewal.body).expect("Renewal body should be JSON.");

	assert_eq!(renewal.method, Method::POST);
	assert_eq!(renewal.bearer(), None);
	assert_eq!(body, json!({ "context": "web-7" }));
}

#[tokio::test]
async fn forbidden_passes_through_untouched() {
	let tab = TabBuilder::new("tab-a").token("valid").build(ScriptedTransport::new(|_| Ok(status(403))));
	let response =
		tab.gateway.send(tab.get("/api/admin")).await.expect("Send should return a response.");

	assert_eq!(response.status, StatusCode::FORBIDDEN);
	assert_eq!(tab.transport().calls_to(RENEW), 0);
	assert_eq!(tab.transport().calls_with_bearer("/api/", "valid"), 1);
}

#[tokio::test]
async fn transport_errors_propagate_without_renewal() {
	let tab = TabBuilder::new("tab-a").token("valid").build(ScriptedTransport::new(|_| {
		Err(TransportError::Io(std::io::Error::other("connection reset")))
	}));
	let err = tab
		.gateway
		.send(tab.get("/api/orders"))
		.await
		.expect_err("Transport failures should reach the caller.");

	assert!(matches!(err, Error::Transport(TransportError::Io(_))));
	assert_eq!(tab.transport().calls_to(RENEW), 0);
	assert!(!tab.session().is_signed_out());
}

#[tokio::test]
async fn invalidate_is_idempotent_until_the_next_login() {
	let hub = ChannelHub::default();
	let mut observer = hub.channel("auth").subscribe();
	let tab = TabBuilder::new("tab-a").hub(&hub).token("valid").build(failing_renewal(500));

	assert!(tab.gateway.invalidate().is_some());
	assert!(tab.gateway.invalidate().is_none());
	assert_eq!(tab.session().metrics.broadcasts(), 1);
	assert!(observer.try_recv().is_ok());
	assert!(observer.try_recv().is_err());

	tab.session().establish(AccessToken::new("again"), None);

	assert!(tab.gateway.invalidate().is_some());
	assert_eq!(tab.session().metrics.broadcasts(), 2);
}

#[tokio::test]
async fn failed_renewal_does_not_block_the_next_one() {
	let renewals = Arc::new(AtomicU32::new(0));
	let counter = Arc::clone(&renewals);
	let tab = TabBuilder::new("tab-a").token("expired").build(ScriptedTransport::new(
		move |request| match request.url.path() {
			RENEW if counter.fetch_add(1, Ordering::SeqCst) == 0 => Ok(status(500)),
			RENEW => Ok(json(200, json!({ "token": "abc" }))),
			REVOKE => Ok(status(204)),
			_ if request.bearer() == Some("abc") => Ok(status(200)),
			_ => Ok(status(401)),
		},
	));
	let first = tab.gateway.send(tab.get("/api/a")).await.expect("First send should respond.");

	assert_eq!(first.status, StatusCode::UNAUTHORIZED);
	assert!(tab.session().is_signed_out());
	assert!(!tab.gateway.is_refreshing());

	let second = tab.gateway.send(tab.get("/api/b")).await.expect("Second send should respond.");

	assert_eq!(second.status, StatusCode::OK);
	assert_eq!(tab.transport().calls_to(RENEW), 2);
	assert_eq!(tab.session().tokens.get(), Some(AccessToken::new("abc")));

	let metrics = &tab.session().metrics;

	assert_eq!(metrics.renewal_failures(), 1);
	assert_eq!(metrics.renewal_successes(), 1);
	assert_eq!(metrics.teardowns(), 1);
	assert_eq!(metrics.broadcasts(), 1);
}

#[tokio::test]
async fn dropped_renewal_leader_hands_over_to_a_waiter() {
	let tab = TabBuilder::new("tab-a")
		.token("expired")
		.build(renewing_api("abc").with_delay(RENEW, std::time::Duration::from_millis(100)));
	let leader =
		tokio::time::timeout(std::time::Duration::from_millis(20), tab.gateway.send(tab.get("/api/a")));
	let waiter = async {
		tokio::time::sleep(std::time::Duration::from_millis(5)).await;

		tab.gateway.send(tab.get("/api/b")).await
	};
	let (leader, waiter) = tokio::join!(leader, waiter);

	assert!(leader.is_err(), "The leader should have been cut off by its timeout.");
	assert_eq!(waiter.expect("Waiter should get a response.").status, StatusCode::OK);
	assert_eq!(tab.transport().calls_to(RENEW), 2);
	assert_eq!(tab.transport().calls_with_bearer("/api/b", "abc"), 1);
	assert_eq!(tab.session().tokens.get(), Some(AccessToken::new("abc")));
	assert!(!tab.session().is_signed_out());
	assert!(!tab.gateway.is_refreshing());

	let metrics = &tab.session().metrics;

	assert_eq!(metrics.renewal_joins(), 1);
	assert_eq!(metrics.renewal_failures(), 0);
	assert_eq!(metrics.teardowns(), 0);
	assert_eq!(tab.transport().calls_to(REVOKE), 0);
}

#[tokio::test]
async fn unsendable_renewed_token_is_a_renewal_failure() {
	let tab = TabBuilder::new("tab-a").token("expired").build(ScriptedTransport::new(
		|request| match request.url.path() {
			RENEW => Ok(json(200, json!({ "token": "bad\ntoken" }))),
			REVOKE => Ok(status(204)),
			_ => Ok(status(401)),
		},
	));
	let response =
		tab.gateway.send(tab.get("/api/orders")).await.expect("Send should return a response.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert_eq!(tab.transport().calls_to("/api/orders"), 1);
	assert!(!tab.session().tokens.is_present());
	assert!(tab.session().is_signed_out());
	assert_eq!(tab.session().metrics.renewal_failures(), 1);
	assert_eq!(tab.session().metrics.teardowns(), 1);

	let response =
		tab.gateway.send(tab.get("/api/orders")).await.expect("Later sends should still reach the API.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert_eq!(tab.transport().calls_to("/api/orders"), 2);
}

#[tokio::test]
async fn unreachable_renewal_endpoint_tears_down() {
	let tab = TabBuilder::new("tab-a").token("expired").build(ScriptedTransport::new(
		|request| match request.url.path() {
			RENEW => Err(TransportError::Io(std::io::Error::other("connection refused"))),
			REVOKE => Ok(status(204)),
			_ => Ok(status(401)),
		},
	));
	let response = tab
		.gateway
		.send(tab.get("/api/orders"))
		.await
		.expect("Renewal transport failures should not surface as an error.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert!(tab.session().is_signed_out());
	assert_eq!(tab.session().metrics.renewal_failures(), 1);
	assert_eq!(tab.session().metrics.teardowns(), 1);
	assert_eq!(within(tab.session().redirected()).await.as_str(), LOGIN_URL);
}

#[tokio::test]
async fn non_json_renewal_body_tears_down() {
	let tab = TabBuilder::new("tab-a").token("expired").build(ScriptedTransport::new(
		|request| match request.url.path() {
			RENEW => {
				let mut page = status(200);

				page.body = b"<html>login</html>".to_vec();

				Ok(page)
			},
			REVOKE => Ok(status(204)),
			_ => Ok(status(401)),
		},
	));
	let response =
		tab.gateway.send(tab.get("/api/orders")).await.expect("Send should return a response.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert_eq!(tab.transport().calls_to("/api/orders"), 1);
	assert!(tab.session().is_signed_out());
	assert_eq!(tab.session().metrics.renewal_failures(), 1);
}

async fn assert_teardown_survives_revoke_failure(transport: ScriptedTransport) {
	let hub = ChannelHub::default();
	let mut observer = hub.channel("auth").subscribe();
	let tab = TabBuilder::new("tab-a").hub(&hub).token("expired").build(transport);
	let response =
		tab.gateway.send(tab.get("/api/orders")).await.expect("Send should return a response.");

	assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	assert!(tab.session().is_signed_out());
	assert_eq!(tab.session().metrics.broadcasts(), 1);
	assert_eq!(observer.try_recv().ok(), Some(SessionInvalidationEvent::logout()));
	assert!(eventually(|| tab.transport().calls_to(REVOKE) == 1).await);
	assert_eq!(within(tab.session().redirected()).await.as_str(), LOGIN_URL);
	assert_eq!(tab.history.current(), Some(url(LOGIN_URL)));
}

#[tokio::test]
async fn teardown_completes_when_revoke_errors() {
	assert_teardown_survives_revoke_failure(ScriptedTransport::new(|request| {
		match request.url.path() {
			RENEW => Ok(status(500)),
			REVOKE => Err(TransportError::Io(std::io::Error::other("connection reset"))),
			_ => Ok(status(401)),
		}
	}))
	.await;
}

#[tokio::test]
async fn teardown_completes_when_revoke_is_rejected() {
	assert_teardown_survives_revoke_failure(ScriptedTransport::new(|request| {
		match request.url.path() {
			RENEW => Ok(status(500)),
			REVOKE => Ok(status(500)),
			_ => Ok(status(401)),
		}
	}))
	.await;
}
