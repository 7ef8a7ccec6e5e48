//! Authenticated request gateway: bearer injection, single-flight token renewal, retry-once
//! guards, and cross-tab session teardown in one crate.
//!
//! Build a [`session::Session`] per tab, wrap it in a [`gateway::SessionGateway`], and start the
//! tab's [`bus::CrossTabListener`] at startup. Every protected call then goes through
//! [`gateway::SessionGateway::send`].

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod notice;
pub mod obs;
pub mod redirect;
pub mod session;
pub mod store;

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::OnceCell as AsyncOnceCell;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
