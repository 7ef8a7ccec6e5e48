//! Cross-tab session invalidation: a named broadcast channel with a shared-storage fallback.
//!
//! Every tab picks its mechanism once, at startup, through [`InvalidationBus::detect`]: when a
//! [`ChannelHub`] (the shared channel primitive) is available the bus posts
//! [`SessionInvalidationEvent`]s on the named channel; otherwise it rewrites a timestamped
//! marker under a shared storage key that other tabs observe by change notification or polling.

mod listener;

pub use listener::*;

// crates.io
use tokio::{
	sync::broadcast::{self, error::RecvError},
	time::{Interval, MissedTickBehavior},
};
// self
use crate::{
	_prelude::*,
	config::GatewayConfig,
	obs::obs_warn,
	session::TabId,
	store::{SharedStorage, StorageChange, StorageError},
};

const CHANNEL_CAPACITY: usize = 16;

/// Discriminant carried in the `type` field of invalidation messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationKind {
	/// The session was signed out.
	Logout,
}

/// Broadcast message `{"type":"logout"}` telling every tab the session is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionInvalidationEvent {
	/// Message type tag.
	#[serde(rename = "type")]
	pub kind: InvalidationKind,
}
impl SessionInvalidationEvent {
	/// The logout event.
	pub const fn logout() -> Self {
		Self { kind: InvalidationKind::Logout }
	}
}

/// Value written under the fallback storage key; a fresh timestamp makes every write a change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMarker {
	/// Message type tag, shared with [`SessionInvalidationEvent`].
	#[serde(rename = "type")]
	pub kind: InvalidationKind,
	/// Unix timestamp of the invalidation, in nanoseconds.
	pub at: i128,
	/// Tab that wrote the marker.
	pub tab: TabId,
}
impl StorageMarker {
	/// Creates a logout marker stamped with the current time.
	pub fn logout(tab: TabId) -> Self {
		Self {
			kind: InvalidationKind::Logout,
			at: OffsetDateTime::now_utc().unix_timestamp_nanos(),
			tab,
		}
	}

	/// The event this marker announces.
	pub const fn event(&self) -> SessionInvalidationEvent {
		SessionInvalidationEvent { kind: self.kind }
	}
}

/// Registry of named in-process broadcast channels shared by every tab of a runtime.
///
/// Clones share the same registry, like `BroadcastChannel` objects opened with the same name.
#[derive(Clone, Debug, Default)]
pub struct ChannelHub(Arc<Mutex<HashMap<String, broadcast::Sender<SessionInvalidationEvent>>>>);
impl ChannelHub {
	/// Opens (creating on demand) the channel called `name`.
	pub fn channel(&self, name: &str) -> NamedChannel {
		let mut channels = self.0.lock();
		let sender = channels
			.entry(name.to_owned())
			.or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
			.clone();

		NamedChannel { name: name.to_owned(), sender }
	}
}

/// Handle on one named channel of a [`ChannelHub`].
#[derive(Clone, Debug)]
pub struct NamedChannel {
	name: String,
	sender: broadcast::Sender<SessionInvalidationEvent>,
}
impl NamedChannel {
	/// Channel name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Posts `event`, returning how many subscribers will receive it.
	pub fn post(&self, event: SessionInvalidationEvent) -> usize {
		// Zero subscribers simply means no other tab is open.
		self.sender.send(event).unwrap_or(0)
	}

	/// Subscribes to future posts.
	pub fn subscribe(&self) -> broadcast::Receiver<SessionInvalidationEvent> {
		self.sender.subscribe()
	}
}

/// Storage-marker fallback used when no shared channel is available.
#[derive(Clone)]
pub struct StorageFallback {
	storage: Arc<dyn SharedStorage>,
	key: String,
	poll_interval: Duration,
}
impl StorageFallback {
	/// Creates a fallback writing markers under `key`.
	pub fn new(storage: Arc<dyn SharedStorage>, key: impl Into<String>, poll_interval: Duration) -> Self {
		Self { storage, key: key.into(), poll_interval }
	}

	/// Storage key the markers are written under.
	pub fn key(&self) -> &str {
		&self.key
	}
}
impl Debug for StorageFallback {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StorageFallback")
			.field("key", &self.key)
			.field("poll_interval", &self.poll_interval)
			.finish()
	}
}

/// The one cross-tab mechanism a tab uses to publish and observe invalidations.
#[derive(Clone, Debug)]
pub enum InvalidationBus {
	/// Shared named channel.
	Channel(NamedChannel),
	/// Timestamped marker in shared storage.
	Storage(StorageFallback),
}
impl InvalidationBus {
	/// Selects the channel when `hub` is available, the storage fallback otherwise.
	pub fn detect(
		hub: Option<&ChannelHub>,
		storage: Arc<dyn SharedStorage>,
		config: &GatewayConfig,
	) -> Self {
		match hub {
			Some(hub) => Self::Channel(hub.channel(&config.channel_name)),
			None => Self::Storage(StorageFallback::new(
				storage,
				config.storage_key.clone(),
				config.storage_poll_interval,
			)),
		}
	}

	/// Stable label of the selected mechanism.
	pub const fn mechanism(&self) -> &'static str {
		match self {
			Self::Channel(_) => "channel",
			Self::Storage(_) => "storage",
		}
	}

	/// Announces a logout to every tab.
	pub fn publish(&self, tab: &TabId) -> Result<()> {
		match self {
			Self::Channel(channel) => {
				channel.post(SessionInvalidationEvent::logout());
			},
			Self::Storage(fallback) => {
				let marker = serde_json::to_string(&StorageMarker::logout(tab.clone())).map_err(
					|e| StorageError::Serialization {
						message: format!("Failed to serialize logout marker: {e}"),
					},
				)?;

				fallback.storage.set(&fallback.key, marker)?;
			},
		}

		Ok(())
	}

	/// Subscribes to invalidations published after this call.
	pub fn subscribe(&self) -> BusSubscription {
		match self {
			Self::Channel(channel) => BusSubscription::Channel(channel.subscribe()),
			Self::Storage(fallback) => {
				let last = fallback.storage.get(&fallback.key).unwrap_or_else(|e| {
					obs_warn!("Failed to read the logout marker baseline: {e}");

					None
				});
				let wake = match fallback.storage.subscribe() {
					Some(changes) => Wake::Notify(changes),
					None => Wake::Poll { period: fallback.poll_interval, interval: None },
				};

				BusSubscription::Storage {
					storage: Arc::clone(&fallback.storage),
					key: fallback.key.clone(),
					last,
					wake,
				}
			},
		}
	}
}

/// Receiving side of an [`InvalidationBus`].
pub enum BusSubscription {
	/// Subscribed to the named channel.
	Channel(broadcast::Receiver<SessionInvalidationEvent>),
	/// Watching the fallback storage key.
	Storage {
		/// Storage being watched.
		storage: Arc<dyn SharedStorage>,
		/// Watched key.
		key: String,
		/// Last marker value observed.
		last: Option<String>,
		/// How the subscription learns about writes.
		wake: Wake,
	},
}
impl BusSubscription {
	/// Waits for the next invalidation; `None` once the underlying source is closed.
	pub async fn recv(&mut self) -> Option<SessionInvalidationEvent> {
		match self {
			Self::Channel(receiver) => match receiver.recv().await {
				Ok(event) => Some(event),
				// Only logout events travel on the channel, so a lag still means one was sent.
				Err(RecvError::Lagged(_)) => Some(SessionInvalidationEvent::logout()),
				Err(RecvError::Closed) => None,
			},
			Self::Storage { storage, key, last, wake } => loop {
				if !wake.wait(key).await {
					return None;
				}

				let current = match storage.get(key) {
					Ok(current) => current,
					Err(e) => {
						obs_warn!("Failed to read the logout marker: {e}");

						continue;
					},
				};

				if current == *last {
					continue;
				}

				*last = current.clone();

				if let Some(raw) = current {
					match serde_json::from_str::<StorageMarker>(&raw) {
						Ok(marker) => return Some(marker.event()),
						Err(e) => obs_warn!("Ignoring unreadable logout marker: {e}"),
					}
				}
			},
		}
	}
}
impl Debug for BusSubscription {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Channel(_) => f.write_str("BusSubscription::Channel(..)"),
			Self::Storage { key, wake, .. } => f
				.debug_struct("BusSubscription::Storage")
				.field("key", key)
				.field("wake", wake)
				.finish(),
		}
	}
}

/// Wake-up source of a storage subscription.
pub enum Wake {
	/// Storage change notifications.
	Notify(broadcast::Receiver<StorageChange>),
	/// Periodic polling; the interval is created on first use inside the runtime.
	Poll {
		/// Poll period.
		period: Duration,
		/// Lazily created ticker.
		interval: Option<Interval>,
	},
}
impl Wake {
	async fn wait(&mut self, key: &str) -> bool {
		match self {
			Self::Notify(changes) => loop {
				match changes.recv().await {
					Ok(change) if change.key != key => continue,
					// A lag may have swallowed our key; re-reading storage is always safe.
					Ok(_) | Err(RecvError::Lagged(_)) => return true,
					Err(RecvError::Closed) => return false,
				}
			},
			Self::Poll { period, interval } => {
				let ticker = interval.get_or_insert_with(|| {
					let period = period.unsigned_abs().max(std::time::Duration::from_millis(1));
					let mut ticker = tokio::time::interval(period);

					ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

					ticker
				});

				ticker.tick().await;

				true
			},
		}
	}
}
impl Debug for Wake {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Notify(_) => f.write_str("Notify"),
			Self::Poll { period, .. } => f.debug_struct("Poll").field("period", period).finish(),
		}
	}
}
