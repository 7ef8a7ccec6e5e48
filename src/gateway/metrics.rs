// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for renewals, retries, and teardowns of one tab.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
	renewal_attempts: AtomicU64,
	renewal_success: AtomicU64,
	renewal_failure: AtomicU64,
	renewal_joins: AtomicU64,
	retries: AtomicU64,
	teardowns: AtomicU64,
	broadcasts: AtomicU64,
}
impl GatewayMetrics {
	/// Returns the number of renewal calls issued.
	pub fn renewal_attempts(&self) -> u64 {
		self.renewal_attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of renewals that stored a fresh token.
	pub fn renewal_successes(&self) -> u64 {
		self.renewal_success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed renewals.
	pub fn renewal_failures(&self) -> u64 {
		self.renewal_failure.load(Ordering::Relaxed)
	}

	/// Returns how many requests waited on a renewal started by another request.
	pub fn renewal_joins(&self) -> u64 {
		self.renewal_joins.load(Ordering::Relaxed)
	}

	/// Returns the number of requests replayed after a renewal.
	pub fn retries(&self) -> u64 {
		self.retries.load(Ordering::Relaxed)
	}

	/// Returns the number of local teardowns.
	pub fn teardowns(&self) -> u64 {
		self.teardowns.load(Ordering::Relaxed)
	}

	/// Returns the number of invalidation broadcasts published.
	pub fn broadcasts(&self) -> u64 {
		self.broadcasts.load(Ordering::Relaxed)
	}

	pub(crate) fn record_renewal_attempt(&self) {
		self.renewal_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_renewal_success(&self) {
		self.renewal_success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_renewal_failure(&self) {
		self.renewal_failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_renewal_join(&self) {
		self.renewal_joins.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_retry(&self) {
		self.retries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_teardown(&self) {
		self.teardowns.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_broadcast(&self) {
		self.broadcasts.fetch_add(1, Ordering::Relaxed);
	}
}
