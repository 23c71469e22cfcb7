//! Counters describing renewal activity.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for credential renewals.
#[derive(Debug, Default)]
pub struct RenewalMetrics {
	started: AtomicU64,
	joined: AtomicU64,
	reused: AtomicU64,
	succeeded: AtomicU64,
	failed: AtomicU64,
	timed_out: AtomicU64,
}
impl RenewalMetrics {
	/// Returns the number of renewals actually started (calls to `renew()`).
	pub fn started(&self) -> u64 {
		self.started.load(Ordering::Relaxed)
	}

	/// Returns how often a request attached to a renewal that was already in flight.
	pub fn joined(&self) -> u64 {
		self.joined.load(Ordering::Relaxed)
	}

	/// Returns how often a request replayed with a credential renewed after it was sent.
	pub fn reused(&self) -> u64 {
		self.reused.load(Ordering::Relaxed)
	}

	/// Returns the number of renewals that produced a credential.
	pub fn succeeded(&self) -> u64 {
		self.succeeded.load(Ordering::Relaxed)
	}

	/// Returns the number of renewals that failed, timeouts included.
	pub fn failed(&self) -> u64 {
		self.failed.load(Ordering::Relaxed)
	}

	/// Returns the number of renewals that exceeded the timeout.
	pub fn timed_out(&self) -> u64 {
		self.timed_out.load(Ordering::Relaxed)
	}

	pub(crate) fn record_started(&self) {
		self.started.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_joined(&self) {
		self.joined.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_reused(&self) {
		self.reused.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.succeeded.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self, timed_out: bool) {
		self.failed.fetch_add(1, Ordering::Relaxed);

		if timed_out {
			self.timed_out.fetch_add(1, Ordering::Relaxed);
		}
	}
}
