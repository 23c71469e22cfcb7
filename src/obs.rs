//! Optional observability helpers for dispatch and renewal.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `bearer_dispatch.request` with the `method`,
//!   `path`, and `stage` fields, plus debug/warn events for every renewal transition.
//! - Enable `metrics` to increment `bearer_dispatch_outcome_total` (labeled by `outcome`) for each
//!   finished request and `bearer_dispatch_renewal_total` (labeled by `event`) for each renewal
//!   transition.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Dispatch stages observed by spans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// First transmission of a request.
	Dispatch,
	/// Single replay after a renewal.
	Replay,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Dispatch => "dispatch",
			Stage::Replay => "replay",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Renewal transitions recorded by the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenewalEvent {
	/// A new single-flight renewal was spawned.
	Started,
	/// A request attached to the renewal already in flight.
	Joined,
	/// A request found that a renewal had completed since it was authorized.
	Reused,
	/// The renewal produced a new credential.
	Succeeded,
	/// The renewal failed.
	Failed,
	/// The renewal exceeded its timeout.
	TimedOut,
}
impl RenewalEvent {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RenewalEvent::Started => "started",
			RenewalEvent::Joined => "joined",
			RenewalEvent::Reused => "reused",
			RenewalEvent::Succeeded => "succeeded",
			RenewalEvent::Failed => "failed",
			RenewalEvent::TimedOut => "timed_out",
		}
	}
}
impl Display for RenewalEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
