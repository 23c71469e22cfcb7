// self
use crate::{
	_prelude::*,
	error::RenewalError,
	obs::{self, RenewalEvent, Stage},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedRequest<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedRequest<F> = F;

/// A span builder used around each dispatched request.
#[derive(Clone, Debug)]
pub struct RequestSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl RequestSpan {
	/// Creates a new span tagged with the request line and stage.
	pub fn new(stage: Stage, method: &Method, path: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"bearer_dispatch.request",
				method = method.as_str(),
				path,
				stage = stage.as_str()
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, method, path);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedRequest<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs and counts a renewal transition.
///
/// `renewal` is the coordinator-local renewal identifier.
pub(crate) fn renewal_event(event: RenewalEvent, renewal: u64) {
	obs::record_renewal(event);

	#[cfg(feature = "tracing")]
	{
		tracing::debug!(renewal, event = event.as_str(), "credential renewal transition");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = renewal;
	}
}

/// Logs and counts a failed renewal.
pub(crate) fn renewal_failed(err: &RenewalError, renewal: u64) {
	let event = match err {
		RenewalError::TimedOut { .. } => RenewalEvent::TimedOut,
		_ => RenewalEvent::Failed,
	};

	obs::record_renewal(event);

	#[cfg(feature = "tracing")]
	{
		tracing::warn!(renewal, error = %err, "credential renewal failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = renewal;
	}
}

/// Logs a preemptive renewal that failed; the request proceeds with the old credential.
pub(crate) fn preemptive_renewal_failed(err: &RenewalError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(error = %err, "preemptive renewal failed; sending with current credential");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = err;
	}
}

/// Logs that an interactive login was requested.
pub(crate) fn reauthentication_requested() {
	#[cfg(feature = "tracing")]
	{
		tracing::info!("re-authentication requested");
	}
}
