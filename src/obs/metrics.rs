// self
use crate::{obs::RenewalEvent, outcome::Outcome};

/// Records a finished request via the global metrics recorder (when enabled).
pub fn record_outcome(outcome: &Outcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("bearer_dispatch_outcome_total", "outcome" => outcome.label()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Records a renewal transition via the global metrics recorder (when enabled).
pub fn record_renewal(event: RenewalEvent) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("bearer_dispatch_renewal_total", "event" => event.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = event;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::outcome::{Failure, FailureKind};

	#[test]
	fn recorders_noop_without_metrics() {
		record_outcome(&Failure::new(FailureKind::NetworkError, "offline").into());
		record_renewal(RenewalEvent::Started);
	}
}
