// self
use crate::obs::{OpKind, OpOutcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"whoop_gateway_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_op_outcome_without_recorder_is_silent() {
		record_op_outcome(OpKind::Fetch, OpOutcome::CacheHit);
		record_op_outcome(OpKind::Refresh, OpOutcome::Failure);
	}
}
