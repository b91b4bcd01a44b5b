//! Observability helpers for gateway operations.
//!
//! Every data fetch and token refresh runs inside a `whoop_gateway.op` span carrying the
//! `op` and `stage` fields. With the `metrics` feature enabled, each outcome also increments
//! the `whoop_gateway_op_total` counter labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operation kinds observed by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// A call through the data pipeline.
	Fetch,
	/// A refresh-token exchange.
	Refresh,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Fetch => "fetch",
			OpKind::Refresh => "refresh",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Answered from the response cache without a network call.
	CacheHit,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::CacheHit => "cache_hit",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
