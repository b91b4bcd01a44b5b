//! Per-gateway pipeline counters.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for the data pipeline.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
	requests: AtomicU64,
	cache_hits: AtomicU64,
	network_calls: AtomicU64,
	local_rejections: AtomicU64,
	failures: AtomicU64,
}
impl PipelineMetrics {
	/// Returns the number of pipeline executions.
	pub fn requests(&self) -> u64 {
		self.requests.load(Ordering::Relaxed)
	}

	/// Returns the number of executions answered from the cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Returns the number of upstream GETs sent.
	pub fn network_calls(&self) -> u64 {
		self.network_calls.load(Ordering::Relaxed)
	}

	/// Returns the number of calls refused by the local limiter.
	pub fn local_rejections(&self) -> u64 {
		self.local_rejections.load(Ordering::Relaxed)
	}

	/// Returns the number of executions that ended in an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_request(&self) {
		self.requests.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_network_call(&self) {
		self.network_calls.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_local_rejection(&self) {
		self.local_rejections.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
