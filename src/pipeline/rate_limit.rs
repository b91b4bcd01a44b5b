//! Local admission control consulted before every outbound data call.

// self
use crate::{_prelude::*, endpoint::Endpoint};

/// Strategy that decides whether the next upstream call may proceed.
pub trait RateLimitPolicy
where
	Self: Send + Sync,
{
	/// Evaluates the call described by `context`, counting it when admitted.
	fn evaluate(&self, context: &RateLimitContext) -> RateLimitDecision;
}

/// Context shared with a [`RateLimitPolicy`] before an outbound call is made.
#[derive(Clone, Debug)]
pub struct RateLimitContext {
	/// Endpoint about to be called.
	pub endpoint: Endpoint,
	/// Timestamp the pipeline observed before invoking the policy.
	pub observed_at: OffsetDateTime,
}
impl RateLimitContext {
	/// Creates a new context for `endpoint` observed now.
	pub fn new(endpoint: Endpoint) -> Self {
		Self { endpoint, observed_at: OffsetDateTime::now_utc() }
	}

	/// Overrides the timestamp associated with the observation.
	pub fn with_observed_at(mut self, instant: OffsetDateTime) -> Self {
		self.observed_at = instant;

		self
	}
}

/// Result emitted by a [`RateLimitPolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The request may proceed immediately.
	Admit,
	/// The request must not be sent.
	Reject(RetryDirective),
}

/// Advises callers when to retry after a [`RateLimitDecision::Reject`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when it is safe to retry.
	pub earliest_retry_at: OffsetDateTime,
	/// Suggested backoff duration.
	pub recommended_backoff: Duration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

#[derive(Debug, Default)]
struct WindowState {
	request_count: u32,
	window_start: Option<OffsetDateTime>,
}

/// Fixed-window counter shared by every endpoint.
///
/// The first window opens at the first evaluation. A window is reset lazily by the first
/// evaluation at or after `window_start + window`, before the admission check, so a call
/// landing exactly on the boundary counts against the new window.
#[derive(Debug)]
pub struct FixedWindowLimiter {
	max_requests: u32,
	window: Duration,
	state: Mutex<WindowState>,
}
impl FixedWindowLimiter {
	/// Creates a limiter admitting `max_requests` per `window`.
	pub fn new(max_requests: u32, window: Duration) -> Self {
		Self { max_requests, window, state: Mutex::new(WindowState::default()) }
	}

	/// Admission ceiling per window.
	pub fn max_requests(&self) -> u32 {
		self.max_requests
	}

	/// Requests admitted in the current window as of the last evaluation.
	pub fn request_count(&self) -> u32 {
		self.state.lock().request_count
	}

	/// Evaluates a call at `instant`, counting it when admitted.
	pub fn evaluate_at(&self, instant: OffsetDateTime) -> RateLimitDecision {
		let mut state = self.state.lock();
		let window_start = match state.window_start {
			Some(start) if instant - start < self.window => start,
			_ => {
				state.request_count = 0;
				state.window_start = Some(instant);

				instant
			},
		};

		if state.request_count >= self.max_requests {
			let earliest_retry_at = window_start + self.window;

			return RateLimitDecision::Reject(
				RetryDirective::new(earliest_retry_at, earliest_retry_at - instant).with_reason(
					format!("{} requests per window already admitted", self.max_requests),
				),
			);
		}

		state.request_count += 1;

		RateLimitDecision::Admit
	}
}
impl RateLimitPolicy for FixedWindowLimiter {
	fn evaluate(&self, context: &RateLimitContext) -> RateLimitDecision {
		self.evaluate_at(context.observed_at)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn ceiling_is_enforced_inside_a_window() {
		let limiter = FixedWindowLimiter::new(3, Duration::minutes(1));
		let start = macros::datetime!(2025-01-01 00:00 UTC);

		for offset in 0..3 {
			assert_eq!(limiter.evaluate_at(start + Duration::seconds(offset)), RateLimitDecision::Admit);
		}

		let RateLimitDecision::Reject(directive) = limiter.evaluate_at(start + Duration::seconds(10))
		else {
			panic!("Fourth call inside the window should be rejected.");
		};

		assert_eq!(directive.earliest_retry_at, start + Duration::minutes(1));
		assert_eq!(directive.recommended_backoff, Duration::seconds(50));
		assert_eq!(directive.reason.as_deref(), Some("3 requests per window already admitted"));
		assert_eq!(limiter.request_count(), limiter.max_requests());
	}

	#[test]
	fn boundary_call_lands_in_the_new_window() {
		let limiter = FixedWindowLimiter::new(1, Duration::minutes(1));
		let start = macros::datetime!(2025-01-01 00:00 UTC);

		assert_eq!(limiter.evaluate_at(start), RateLimitDecision::Admit);
		assert!(matches!(
			limiter.evaluate_at(start + Duration::seconds(59)),
			RateLimitDecision::Reject(_)
		));
		assert_eq!(limiter.evaluate_at(start + Duration::minutes(1)), RateLimitDecision::Admit);
		assert_eq!(limiter.request_count(), 1);
	}

	#[test]
	fn policy_trait_uses_context_timestamp() {
		let limiter = FixedWindowLimiter::new(1, Duration::minutes(1));
		let policy: &dyn RateLimitPolicy = &limiter;
		let at = macros::datetime!(2025-01-01 12:00 UTC);
		let context = RateLimitContext::new(Endpoint::Cycles).with_observed_at(at);

		assert_eq!(policy.evaluate(&context), RateLimitDecision::Admit);
		assert!(matches!(policy.evaluate(&context), RateLimitDecision::Reject(_)));
	}
}
