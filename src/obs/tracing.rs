// crates.io
use tracing::{Instrument, Span, instrument::Instrumented};
// self
use crate::{_prelude::*, obs::OpKind};

/// A span builder used by gateway operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	span: Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		Self { span: tracing::info_span!("whoop_gateway.op", op = kind.as_str(), stage) }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> OpSpanGuard {
		OpSpanGuard { _guard: self.span.entered() }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}

/// RAII guard returned by [`OpSpan::entered`].
pub struct OpSpanGuard {
	_guard: tracing::span::EnteredSpan,
}
impl Debug for OpSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("OpSpanGuard(..)")
	}
}
