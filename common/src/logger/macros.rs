use tracing::{Level, Span};

use super::TraceId;

/// Root span for one feed session; every log line inside carries the trace id.
pub fn session_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::span!(
        Level::INFO,
        "session",
        name = name,
        trace_id = %trace_id
    )
}

/// Create a child span (inherits trace_id automatically)
pub fn child_span(name: &'static str) -> Span {
    tracing::span!(Level::INFO, "task", name = name)
}
