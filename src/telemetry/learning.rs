//! Spans for learning activity.

use tracing::Span;
use uuid::Uuid;

/// Span covering one task submission, from lookup to completion cascade.
pub fn start_submission_span(mode: &str, task_id: &Uuid) -> Span {
    tracing::info_span!(
        "learning.submit",
        "learning.mode" = mode,
        "learning.task_id" = %task_id,
    )
}

/// Emit a status change inside `span`.
pub fn record_status_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "status_transition");
    });
}
