//! GenAI semantic-convention spans for AI scoring calls.
//!
//! Fields follow the OpenTelemetry GenAI conventions:
//! `gen_ai.operation.name`, `gen_ai.request.model`, `gen_ai.provider.name`.
//! `aisquare.ai.task` names the scoring operation being performed.

use tracing::Span;

/// Start a span for a chat completion made on behalf of `task`
/// ("evaluate" or "generate").
pub fn start_chat_span(model: &str, provider: &str, task: &str) -> Span {
    tracing::info_span!(
        "gen_ai.chat",
        "gen_ai.operation.name" = "chat",
        "gen_ai.request.model" = model,
        "gen_ai.provider.name" = provider,
        "aisquare.ai.task" = task,
        "gen_ai.response.chars" = tracing::field::Empty,
    )
}

/// Record the size of the model's reply on a span from [`start_chat_span`].
pub fn record_response_size(span: &Span, chars: usize) {
    span.record("gen_ai.response.chars", chars as u64);
}
