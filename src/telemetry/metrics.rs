//! Metric instruments.
//!
//! Built on demand from the globally registered `MeterProvider`. Without an
//! OTLP endpoint the global provider is a no-op and recording costs nothing.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("aisquare-learning")
}

/// Counter: scenarios created (resumes are not counted).
/// Labels: `mode`.
pub fn scenarios_started() -> Counter<u64> {
    meter()
        .u64_counter("aisquare.scenario.started")
        .with_description("Number of scenarios started")
        .build()
}

/// Counter: task responses submitted.
/// Labels: `mode`.
pub fn task_submissions() -> Counter<u64> {
    meter()
        .u64_counter("aisquare.task.submissions")
        .with_description("Number of task responses submitted")
        .build()
}

/// Counter: evaluations recorded.
/// Labels: `mode`, `evaluated_by`.
pub fn evaluations_recorded() -> Counter<u64> {
    meter()
        .u64_counter("aisquare.evaluation.recorded")
        .with_description("Number of evaluations recorded")
        .build()
}

/// Counter: task and program status transitions.
/// Labels: `entity`, `from`, `to`.
pub fn status_transitions() -> Counter<u64> {
    meter()
        .u64_counter("aisquare.status.transitions")
        .with_description("Number of task and program status transitions")
        .build()
}

/// Counter: AI calls replaced by a fallback.
/// Labels: `mode`, `operation` ("evaluate" | "generate").
pub fn ai_fallbacks() -> Counter<u64> {
    meter()
        .u64_counter("aisquare.ai.fallbacks")
        .with_description("AI calls that fell back to a default result")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("aisquare.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
