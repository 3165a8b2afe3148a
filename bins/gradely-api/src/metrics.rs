// Prometheus counters for the grading pipeline's edges

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref SOLUTIONS_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "gradely_solutions_submitted_total",
        "Solutions accepted at the submission endpoint",
        &["kind", "status"]
    )
    .expect("metric registration");
    pub static ref SOLUTIONS_RESUBMITTED: IntCounterVec = register_int_counter_vec!(
        "gradely_solutions_resubmitted_total",
        "Explicit re-submissions",
        &["kind"]
    )
    .expect("metric registration");
    pub static ref GRADER_REPORTS: IntCounterVec = register_int_counter_vec!(
        "gradely_grader_reports_total",
        "Grader callback deliveries by disposition",
        &["kind", "disposition"]
    )
    .expect("metric registration");
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
