use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::{handlers, metrics, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/solutions", post(handlers::submit))
        .route("/solutions/:kind/:id", get(handlers::get_solution))
        .route("/solutions/:kind/:id/resubmit", post(handlers::resubmit))
        .route("/grader/report", post(handlers::grader_report))
}
