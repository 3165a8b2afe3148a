// HTTP route handlers for the Gradely API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use gradely_common::error::GradingError;
use gradely_common::repo::SolutionRepository;
use gradely_common::report::{report, ReportDisposition};
use gradely_common::status::SolutionStatus;
use gradely_common::submit::{resubmit_solution, submit_solution, NewSolution};
use gradely_common::types::{FilePayload, GradingOutcome, GradingResult, Solution, SolutionKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub student_id: Uuid,
    pub task_id: Uuid,
    pub kind: SolutionKind,
    #[serde(default = "default_gradable")]
    pub gradable: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub file: Option<FilePayload>,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_gradable() -> bool {
    true
}

/// Learner-facing view of a solution; the payload itself is not echoed
/// back on every status query.
#[derive(Debug, Serialize)]
pub struct SolutionView {
    pub solution_id: Uuid,
    pub kind: SolutionKind,
    pub status: SolutionStatus,
    pub test_output: Option<String>,
    pub return_code: Option<i32>,
    pub check_status_location: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Solution> for SolutionView {
    fn from(solution: &Solution) -> Self {
        Self {
            solution_id: solution.id,
            kind: solution.kind,
            status: solution.status,
            test_output: solution.test_output.clone(),
            return_code: solution.return_code,
            check_status_location: solution.check_status_location.clone(),
            created_at: solution.created_at,
            updated_at: solution.updated_at,
        }
    }
}

fn error_body(message: impl Into<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": message.into() }))
}

/// POST /solutions - Submit a solution for grading
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    let kind = payload.kind;
    let new = NewSolution {
        student_id: payload.student_id,
        task_id: payload.task_id,
        kind,
        gradable: payload.gradable,
        code: payload.code,
        file: payload.file,
        url: payload.url,
    };

    match submit_solution(state.repo.as_ref(), state.queue.as_ref(), new).await {
        Ok(solution) => {
            metrics::SOLUTIONS_SUBMITTED
                .with_label_values(&[kind.as_str(), solution.status.as_str()])
                .inc();
            info!(
                solution_id = %solution.id,
                kind = %kind,
                status = %solution.status,
                "Solution accepted"
            );
            (StatusCode::CREATED, Json(SolutionView::from(&solution))).into_response()
        }
        Err(GradingError::Validation(message)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, error_body(message)).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to accept solution");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())).into_response()
        }
    }
}

/// GET /solutions/{kind}/{id} - Query a solution's grading state
pub async fn get_solution(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(SolutionKind, Uuid)>,
) -> Response {
    match state.repo.get(kind, id).await {
        Ok(Some(solution)) => {
            (StatusCode::OK, Json(SolutionView::from(&solution))).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, error_body("no such solution")).into_response(),
        Err(e) => {
            error!(solution_id = %id, error = %e, "Failed to load solution");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())).into_response()
        }
    }
}

/// POST /solutions/{kind}/{id}/resubmit - Reset to pending and re-grade
pub async fn resubmit(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(SolutionKind, Uuid)>,
) -> Response {
    match resubmit_solution(state.repo.as_ref(), state.queue.as_ref(), kind, id).await {
        Ok(solution) => {
            metrics::SOLUTIONS_RESUBMITTED
                .with_label_values(&[kind.as_str()])
                .inc();
            (StatusCode::OK, Json(SolutionView::from(&solution))).into_response()
        }
        // The only validation failure here is an unknown id.
        Err(GradingError::Validation(message)) => {
            (StatusCode::NOT_FOUND, error_body(message)).into_response()
        }
        Err(e) => {
            error!(solution_id = %id, error = %e, "Failed to re-submit solution");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())).into_response()
        }
    }
}

/// Push-style grader callback, keyed on (tracking handle, kind).
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub tracking_handle: String,
    pub kind: SolutionKind,
    pub outcome: GradingOutcome,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub return_code: Option<i32>,
}

fn disposition_label(disposition: ReportDisposition) -> &'static str {
    match disposition {
        ReportDisposition::Applied(_) => "applied",
        ReportDisposition::AlreadyTerminal => "already_terminal",
        ReportDisposition::StillRunning => "still_running",
        ReportDisposition::Unknown => "unknown_handle",
        ReportDisposition::Superseded => "superseded",
    }
}

/// POST /grader/report - Callback receiver for asynchronous grades
///
/// Duplicate and unknown-handle deliveries answer 200: the grader only
/// needs to know the message was consumed.
pub async fn grader_report(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReportRequest>,
) -> Response {
    let result = GradingResult {
        outcome: payload.outcome,
        output: payload.output,
        return_code: payload.return_code,
        tracking_handle: Some(payload.tracking_handle.clone()),
    };

    match report(
        state.repo.as_ref(),
        state.notifier.as_ref(),
        payload.kind,
        &payload.tracking_handle,
        &result,
    )
    .await
    {
        Ok(disposition) => {
            let label = disposition_label(disposition);
            metrics::GRADER_REPORTS
                .with_label_values(&[payload.kind.as_str(), label])
                .inc();
            (
                StatusCode::OK,
                Json(serde_json::json!({ "disposition": label })),
            )
                .into_response()
        }
        Err(GradingError::IllegalTransition { from, to }) => (
            StatusCode::CONFLICT,
            error_body(format!("illegal transition {} -> {}", from, to)),
        )
            .into_response(),
        Err(e) => {
            error!(
                tracking_handle = %payload.tracking_handle,
                error = %e,
                "Failed to apply grader report"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())).into_response()
        }
    }
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradely_common::notify::LogNotifier;
    use gradely_common::queue::MemoryTaskQueue;
    use gradely_common::repo::MemorySolutionRepository;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            repo: Arc::new(MemorySolutionRepository::new()),
            queue: Arc::new(MemoryTaskQueue::new()),
            notifier: Arc::new(LogNotifier),
        })
    }

    fn code_submission(code: &str) -> SubmitRequest {
        SubmitRequest {
            student_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            kind: SolutionKind::Education,
            gradable: true,
            code: Some(code.to_string()),
            file: None,
            url: None,
        }
    }

    #[tokio::test]
    async fn test_submit_accepts_a_single_payload_field() {
        let state = test_state();
        let response = submit(State(state), Json(code_submission("print(1)")))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_submit_rejects_ambiguous_payload() {
        let state = test_state();
        let mut request = code_submission("print(1)");
        request.url = Some("http://example.com".to_string());

        let response = submit(State(state), Json(request)).await.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_get_unknown_solution_is_404() {
        let state = test_state();
        let response = get_solution(
            State(state),
            Path((SolutionKind::Education, Uuid::new_v4())),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_report_with_unknown_handle_is_consumed() {
        let state = test_state();
        let response = grader_report(
            State(state),
            Json(ReportRequest {
                tracking_handle: "check/nope".to_string(),
                kind: SolutionKind::Education,
                outcome: GradingOutcome::Ok,
                output: Some("1".to_string()),
                return_code: Some(0),
            }),
        )
        .await
        .into_response();
        // Unknown handles are logged and dropped, never an error.
        assert_eq!(response.status(), StatusCode::OK);
    }
}
