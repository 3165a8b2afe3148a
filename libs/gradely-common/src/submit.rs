//! Submission entrypoint: validates the payload, persists the solution in
//! its initial status and enqueues the dispatch task for gradable ones.

use tracing::info;
use uuid::Uuid;

use crate::error::GradingError;
use crate::queue::TaskQueue;
use crate::repo::{SolutionRepository, StatusUpdate};
use crate::status::{check_transition, SolutionStatus};
use crate::types::{DispatchTask, FilePayload, Solution, SolutionKind, SolutionPayload};

/// Raw submission as it arrives at the boundary: the three payload fields
/// are still separate and mutually exclusive.
#[derive(Debug, Clone)]
pub struct NewSolution {
    pub student_id: Uuid,
    pub task_id: Uuid,
    pub kind: SolutionKind,
    pub gradable: bool,
    pub code: Option<String>,
    pub file: Option<FilePayload>,
    pub url: Option<String>,
}

/// Create a solution and, for gradable tasks, enqueue its dispatch task.
///
/// Non-gradable submissions are terminal immediately
/// (`submitted_without_grading`) and never reach the queue.
pub async fn submit_solution(
    repo: &dyn SolutionRepository,
    queue: &dyn TaskQueue,
    new: NewSolution,
) -> Result<Solution, GradingError> {
    let payload = SolutionPayload::from_parts(new.code, new.file, new.url)?;

    let solution = if new.gradable {
        Solution::gradable(new.student_id, new.task_id, new.kind, payload)
    } else {
        Solution::without_grading(new.student_id, new.task_id, new.kind, payload)
    };

    repo.create(&solution).await?;

    if new.gradable {
        queue
            .enqueue_dispatch(&DispatchTask {
                solution_id: solution.id,
                kind: solution.kind,
            })
            .await?;
    }

    info!(
        solution_id = %solution.id,
        kind = %solution.kind,
        status = %solution.status,
        gradable = new.gradable,
        "Solution submitted"
    );

    Ok(solution)
}

/// Explicit re-submission: reset any state back to `pending`, wipe the
/// previous cycle's output and tracking handle, enqueue a fresh dispatch.
pub async fn resubmit_solution(
    repo: &dyn SolutionRepository,
    queue: &dyn TaskQueue,
    kind: SolutionKind,
    id: Uuid,
) -> Result<Solution, GradingError> {
    // A dispatch or poll may race the reset; re-read and retry a couple of
    // times before giving up.
    for _ in 0..3 {
        let current = repo
            .get(kind, id)
            .await?
            .ok_or_else(|| GradingError::Validation(format!("no such solution: {}", id)))?;

        check_transition(current.status, SolutionStatus::Pending)?;

        let applied = repo
            .compare_and_set(
                kind,
                id,
                current.status,
                SolutionStatus::Pending,
                StatusUpdate::reset(),
            )
            .await?;
        if !applied {
            continue;
        }

        queue
            .enqueue_dispatch(&DispatchTask {
                solution_id: id,
                kind,
            })
            .await?;

        info!(solution_id = %id, kind = %kind, previous = %current.status, "Solution re-submitted");

        return repo
            .get(kind, id)
            .await?
            .ok_or_else(|| GradingError::Storage("solution vanished after reset".to_string()));
    }

    Err(GradingError::Storage(format!(
        "could not reset solution {} after repeated races",
        id
    )))
}
