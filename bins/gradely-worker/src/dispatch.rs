/// Dispatch Task - Retry, Backoff and Time-Limit Enforcement
///
/// **Responsibility:**
/// Take a queued dispatch task from creation to either a persisted verdict,
/// a tracked asynchronous run, or the terminal `missing` status.
///
/// **Architecture:**
/// 1. Re-read the solution (queued work may be stale or redelivered)
/// 2. One GraderBackend call per attempt, raced against soft/hard limits
/// 3. Feed whatever comes back through the state machine via CAS
///
/// This module is the glue layer - it knows nothing about:
/// - How the grader is reached (client's job)
/// - How state is stored (repository's job)
///
/// Exhausted retries become `missing`, never `not_ok`: infrastructure
/// unavailability must not read as a failed submission.

use std::sync::Arc;

use gradely_common::config::DispatchConfig;
use gradely_common::error::GradingError;
use gradely_common::notify::NotificationSink;
use gradely_common::queue::TaskQueue;
use gradely_common::repo::{SolutionRepository, StatusUpdate};
use gradely_common::status::SolutionStatus;
use gradely_common::types::{
    DispatchTask, GradingOutcome, GradingRequest, GradingResult, PollTask, Solution,
};
use tracing::{error, info, warn};

use crate::client::GraderBackend;

/// How a single dispatch execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Terminal status persisted (`ok`, `not_ok` or `missing`).
    Completed(SolutionStatus),
    /// Grader acknowledged asynchronously; poll task enqueued.
    AwaitingPoll,
    /// Nothing to do: solution gone, already terminal, or already running.
    Skipped,
    /// A concurrent transition (typically a re-submission) won the CAS.
    Raced,
}

pub struct Dispatcher {
    repo: Arc<dyn SolutionRepository>,
    queue: Arc<dyn TaskQueue>,
    backend: Arc<dyn GraderBackend>,
    notifier: Arc<dyn NotificationSink>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        repo: Arc<dyn SolutionRepository>,
        queue: Arc<dyn TaskQueue>,
        backend: Arc<dyn GraderBackend>,
        notifier: Arc<dyn NotificationSink>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            repo,
            queue,
            backend,
            notifier,
            config,
        }
    }

    /// Execute one dispatch task. Safe under at-least-once delivery: a
    /// redelivered task finds the solution past `pending` and backs off.
    pub async fn dispatch(&self, task: &DispatchTask) -> Result<DispatchOutcome, GradingError> {
        let solution = match self.repo.get(task.kind, task.solution_id).await? {
            Some(solution) => solution,
            None => {
                warn!(
                    solution_id = %task.solution_id,
                    kind = %task.kind,
                    "Dispatch task for unknown solution, dropping"
                );
                return Ok(DispatchOutcome::Skipped);
            }
        };

        if solution.status.is_terminal() {
            info!(
                solution_id = %solution.id,
                status = %solution.status,
                "Solution already terminal, dispatch is a no-op"
            );
            return Ok(DispatchOutcome::Skipped);
        }
        if solution.status != SolutionStatus::Pending {
            // Already running: the poll loop owns it now.
            info!(
                solution_id = %solution.id,
                status = %solution.status,
                "Solution already dispatched, skipping"
            );
            return Ok(DispatchOutcome::Skipped);
        }

        let request = GradingRequest {
            solution_id: solution.id,
            solution_kind: solution.kind,
            payload: solution.payload.clone(),
        };

        for attempt in 1..=self.config.max_attempts {
            match self.attempt(&request, attempt).await {
                Ok(result) => return self.apply(&solution, result).await,
                Err(e) if e.is_retryable() => {
                    warn!(
                        solution_id = %solution.id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "Grading attempt failed"
                    );
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.backoff_for(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        self.give_up(&solution).await
    }

    /// Exponential backoff before the next attempt. The exponent is
    /// capped so an oversized attempt budget cannot overflow the
    /// multiplier.
    pub(crate) fn backoff_for(&self, attempt: u32) -> std::time::Duration {
        self.config.retry_backoff * 2u32.pow(attempt.saturating_sub(1).min(16))
    }

    /// One call against the backend, raced against the time limits. The
    /// soft limit only warns; the hard limit aborts and the aborted call
    /// counts as one failed attempt.
    async fn attempt(
        &self,
        request: &GradingRequest,
        attempt: u32,
    ) -> Result<GradingResult, GradingError> {
        let call = self.backend.submit(request);
        tokio::pin!(call);
        let soft = tokio::time::sleep(self.config.soft_time_limit);
        tokio::pin!(soft);
        let hard = tokio::time::sleep(self.config.hard_time_limit);
        tokio::pin!(hard);

        let mut soft_hit = false;
        loop {
            tokio::select! {
                result = &mut call => return result,
                _ = &mut soft, if !soft_hit => {
                    soft_hit = true;
                    warn!(
                        solution_id = %request.solution_id,
                        attempt,
                        soft_limit_secs = self.config.soft_time_limit.as_secs(),
                        "Soft time limit exceeded, attempt still in flight"
                    );
                }
                _ = &mut hard => {
                    return Err(GradingError::Timeout(self.config.hard_time_limit.as_secs()));
                }
            }
        }
    }

    async fn apply(
        &self,
        solution: &Solution,
        result: GradingResult,
    ) -> Result<DispatchOutcome, GradingError> {
        match result.outcome {
            GradingOutcome::Ok | GradingOutcome::NotOk => {
                let target = match result.outcome {
                    GradingOutcome::Ok => SolutionStatus::Ok,
                    _ => SolutionStatus::NotOk,
                };
                let applied = self
                    .repo
                    .compare_and_set(
                        solution.kind,
                        solution.id,
                        SolutionStatus::Pending,
                        target,
                        StatusUpdate::verdict(result.output, result.return_code),
                    )
                    .await?;
                if !applied {
                    warn!(solution_id = %solution.id, "Lost the verdict CAS, skipping");
                    return Ok(DispatchOutcome::Raced);
                }

                info!(
                    solution_id = %solution.id,
                    status = %target,
                    return_code = ?result.return_code,
                    "Synchronous verdict persisted"
                );

                if let Some(updated) = self.repo.get(solution.kind, solution.id).await? {
                    if let Err(e) = self.notifier.notify_graded(&updated).await {
                        warn!(solution_id = %solution.id, error = %e, "Notification sink failed");
                    }
                }
                Ok(DispatchOutcome::Completed(target))
            }
            GradingOutcome::Running => {
                let handle = result.tracking_handle.ok_or_else(|| {
                    GradingError::Transport(
                        "grader acknowledged without a tracking handle".to_string(),
                    )
                })?;

                let applied = self
                    .repo
                    .compare_and_set(
                        solution.kind,
                        solution.id,
                        SolutionStatus::Pending,
                        SolutionStatus::Running,
                        StatusUpdate::tracking(handle.clone()),
                    )
                    .await?;
                if !applied {
                    warn!(solution_id = %solution.id, "Lost the running CAS, skipping");
                    return Ok(DispatchOutcome::Raced);
                }

                self.queue
                    .enqueue_poll(&PollTask {
                        solution_id: solution.id,
                        kind: solution.kind,
                        tracking_handle: handle.clone(),
                        polls: 0,
                    })
                    .await?;

                info!(
                    solution_id = %solution.id,
                    tracking_handle = %handle,
                    "Grader acknowledged, polling scheduled"
                );
                Ok(DispatchOutcome::AwaitingPoll)
            }
        }
    }

    /// All attempts exhausted: the grading infrastructure is unreachable.
    async fn give_up(&self, solution: &Solution) -> Result<DispatchOutcome, GradingError> {
        error!(
            solution_id = %solution.id,
            kind = %solution.kind,
            attempts = self.config.max_attempts,
            "Grading backend unreachable, marking solution missing"
        );

        let applied = self
            .repo
            .compare_and_set(
                solution.kind,
                solution.id,
                SolutionStatus::Pending,
                SolutionStatus::Missing,
                StatusUpdate::none(),
            )
            .await?;
        if !applied {
            warn!(solution_id = %solution.id, "Lost the missing CAS, skipping");
            return Ok(DispatchOutcome::Raced);
        }
        Ok(DispatchOutcome::Completed(SolutionStatus::Missing))
    }
}
