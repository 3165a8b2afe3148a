/// Status Poller - Reconciling Asynchronous Grades
///
/// Consumes poll tasks scheduled by the dispatcher, asks the grader about
/// the tracking handle and feeds the answer through the shared report
/// path. Still-running answers and transport hiccups re-enqueue the task;
/// after the configured number of polls the grader is assumed to have lost
/// the job and the solution goes `missing`.

use std::sync::Arc;

use gradely_common::config::PollConfig;
use gradely_common::error::GradingError;
use gradely_common::notify::NotificationSink;
use gradely_common::queue::TaskQueue;
use gradely_common::repo::{SolutionRepository, StatusUpdate};
use gradely_common::report::{report, ReportDisposition};
use gradely_common::status::SolutionStatus;
use gradely_common::types::PollTask;
use tracing::{debug, error, info, warn};

use crate::client::GraderBackend;

/// How a single poll task execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A terminal result was applied (or found already applied).
    Settled,
    /// Still running or transport hiccup; task re-enqueued.
    Requeued,
    /// Solution gone or already past running; task dropped.
    Dropped,
    /// Poll budget exhausted; solution marked missing.
    GaveUp,
}

pub struct Poller {
    repo: Arc<dyn SolutionRepository>,
    queue: Arc<dyn TaskQueue>,
    backend: Arc<dyn GraderBackend>,
    notifier: Arc<dyn NotificationSink>,
    config: PollConfig,
}

impl Poller {
    pub fn new(
        repo: Arc<dyn SolutionRepository>,
        queue: Arc<dyn TaskQueue>,
        backend: Arc<dyn GraderBackend>,
        notifier: Arc<dyn NotificationSink>,
        config: PollConfig,
    ) -> Self {
        Self {
            repo,
            queue,
            backend,
            notifier,
            config,
        }
    }

    pub async fn handle(&self, task: PollTask) -> Result<PollOutcome, GradingError> {
        // A re-submission or callback may have moved the solution on while
        // this task sat in the queue.
        match self.repo.get(task.kind, task.solution_id).await? {
            Some(solution) if solution.status == SolutionStatus::Running => {}
            Some(solution) => {
                debug!(
                    solution_id = %task.solution_id,
                    status = %solution.status,
                    "Solution no longer running, dropping poll task"
                );
                return Ok(PollOutcome::Dropped);
            }
            None => {
                warn!(solution_id = %task.solution_id, "Poll task for unknown solution, dropping");
                return Ok(PollOutcome::Dropped);
            }
        }

        if task.polls >= self.config.max_polls {
            return self.give_up(&task).await;
        }

        match self.backend.poll(&task.tracking_handle, task.kind).await {
            Ok(result) => {
                let disposition = report(
                    self.repo.as_ref(),
                    self.notifier.as_ref(),
                    task.kind,
                    &task.tracking_handle,
                    &result,
                )
                .await?;
                match disposition {
                    ReportDisposition::StillRunning => Ok(self.requeue(task)),
                    ReportDisposition::Applied(status) => {
                        info!(
                            solution_id = %task.solution_id,
                            status = %status,
                            polls = task.polls + 1,
                            "Asynchronous grade settled"
                        );
                        Ok(PollOutcome::Settled)
                    }
                    ReportDisposition::AlreadyTerminal => Ok(PollOutcome::Settled),
                    ReportDisposition::Unknown | ReportDisposition::Superseded => {
                        Ok(PollOutcome::Dropped)
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    solution_id = %task.solution_id,
                    polls = task.polls + 1,
                    error = %e,
                    "Poll attempt failed"
                );
                Ok(self.requeue(task))
            }
            Err(e) => Err(e),
        }
    }

    /// Schedule the next poll after the configured interval. The delay
    /// runs on a spawned task so the consumer loop keeps draining other
    /// poll tasks in the meantime.
    fn requeue(&self, task: PollTask) -> PollOutcome {
        let queue = Arc::clone(&self.queue);
        let delay = self.config.interval;
        let next = PollTask {
            polls: task.polls + 1,
            ..task
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.enqueue_poll(&next).await {
                error!(
                    solution_id = %next.solution_id,
                    error = %e,
                    "Failed to re-enqueue poll task"
                );
            }
        });
        PollOutcome::Requeued
    }

    /// The grader lost the job: infrastructure outcome, not a verdict.
    async fn give_up(&self, task: &PollTask) -> Result<PollOutcome, GradingError> {
        error!(
            solution_id = %task.solution_id,
            kind = %task.kind,
            polls = task.polls,
            "Poll budget exhausted, marking solution missing"
        );

        let applied = self
            .repo
            .compare_and_set(
                task.kind,
                task.solution_id,
                SolutionStatus::Running,
                SolutionStatus::Missing,
                StatusUpdate::none(),
            )
            .await?;
        if !applied {
            // Lost to a late callback or re-submission; either way the
            // solution moved on without us.
            return Ok(PollOutcome::Dropped);
        }
        Ok(PollOutcome::GaveUp)
    }
}
