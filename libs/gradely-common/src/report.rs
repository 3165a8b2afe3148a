//! Shared result-application path for the status poller and the callback
//! receiver. The external grader may redeliver results, deliver them out
//! of order, or deliver them long after the solution moved on; all of
//! those land here and must leave persisted state consistent.

use tracing::{debug, info, warn};

use crate::error::GradingError;
use crate::notify::NotificationSink;
use crate::repo::{SolutionRepository, StatusUpdate};
use crate::status::{check_transition, SolutionStatus};
use crate::types::{GradingOutcome, GradingResult, SolutionKind};

/// What happened to a reported result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDisposition {
    /// Transition applied and persisted.
    Applied(SolutionStatus),
    /// Solution already sat in a terminal state; result dropped.
    AlreadyTerminal,
    /// Grader says it is still running; nothing to persist.
    StillRunning,
    /// Tracking handle resolved to nothing; result dropped.
    Unknown,
    /// A concurrent transition (typically a re-submission) won the
    /// status CAS; result dropped.
    Superseded,
}

/// Apply a grader result delivered for `tracking_handle`.
///
/// Duplicate delivery of the same terminal result is a no-op, never an
/// error to the caller. An unknown handle is logged and dropped: results
/// may legitimately arrive after the solution window has moved on.
pub async fn report(
    repo: &dyn SolutionRepository,
    notifier: &dyn NotificationSink,
    kind: SolutionKind,
    tracking_handle: &str,
    result: &GradingResult,
) -> Result<ReportDisposition, GradingError> {
    let solution = match repo.find_by_tracking_handle(kind, tracking_handle).await? {
        Some(solution) => solution,
        None => {
            warn!(
                kind = %kind,
                tracking_handle = %tracking_handle,
                "Grading result for unknown tracking handle, dropping"
            );
            return Ok(ReportDisposition::Unknown);
        }
    };

    let target = match result.outcome {
        GradingOutcome::Ok => SolutionStatus::Ok,
        GradingOutcome::NotOk => SolutionStatus::NotOk,
        GradingOutcome::Running => {
            debug!(solution_id = %solution.id, "Grader still running, nothing to apply");
            return Ok(ReportDisposition::StillRunning);
        }
    };

    if solution.status.is_terminal() {
        if solution.status == target {
            debug!(
                solution_id = %solution.id,
                status = %solution.status,
                "Duplicate terminal delivery, dropping"
            );
        } else {
            warn!(
                solution_id = %solution.id,
                persisted = %solution.status,
                reported = %target,
                "Conflicting result for already-terminal solution, dropping"
            );
        }
        return Ok(ReportDisposition::AlreadyTerminal);
    }

    check_transition(solution.status, target)?;

    let applied = repo
        .compare_and_set(
            kind,
            solution.id,
            solution.status,
            target,
            StatusUpdate::verdict(result.output.clone(), result.return_code),
        )
        .await?;

    if !applied {
        // Someone got there first; re-read to classify the race.
        let now = repo.get(kind, solution.id).await?;
        if matches!(&now, Some(s) if s.status.is_terminal()) {
            return Ok(ReportDisposition::AlreadyTerminal);
        }
        warn!(
            solution_id = %solution.id,
            status = ?now.map(|s| s.status),
            "Concurrent transition won while applying result, dropping"
        );
        return Ok(ReportDisposition::Superseded);
    }

    info!(
        solution_id = %solution.id,
        kind = %kind,
        status = %target,
        return_code = ?result.return_code,
        "Grading result applied"
    );

    if let Some(updated) = repo.get(kind, solution.id).await? {
        // Notification failures never roll back the transition.
        if let Err(e) = notifier.notify_graded(&updated).await {
            warn!(solution_id = %updated.id, error = %e, "Notification sink failed");
        }
    }

    Ok(ReportDisposition::Applied(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::repo::MemorySolutionRepository;
    use crate::types::{Solution, SolutionPayload};
    use uuid::Uuid;

    async fn running_solution(repo: &MemorySolutionRepository) -> Solution {
        let solution = Solution::gradable(
            Uuid::new_v4(),
            Uuid::new_v4(),
            SolutionKind::Education,
            SolutionPayload::Code("print(1)".to_string()),
        );
        repo.create(&solution).await.unwrap();
        repo.compare_and_set(
            solution.kind,
            solution.id,
            SolutionStatus::Pending,
            SolutionStatus::Running,
            StatusUpdate::tracking("grader/7".to_string()),
        )
        .await
        .unwrap();
        repo.get(solution.kind, solution.id).await.unwrap().unwrap()
    }

    fn ok_result() -> GradingResult {
        GradingResult {
            outcome: GradingOutcome::Ok,
            output: Some("1".to_string()),
            return_code: Some(0),
            tracking_handle: None,
        }
    }

    #[tokio::test]
    async fn test_terminal_result_is_applied() {
        let repo = MemorySolutionRepository::new();
        let solution = running_solution(&repo).await;

        let disposition = report(
            &repo,
            &LogNotifier,
            solution.kind,
            "grader/7",
            &ok_result(),
        )
        .await
        .unwrap();

        assert_eq!(disposition, ReportDisposition::Applied(SolutionStatus::Ok));
        let stored = repo.get(solution.kind, solution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SolutionStatus::Ok);
        assert_eq!(stored.test_output.as_deref(), Some("1"));
        assert_eq!(stored.return_code, Some(0));
    }

    #[tokio::test]
    async fn test_duplicate_terminal_delivery_is_a_noop() {
        let repo = MemorySolutionRepository::new();
        let solution = running_solution(&repo).await;

        report(&repo, &LogNotifier, solution.kind, "grader/7", &ok_result())
            .await
            .unwrap();
        let first = repo.get(solution.kind, solution.id).await.unwrap().unwrap();

        let disposition = report(
            &repo,
            &LogNotifier,
            solution.kind,
            "grader/7",
            &ok_result(),
        )
        .await
        .unwrap();

        assert_eq!(disposition, ReportDisposition::AlreadyTerminal);
        let second = repo.get(solution.kind, solution.id).await.unwrap().unwrap();
        assert_eq!(second.status, first.status);
        assert_eq!(second.test_output, first.test_output);
        assert_eq!(second.updated_at, first.updated_at);
    }

    #[tokio::test]
    async fn test_conflicting_result_after_terminal_is_dropped() {
        let repo = MemorySolutionRepository::new();
        let solution = running_solution(&repo).await;

        report(&repo, &LogNotifier, solution.kind, "grader/7", &ok_result())
            .await
            .unwrap();

        let not_ok = GradingResult {
            outcome: GradingOutcome::NotOk,
            output: Some("late failure".to_string()),
            return_code: Some(1),
            tracking_handle: None,
        };
        let disposition = report(&repo, &LogNotifier, solution.kind, "grader/7", &not_ok)
            .await
            .unwrap();

        assert_eq!(disposition, ReportDisposition::AlreadyTerminal);
        let stored = repo.get(solution.kind, solution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SolutionStatus::Ok);
        assert_eq!(stored.test_output.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_stale_running_report_after_verdict_is_a_noop() {
        let repo = MemorySolutionRepository::new();
        let solution = running_solution(&repo).await;

        report(&repo, &LogNotifier, solution.kind, "grader/7", &ok_result())
            .await
            .unwrap();

        let still_running = GradingResult {
            outcome: GradingOutcome::Running,
            output: None,
            return_code: None,
            tracking_handle: Some("grader/7".to_string()),
        };
        let disposition = report(&repo, &LogNotifier, solution.kind, "grader/7", &still_running)
            .await
            .unwrap();

        assert_eq!(disposition, ReportDisposition::StillRunning);
        let stored = repo.get(solution.kind, solution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SolutionStatus::Ok);
    }

    /// Delegates to a memory repository but lets a re-submission win the
    /// status CAS right before the first verdict write.
    struct ResubmittingRepo {
        inner: MemorySolutionRepository,
        raced: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl SolutionRepository for ResubmittingRepo {
        async fn create(&self, solution: &Solution) -> Result<(), GradingError> {
            self.inner.create(solution).await
        }

        async fn get(
            &self,
            kind: SolutionKind,
            id: Uuid,
        ) -> Result<Option<Solution>, GradingError> {
            self.inner.get(kind, id).await
        }

        async fn compare_and_set(
            &self,
            kind: SolutionKind,
            id: Uuid,
            expected: SolutionStatus,
            new_status: SolutionStatus,
            update: StatusUpdate,
        ) -> Result<bool, GradingError> {
            if !self.raced.swap(true, std::sync::atomic::Ordering::SeqCst) {
                self.inner
                    .compare_and_set(
                        kind,
                        id,
                        SolutionStatus::Running,
                        SolutionStatus::Pending,
                        StatusUpdate::reset(),
                    )
                    .await?;
            }
            self.inner
                .compare_and_set(kind, id, expected, new_status, update)
                .await
        }

        async fn find_by_tracking_handle(
            &self,
            kind: SolutionKind,
            handle: &str,
        ) -> Result<Option<Solution>, GradingError> {
            self.inner.find_by_tracking_handle(kind, handle).await
        }
    }

    #[tokio::test]
    async fn test_result_losing_to_resubmission_is_dropped_not_errored() {
        let seeded = MemorySolutionRepository::new();
        let solution = running_solution(&seeded).await;
        let repo = ResubmittingRepo {
            inner: seeded,
            raced: std::sync::atomic::AtomicBool::new(false),
        };

        let disposition = report(&repo, &LogNotifier, solution.kind, "grader/7", &ok_result())
            .await
            .unwrap();

        assert_eq!(disposition, ReportDisposition::Superseded);
        let stored = repo.get(solution.kind, solution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SolutionStatus::Pending);
        assert!(stored.test_output.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tracking_handle_is_logged_and_dropped() {
        let repo = MemorySolutionRepository::new();

        let disposition = report(
            &repo,
            &LogNotifier,
            SolutionKind::Education,
            "grader/nope",
            &ok_result(),
        )
        .await
        .unwrap();

        assert_eq!(disposition, ReportDisposition::Unknown);
    }
}
