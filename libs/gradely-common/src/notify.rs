use async_trait::async_trait;
use tracing::info;

use crate::error::GradingError;
use crate::types::Solution;

/// Learner-facing notification seam, fired when a solution reaches a
/// graded terminal state. A failing sink must never roll back the state
/// transition that triggered it; callers log and move on.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_graded(&self, solution: &Solution) -> Result<(), GradingError>;
}

/// Default sink: a structured log line. Mail/push integrations live
/// outside this subsystem and plug in through the trait.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify_graded(&self, solution: &Solution) -> Result<(), GradingError> {
        info!(
            solution_id = %solution.id,
            student_id = %solution.student_id,
            status = %solution.status,
            "Solution graded"
        );
        Ok(())
    }
}
