//! Solution persistence.
//!
//! The repository owns the one mutable piece of shared state: the status
//! field. Every status write is a compare-and-set against the currently
//! persisted status, so a late poll result and a fresh re-submission can
//! never interleave into a corrupt final state. Status-transition legality
//! itself is the state machine's job ([`crate::status::check_transition`]);
//! the repository only guarantees atomicity.

mod memory;
mod redis;

pub use self::memory::MemorySolutionRepository;
pub use self::redis::RedisSolutionRepository;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::GradingError;
use crate::status::SolutionStatus;
use crate::types::{Solution, SolutionKind};

/// Fields written together with a status transition.
///
/// Transitions into `running` or a terminal state persist output, return
/// code and tracking handle atomically with the status itself; a
/// re-submission clears all three.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub test_output: Option<String>,
    pub return_code: Option<i32>,
    pub tracking_handle: Option<String>,
    pub clear_results: bool,
}

impl StatusUpdate {
    /// Status-only transition.
    pub fn none() -> Self {
        Self::default()
    }

    /// Terminal verdict from the grader.
    pub fn verdict(test_output: Option<String>, return_code: Option<i32>) -> Self {
        Self {
            test_output,
            return_code,
            ..Self::default()
        }
    }

    /// Asynchronous acknowledgement: remember where to poll.
    pub fn tracking(handle: String) -> Self {
        Self {
            tracking_handle: Some(handle),
            ..Self::default()
        }
    }

    /// Re-submission: wipe the previous grading cycle's artifacts.
    pub fn reset() -> Self {
        Self {
            clear_results: true,
            ..Self::default()
        }
    }
}

/// Apply an update to an in-memory copy of a solution. Shared by both
/// repository implementations so their write semantics cannot drift.
pub(crate) fn apply_update(
    solution: &mut Solution,
    new_status: SolutionStatus,
    update: &StatusUpdate,
) {
    solution.status = new_status;
    if update.clear_results {
        solution.test_output = None;
        solution.return_code = None;
        solution.check_status_location = None;
    }
    if let Some(output) = &update.test_output {
        solution.test_output = Some(output.clone());
    }
    if let Some(return_code) = update.return_code {
        solution.return_code = Some(return_code);
    }
    if let Some(handle) = &update.tracking_handle {
        solution.check_status_location = Some(handle.clone());
    }
    solution.updated_at = Utc::now();
}

/// Persistent store for solutions, with atomic read-modify-write on status.
#[async_trait]
pub trait SolutionRepository: Send + Sync {
    async fn create(&self, solution: &Solution) -> Result<(), GradingError>;

    async fn get(&self, kind: SolutionKind, id: Uuid)
        -> Result<Option<Solution>, GradingError>;

    /// Atomically move `id` from `expected` to `new_status`, applying
    /// `update` in the same write. Returns `false` without touching
    /// anything when the persisted status no longer equals `expected`.
    async fn compare_and_set(
        &self,
        kind: SolutionKind,
        id: Uuid,
        expected: SolutionStatus,
        new_status: SolutionStatus,
        update: StatusUpdate,
    ) -> Result<bool, GradingError>;

    /// Resolve a grader tracking handle back to its solution.
    async fn find_by_tracking_handle(
        &self,
        kind: SolutionKind,
        handle: &str,
    ) -> Result<Option<Solution>, GradingError>;
}
