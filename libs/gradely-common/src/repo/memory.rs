use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::GradingError;
use crate::status::SolutionStatus;
use crate::types::{Solution, SolutionKind};

use super::{apply_update, SolutionRepository, StatusUpdate};

#[derive(Default)]
struct Inner {
    solutions: HashMap<(SolutionKind, Uuid), Solution>,
    tracking: HashMap<(SolutionKind, String), Uuid>,
}

/// In-memory solution repository.
///
/// Single-process stand-in for the Redis repository, used by tests and
/// single-node demos. The mutex makes every compare-and-set a true atomic
/// read-modify-write, matching the Lua script's semantics.
#[derive(Default)]
pub struct MemorySolutionRepository {
    inner: Mutex<Inner>,
}

impl MemorySolutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, GradingError> {
        self.inner
            .lock()
            .map_err(|_| GradingError::Storage("repository lock poisoned".to_string()))
    }
}

#[async_trait]
impl SolutionRepository for MemorySolutionRepository {
    async fn create(&self, solution: &Solution) -> Result<(), GradingError> {
        let mut inner = self.lock()?;
        let key = (solution.kind, solution.id);
        if inner.solutions.contains_key(&key) {
            return Err(GradingError::Storage(format!(
                "solution {} already exists",
                solution.id
            )));
        }
        inner.solutions.insert(key, solution.clone());
        Ok(())
    }

    async fn get(
        &self,
        kind: SolutionKind,
        id: Uuid,
    ) -> Result<Option<Solution>, GradingError> {
        let inner = self.lock()?;
        Ok(inner.solutions.get(&(kind, id)).cloned())
    }

    async fn compare_and_set(
        &self,
        kind: SolutionKind,
        id: Uuid,
        expected: SolutionStatus,
        new_status: SolutionStatus,
        update: StatusUpdate,
    ) -> Result<bool, GradingError> {
        let mut inner = self.lock()?;

        let old_handle = match inner.solutions.get(&(kind, id)) {
            Some(solution) if solution.status == expected => {
                solution.check_status_location.clone()
            }
            _ => return Ok(false),
        };

        if let Some(handle) = &update.tracking_handle {
            inner.tracking.insert((kind, handle.clone()), id);
        }
        if update.clear_results {
            if let Some(handle) = old_handle {
                inner.tracking.remove(&(kind, handle));
            }
        }

        let solution = inner
            .solutions
            .get_mut(&(kind, id))
            .ok_or_else(|| GradingError::Storage("solution vanished mid-update".to_string()))?;
        apply_update(solution, new_status, &update);
        Ok(true)
    }

    async fn find_by_tracking_handle(
        &self,
        kind: SolutionKind,
        handle: &str,
    ) -> Result<Option<Solution>, GradingError> {
        let inner = self.lock()?;
        let id = match inner.tracking.get(&(kind, handle.to_string())) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(inner.solutions.get(&(kind, id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SolutionPayload;

    fn pending_solution() -> Solution {
        Solution::gradable(
            Uuid::new_v4(),
            Uuid::new_v4(),
            SolutionKind::Education,
            SolutionPayload::Code("print(1)".to_string()),
        )
    }

    #[tokio::test]
    async fn test_compare_and_set_applies_fields_atomically() {
        let repo = MemorySolutionRepository::new();
        let solution = pending_solution();
        repo.create(&solution).await.unwrap();

        let applied = repo
            .compare_and_set(
                solution.kind,
                solution.id,
                SolutionStatus::Pending,
                SolutionStatus::Ok,
                StatusUpdate::verdict(Some("1".to_string()), Some(0)),
            )
            .await
            .unwrap();
        assert!(applied);

        let stored = repo.get(solution.kind, solution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SolutionStatus::Ok);
        assert_eq!(stored.test_output.as_deref(), Some("1"));
        assert_eq!(stored.return_code, Some(0));
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_expectation() {
        let repo = MemorySolutionRepository::new();
        let solution = pending_solution();
        repo.create(&solution).await.unwrap();

        repo.compare_and_set(
            solution.kind,
            solution.id,
            SolutionStatus::Pending,
            SolutionStatus::Ok,
            StatusUpdate::verdict(Some("1".to_string()), Some(0)),
        )
        .await
        .unwrap();

        // Late writer still believes the solution is pending.
        let applied = repo
            .compare_and_set(
                solution.kind,
                solution.id,
                SolutionStatus::Pending,
                SolutionStatus::NotOk,
                StatusUpdate::verdict(Some("boom".to_string()), Some(1)),
            )
            .await
            .unwrap();
        assert!(!applied);

        let stored = repo.get(solution.kind, solution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SolutionStatus::Ok);
        assert_eq!(stored.test_output.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_tracking_index_follows_handle_lifecycle() {
        let repo = MemorySolutionRepository::new();
        let solution = pending_solution();
        repo.create(&solution).await.unwrap();

        repo.compare_and_set(
            solution.kind,
            solution.id,
            SolutionStatus::Pending,
            SolutionStatus::Running,
            StatusUpdate::tracking("grader/42".to_string()),
        )
        .await
        .unwrap();

        let found = repo
            .find_by_tracking_handle(solution.kind, "grader/42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, solution.id);
        assert_eq!(found.check_status_location.as_deref(), Some("grader/42"));

        // Re-submission clears the handle and its index entry.
        repo.compare_and_set(
            solution.kind,
            solution.id,
            SolutionStatus::Running,
            SolutionStatus::Pending,
            StatusUpdate::reset(),
        )
        .await
        .unwrap();

        assert!(repo
            .find_by_tracking_handle(solution.kind, "grader/42")
            .await
            .unwrap()
            .is_none());
        let stored = repo.get(solution.kind, solution.id).await.unwrap().unwrap();
        assert!(stored.check_status_location.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let repo = MemorySolutionRepository::new();
        let solution = pending_solution();
        repo.create(&solution).await.unwrap();
        assert!(matches!(
            repo.create(&solution).await,
            Err(GradingError::Storage(_))
        ));
    }
}
