use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::GradingError;
use crate::queue::{solution_key, tracking_key};
use crate::status::SolutionStatus;
use crate::types::{Solution, SolutionKind};

use super::{apply_update, SolutionRepository, StatusUpdate};

/// Guards the status compare inside Redis. The full record is rewritten in
/// one SET; the status field only ever changes together with its dependent
/// fields, so comparing status alone is a sufficient fence against
/// concurrent transitions. The tracking index is maintained in the same
/// script invocation.
const CAS_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local current = cjson.decode(raw)
if current['status'] ~= ARGV[1] then return 0 end
redis.call('SET', KEYS[1], ARGV[2])
if ARGV[3] == '1' then redis.call('SET', KEYS[2], ARGV[4]) end
if ARGV[5] == '1' then redis.call('DEL', KEYS[3]) end
return 1
"#;

/// Redis-backed solution repository.
///
/// Records are stored as JSON under `gradely:solution:{kind}:{id}`, with a
/// `gradely:track:{kind}:{handle}` index for callback resolution.
#[derive(Clone)]
pub struct RedisSolutionRepository {
    conn: redis::aio::ConnectionManager,
    cas: std::sync::Arc<redis::Script>,
}

impl RedisSolutionRepository {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self {
            conn,
            cas: std::sync::Arc::new(redis::Script::new(CAS_SCRIPT)),
        }
    }
}

#[async_trait]
impl SolutionRepository for RedisSolutionRepository {
    async fn create(&self, solution: &Solution) -> Result<(), GradingError> {
        let key = solution_key(solution.kind, &solution.id);
        let payload = serde_json::to_string(solution)?;
        let mut conn = self.conn.clone();
        let created: bool = conn.set_nx(&key, payload).await?;
        if !created {
            return Err(GradingError::Storage(format!(
                "solution {} already exists",
                solution.id
            )));
        }
        Ok(())
    }

    async fn get(
        &self,
        kind: SolutionKind,
        id: Uuid,
    ) -> Result<Option<Solution>, GradingError> {
        let key = solution_key(kind, &id);
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(&key).await?;
        match payload {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn compare_and_set(
        &self,
        kind: SolutionKind,
        id: Uuid,
        expected: SolutionStatus,
        new_status: SolutionStatus,
        update: StatusUpdate,
    ) -> Result<bool, GradingError> {
        let key = solution_key(kind, &id);

        // Optimistic read; the script re-checks the status before writing.
        let current = match self.get(kind, id).await? {
            Some(solution) => solution,
            None => return Ok(false),
        };
        if current.status != expected {
            return Ok(false);
        }

        let mut updated = current.clone();
        apply_update(&mut updated, new_status, &update);
        let payload = serde_json::to_string(&updated)?;

        // Index maintenance: a fresh handle is written, a cleared cycle
        // drops the old one. Unused key slots fall back to the record key
        // and are never touched because their flag argument is '0'.
        let (set_flag, set_key) = match &update.tracking_handle {
            Some(handle) => ("1", tracking_key(kind, handle)),
            None => ("0", key.clone()),
        };
        let (del_flag, del_key) = match (update.clear_results, &current.check_status_location) {
            (true, Some(old_handle)) => ("1", tracking_key(kind, old_handle)),
            _ => ("0", key.clone()),
        };

        let mut conn = self.conn.clone();
        let applied: i32 = self
            .cas
            .key(&key)
            .key(&set_key)
            .key(&del_key)
            .arg(expected.as_str())
            .arg(&payload)
            .arg(set_flag)
            .arg(id.to_string())
            .arg(del_flag)
            .invoke_async(&mut conn)
            .await?;

        Ok(applied == 1)
    }

    async fn find_by_tracking_handle(
        &self,
        kind: SolutionKind,
        handle: &str,
    ) -> Result<Option<Solution>, GradingError> {
        let key = tracking_key(kind, handle);
        let mut conn = self.conn.clone();
        let id: Option<String> = conn.get(&key).await?;
        match id {
            Some(id) => {
                let id = Uuid::parse_str(&id)
                    .map_err(|e| GradingError::Storage(format!("corrupt tracking index: {}", e)))?;
                self.get(kind, id).await
            }
            None => Ok(None),
        }
    }
}
