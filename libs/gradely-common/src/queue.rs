use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};

use crate::error::GradingError;
use crate::types::{DispatchTask, PollTask, SolutionKind};

/// Redis queue semantics - defines only semantics, not runtime logic.
/// Ensures API and worker never drift and queue keys stay deterministic:
/// one dispatch queue and one poll queue per solution kind, so workers
/// scale per kind.

pub const DISPATCH_PREFIX: &str = "gradely:dispatch";
pub const POLL_PREFIX: &str = "gradely:poll";
pub const SOLUTION_PREFIX: &str = "gradely:solution";
pub const TRACKING_PREFIX: &str = "gradely:track";

/// Generate deterministic dispatch queue name for a solution kind
pub fn dispatch_queue(kind: SolutionKind) -> String {
    format!("{}:{}", DISPATCH_PREFIX, kind)
}

/// Generate deterministic poll queue name for a solution kind
pub fn poll_queue(kind: SolutionKind) -> String {
    format!("{}:{}", POLL_PREFIX, kind)
}

/// Storage key for a solution record
pub fn solution_key(kind: SolutionKind, id: &uuid::Uuid) -> String {
    format!("{}:{}:{}", SOLUTION_PREFIX, kind, id)
}

/// Index key resolving a tracking handle back to a solution id
pub fn tracking_key(kind: SolutionKind, handle: &str) -> String {
    format!("{}:{}:{}", TRACKING_PREFIX, kind, handle)
}

fn to_payload<T: serde::Serialize>(value: &T) -> RedisResult<String> {
    serde_json::to_string(value).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "serialization error",
            e.to_string(),
        ))
    })
}

fn from_payload<T: serde::de::DeserializeOwned>(payload: &str) -> RedisResult<T> {
    serde_json::from_str(payload).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "deserialization error",
            e.to_string(),
        ))
    })
}

/// Push a dispatch task onto its kind's queue. Uses RPUSH for FIFO semantics.
pub async fn push_dispatch(
    conn: &mut redis::aio::ConnectionManager,
    task: &DispatchTask,
) -> RedisResult<()> {
    let queue = dispatch_queue(task.kind);
    let payload = to_payload(task)?;
    conn.rpush(&queue, payload).await
}

/// Pop a dispatch task. Uses BLPOP with timeout for graceful shutdown.
pub async fn pop_dispatch(
    conn: &mut redis::aio::ConnectionManager,
    kind: SolutionKind,
    timeout_seconds: f64,
) -> RedisResult<Option<DispatchTask>> {
    let queue = dispatch_queue(kind);
    let result: Option<(String, String)> = conn.blpop(&queue, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => Ok(Some(from_payload(&payload)?)),
        None => Ok(None),
    }
}

/// Push a poll task onto its kind's poll queue
pub async fn push_poll(
    conn: &mut redis::aio::ConnectionManager,
    task: &PollTask,
) -> RedisResult<()> {
    let queue = poll_queue(task.kind);
    let payload = to_payload(task)?;
    conn.rpush(&queue, payload).await
}

/// Pop a poll task. Uses BLPOP with timeout for graceful shutdown.
pub async fn pop_poll(
    conn: &mut redis::aio::ConnectionManager,
    kind: SolutionKind,
    timeout_seconds: f64,
) -> RedisResult<Option<PollTask>> {
    let queue = poll_queue(kind);
    let result: Option<(String, String)> = conn.blpop(&queue, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => Ok(Some(from_payload(&payload)?)),
        None => Ok(None),
    }
}

/// Task queue submission seam: fire-and-forget, at-least-once, no ordering
/// guarantee. The submission entrypoint and the dispatcher only see this
/// trait; production uses Redis, tests an in-memory queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue_dispatch(&self, task: &DispatchTask) -> Result<(), GradingError>;
    async fn enqueue_poll(&self, task: &PollTask) -> Result<(), GradingError>;
}

/// Redis-backed task queue
#[derive(Clone)]
pub struct RedisTaskQueue {
    conn: redis::aio::ConnectionManager,
}

impl RedisTaskQueue {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue_dispatch(&self, task: &DispatchTask) -> Result<(), GradingError> {
        let mut conn = self.conn.clone();
        push_dispatch(&mut conn, task).await?;
        Ok(())
    }

    async fn enqueue_poll(&self, task: &PollTask) -> Result<(), GradingError> {
        let mut conn = self.conn.clone();
        push_poll(&mut conn, task).await?;
        Ok(())
    }
}

/// In-memory task queue for tests and single-process demos
#[derive(Default)]
pub struct MemoryTaskQueue {
    dispatch: std::sync::Mutex<Vec<DispatchTask>>,
    poll: std::sync::Mutex<Vec<PollTask>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch_tasks(&self) -> Vec<DispatchTask> {
        self.dispatch.lock().expect("queue lock poisoned").clone()
    }

    pub fn poll_tasks(&self) -> Vec<PollTask> {
        self.poll.lock().expect("queue lock poisoned").clone()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue_dispatch(&self, task: &DispatchTask) -> Result<(), GradingError> {
        self.dispatch
            .lock()
            .map_err(|_| GradingError::Storage("queue lock poisoned".to_string()))?
            .push(task.clone());
        Ok(())
    }

    async fn enqueue_poll(&self, task: &PollTask) -> Result<(), GradingError> {
        self.poll
            .lock()
            .map_err(|_| GradingError::Storage("queue lock poisoned".to_string()))?
            .push(task.clone());
        Ok(())
    }
}
