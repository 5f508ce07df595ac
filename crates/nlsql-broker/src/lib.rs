//! Task queue abstraction between `RequestStore::add_request` and a flow
//! worker pool. The trait's contract is at-least-once delivery with
//! client-chosen task ids; handlers are expected to be idempotent on
//! `(request_id, target_status)` so a redelivered task is a no-op rather
//! than a double-apply.

pub mod error;
mod memory;
mod redis;

use async_trait::async_trait;
use nlsql_model::TaskId;
use serde_json::Value;

pub use error::{Error, Result};
pub use memory::InMemoryBroker;
pub use redis::RedisBroker;

/// One unit of dispatchable work: a named task type plus a JSON payload
/// (typically a `WorkerRequest`).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub task_name: String,
    pub payload: Value,
}

#[async_trait]
pub trait TaskBroker: Send + Sync {
    async fn enqueue(&self, task_name: &str, payload: Value, task_id: TaskId) -> Result<()>;

    /// Blocks until a task for `task_name` is available.
    async fn consume(&self, task_name: &str) -> Result<Task>;
}
