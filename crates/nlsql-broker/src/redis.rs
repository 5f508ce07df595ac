//! Documents the wire contract a Redis-backed broker would use: one list
//! key per task name, `LPUSH` on enqueue, reliable dequeue via
//! `BRPOPLPUSH` into a per-consumer processing list so a crashed consumer
//! can have its in-flight task requeued. Not wired into any deployment or
//! test; `InMemoryBroker` is what every flow and HTTP handler runs
//! against today.

#[cfg(feature = "redis-broker")]
mod imp {
    use async_trait::async_trait;
    use nlsql_model::TaskId;
    use serde_json::Value;

    use crate::error::{Error, Result};
    use crate::{Task, TaskBroker};

    pub struct RedisBroker {
        client: redis::Client,
        /// Suffix applied to a task name's list key while a task is
        /// being processed; `BRPOPLPUSH <queue> <queue><suffix>` moves a
        /// task there atomically so it survives a consumer crash.
        processing_suffix: &'static str,
    }

    impl RedisBroker {
        pub fn new(client: redis::Client) -> Self {
            Self {
                client,
                processing_suffix: ":processing",
            }
        }

        fn queue_key(task_name: &str) -> String {
            format!("nlsql:tasks:{task_name}")
        }
    }

    #[async_trait]
    impl TaskBroker for RedisBroker {
        async fn enqueue(&self, task_name: &str, payload: Value, task_id: TaskId) -> Result<()> {
            let task = Task {
                task_id,
                task_name: task_name.to_string(),
                payload,
            };
            let encoded = serde_json::to_string(&task)?;
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| Error::QueueClosed(e.to_string()))?;
            redis::cmd("LPUSH")
                .arg(Self::queue_key(task_name))
                .arg(encoded)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| Error::QueueClosed(e.to_string()))
        }

        async fn consume(&self, task_name: &str) -> Result<Task> {
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| Error::QueueClosed(e.to_string()))?;
            let processing_key = format!("{}{}", Self::queue_key(task_name), self.processing_suffix);
            let encoded: String = redis::cmd("BRPOPLPUSH")
                .arg(Self::queue_key(task_name))
                .arg(&processing_key)
                .arg(0)
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::QueueClosed(e.to_string()))?;
            Ok(serde_json::from_str(&encoded)?)
        }
    }
}

#[cfg(feature = "redis-broker")]
pub use imp::RedisBroker;

#[cfg(not(feature = "redis-broker"))]
pub struct RedisBroker {
    _private: (),
}
