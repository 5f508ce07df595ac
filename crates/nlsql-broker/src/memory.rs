use async_trait::async_trait;
use dashmap::DashMap;
use nlsql_model::TaskId;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};
use crate::{Task, TaskBroker};

type Queue = (mpsc::UnboundedSender<Task>, Mutex<mpsc::UnboundedReceiver<Task>>);

/// Single-process queue, one `tokio::sync::mpsc` channel per task name,
/// created lazily on first use. Delivery is exactly-once within the
/// process and lost on crash; durable delivery is what [`RedisBroker`]
/// documents but does not implement.
///
/// [`RedisBroker`]: crate::RedisBroker
#[derive(Default)]
pub struct InMemoryBroker {
    queues: DashMap<String, Queue>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, task_name: &str) -> mpsc::UnboundedSender<Task> {
        self.queues
            .entry(task_name.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                (tx, Mutex::new(rx))
            })
            .0
            .clone()
    }
}

#[async_trait]
impl TaskBroker for InMemoryBroker {
    async fn enqueue(&self, task_name: &str, payload: Value, task_id: TaskId) -> Result<()> {
        let sender = self.sender(task_name);
        sender
            .send(Task {
                task_id,
                task_name: task_name.to_string(),
                payload,
            })
            .map_err(|_| Error::QueueClosed(task_name.to_string()))
    }

    async fn consume(&self, task_name: &str) -> Result<Task> {
        self.sender(task_name); // ensure the queue exists before locking its receiver
        let entry = self
            .queues
            .get(task_name)
            .ok_or_else(|| Error::QueueClosed(task_name.to_string()))?;
        let mut receiver = entry.1.lock().await;
        receiver
            .recv()
            .await
            .ok_or_else(|| Error::QueueClosed(task_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn enqueued_task_is_consumed_in_order() {
        let broker = InMemoryBroker::new();
        broker
            .enqueue("interactive", json!({"n": 1}), TaskId::new())
            .await
            .unwrap();
        broker
            .enqueue("interactive", json!({"n": 2}), TaskId::new())
            .await
            .unwrap();

        let first = broker.consume("interactive").await.unwrap();
        let second = broker.consume("interactive").await.unwrap();
        assert_eq!(first.payload["n"], 1);
        assert_eq!(second.payload["n"], 2);
    }

    #[tokio::test]
    async fn distinct_task_names_do_not_interfere() {
        let broker = InMemoryBroker::new();
        broker
            .enqueue("a", json!("x"), TaskId::new())
            .await
            .unwrap();
        broker
            .enqueue("b", json!("y"), TaskId::new())
            .await
            .unwrap();
        assert_eq!(broker.consume("b").await.unwrap().payload, json!("y"));
        assert_eq!(broker.consume("a").await.unwrap().payload, json!("x"));
    }
}
