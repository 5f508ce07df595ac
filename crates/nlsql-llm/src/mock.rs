use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::{LLMClient, Message};

/// Scripted responses consumed in order, one per `complete`/
/// `complete_structured` call. Used by flow tests that need
/// deterministic, no-network LLM behavior — e.g. a retry scenario where
/// the first two calls return SQL that preflight rejects and the third
/// succeeds.
pub struct MockLLMClient {
    completions: Mutex<VecDeque<String>>,
    structured: Mutex<VecDeque<Value>>,
}

impl MockLLMClient {
    pub fn new() -> Self {
        Self {
            completions: Mutex::new(VecDeque::new()),
            structured: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_completions(completions: impl IntoIterator<Item = String>) -> Self {
        Self {
            completions: Mutex::new(completions.into_iter().collect()),
            structured: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_completion(&self, text: impl Into<String>) {
        self.completions.lock().push_back(text.into());
    }

    pub fn push_structured(&self, value: Value) {
        self.structured.lock().push_back(value);
    }
}

impl Default for MockLLMClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String> {
        self.completions
            .lock()
            .pop_front()
            .ok_or(Error::EmptyCompletion)
    }

    async fn complete_structured(
        &self,
        _messages: &[Message],
        _schema: &Value,
        _model_override: Option<&str>,
    ) -> Result<Value> {
        self.structured
            .lock()
            .pop_front()
            .ok_or(Error::EmptyCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completions_are_served_in_push_order() {
        let client = MockLLMClient::new();
        client.push_completion("first");
        client.push_completion("second");
        assert_eq!(client.complete(&[]).await.unwrap(), "first");
        assert_eq!(client.complete(&[]).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn empty_queue_is_an_error() {
        let client = MockLLMClient::new();
        assert!(client.complete(&[]).await.is_err());
    }
}
