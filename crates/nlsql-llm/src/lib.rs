//! LLM provider contract. Every flow depends on [`LLMClient`], never on a
//! specific provider's SDK; adapters fold provider-specific quirks (e.g.
//! collapsing system turns) behind `complete`/`complete_structured`.

pub mod error;
mod http;
mod mock;

use async_trait::async_trait;
use serde_json::Value;

pub use error::{Error, Result};
pub use http::HttpLLMClient;
pub use mock::MockLLMClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String>;

    /// Returns a JSON value the caller asserts conforms to `schema`; the
    /// adapter is responsible for whatever provider-side mechanism
    /// (function calling, JSON mode, a schema-in-prompt fallback) gets
    /// there, and fails with [`Error::SchemaMismatch`] if the provider's
    /// output can't be parsed into JSON at all.
    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &Value,
        model_override: Option<&str>,
    ) -> Result<Value>;
}
