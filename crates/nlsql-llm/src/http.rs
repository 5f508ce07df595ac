use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::{LLMClient, Message, Role};

/// OpenAI-compatible chat-completions adapter. Folds nothing special for
/// system turns since this wire format already supports them natively;
/// other providers would reshape messages here instead.
pub struct HttpLLMClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpLLMClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn wire_role(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    async fn chat(&self, messages: &[Message], model: &str, response_format: Option<Value>) -> Result<String> {
        #[derive(Serialize)]
        struct WireMessage<'a> {
            role: &'static str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<WireMessage<'a>>,
            #[serde(skip_serializing_if = "Option::is_none")]
            response_format: Option<Value>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: Option<String>,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        let wire_messages = messages
            .iter()
            .map(|m| WireMessage {
                role: Self::wire_role(m.role),
                content: &m.content,
            })
            .collect();

        let body = ChatRequest {
            model,
            messages: wire_messages,
            response_format,
        };

        let response: ChatResponse = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(Error::EmptyCompletion)
    }
}

#[async_trait]
impl LLMClient for HttpLLMClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.chat(messages, &self.model, None).await
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &Value,
        model_override: Option<&str>,
    ) -> Result<Value> {
        let model = model_override.unwrap_or(&self.model);
        let response_format = serde_json::json!({
            "type": "json_schema",
            "json_schema": { "name": "structured_response", "schema": schema },
        });
        let text = self.chat(messages, model, Some(response_format)).await?;
        serde_json::from_str(&text).map_err(Error::SchemaMismatch)
    }
}
