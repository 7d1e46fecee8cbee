use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{Config, DEFAULT_BASE_URL};
use crate::domains::agent::AgentReference;
use crate::error::{Result, WorkbenchError};
use crate::interfaces::agent_stream::AgentStream;
use crate::providers::sse::data_events;
use crate::provisioning::AgentBlueprint;

const ASSISTANT_MESSAGE: &str = "assistant_message";
const STREAM_DONE: &str = "[DONE]";

/// HTTP client for a Letta deployment. Cheap to clone.
#[derive(Clone)]
pub struct LettaClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct CreatedAgent {
    id: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<Value>,
}

impl LettaClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url,
        }
    }

    /// `None` when no credential is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .api_key()
            .map(|key| Self::new(key, Some(config.base_url().to_string())))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn create_agent(&self, blueprint: &AgentBlueprint) -> Result<AgentReference> {
        let response = self
            .http
            .post(self.url("/v1/agents/"))
            .bearer_auth(&self.api_key)
            .json(blueprint)
            .send()
            .await
            .map_err(|e| {
                WorkbenchError::Http(format!("Letta agent creation failed: {}", e.without_url()))
            })?;
        let response = ensure_success(response).await?;
        let created: CreatedAgent = response.json().await.map_err(|e| {
            WorkbenchError::Serialization(format!("Letta agent response decode failed: {e}"))
        })?;
        AgentReference::new(&created.id).ok_or_else(|| {
            WorkbenchError::Serialization("Letta returned an empty agent id".to_string())
        })
    }

    /// Non-streaming round trip; returns the raw message list.
    pub async fn send_message(&self, agent: &AgentReference, text: &str) -> Result<Vec<Value>> {
        let response = self
            .http
            .post(self.url(&format!("/v1/agents/{agent}/messages")))
            .bearer_auth(&self.api_key)
            .json(&user_message_body(text, false))
            .send()
            .await
            .map_err(|e| {
                WorkbenchError::Http(format!("Letta message transport failed: {}", e.without_url()))
            })?;
        let response = ensure_success(response).await?;
        let body: MessagesResponse = response.json().await.map_err(|e| {
            WorkbenchError::Serialization(format!("Letta message response decode failed: {e}"))
        })?;
        Ok(body.messages)
    }
}

impl AgentStream for LettaClient {
    fn stream_prompt(
        &self,
        agent: &AgentReference,
        prompt: &str,
    ) -> BoxStream<'static, Result<String>> {
        let client = self.clone();
        let url = self.url(&format!("/v1/agents/{agent}/messages/stream"));
        let body = user_message_body(prompt, true);

        Box::pin(try_stream! {
            let response = client
                .http
                .post(url)
                .bearer_auth(&client.api_key)
                .header(ACCEPT, "text/event-stream")
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    WorkbenchError::Http(format!("Letta stream transport failed: {}", e.without_url()))
                })?;
            let response = ensure_success(response).await?;

            let bytes = response.bytes_stream().map(|item| item.map_err(reqwest::Error::without_url));
            let mut events = Box::pin(data_events(Box::pin(bytes)));
            while let Some(event) = events.next().await {
                let payload = event?;
                if payload.trim() == STREAM_DONE {
                    break;
                }
                if let Some(text) = assistant_delta(&payload)? {
                    if !text.is_empty() {
                        yield text;
                    }
                }
            }
        })
    }
}

fn user_message_body(text: &str, stream_tokens: bool) -> Value {
    let mut body = json!({
        "messages": [{"role": "user", "content": text}],
    });
    if stream_tokens {
        body["stream_tokens"] = Value::Bool(true);
    }
    body
}

/// Non-2xx responses become `Upstream` errors so the relay can classify
/// them by status.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());
    Err(WorkbenchError::Upstream {
        status: status.as_u16(),
        body,
    })
}

fn assistant_delta(payload: &str) -> Result<Option<String>> {
    let value: Value = serde_json::from_str(payload).map_err(|e| {
        WorkbenchError::Serialization(format!("Letta stream event decode failed: {e}"))
    })?;
    if let Some(error) = value.get("error") {
        return Err(WorkbenchError::Http(format!("Letta stream error: {error}")));
    }
    match value.get("message_type").and_then(Value::as_str) {
        Some(ASSISTANT_MESSAGE) => Ok(message_text(&value)),
        Some("error_message") => Err(WorkbenchError::Http(format!(
            "Letta stream error: {}",
            message_text(&value).unwrap_or_else(|| value.to_string())
        ))),
        _ => Ok(None),
    }
}

/// Content is either a plain string or a list of `{type, text}` parts.
fn message_text(message: &Value) -> Option<String> {
    match message.get("content")? {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => Some(
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect(),
        ),
        _ => None,
    }
}

pub fn first_assistant_text(messages: &[Value]) -> Option<String> {
    messages
        .iter()
        .filter(|message| {
            message.get("message_type").and_then(Value::as_str) == Some(ASSISTANT_MESSAGE)
        })
        .find_map(message_text)
}
