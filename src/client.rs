use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::domains::message::ChatRequest;
use crate::error::{Result, WorkbenchError};
use crate::interfaces::transport::ChatTransport;

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3000";

/// Talks to a running relay over HTTP.
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.as_ref().trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn chat_url(&self) -> String {
        format!("{}/chat", self.base_url)
    }
}

#[async_trait]
impl ChatTransport for RelayClient {
    async fn open(&self, request: ChatRequest) -> Result<BoxStream<'static, Result<Bytes>>> {
        let response = self
            .http
            .post(self.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| WorkbenchError::Http(format!("relay unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(WorkbenchError::Http(format!(
                "Request failed ({status}): {body}"
            )));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| WorkbenchError::Http(format!("relay stream interrupted: {e}")))
            })
            .boxed())
    }
}
