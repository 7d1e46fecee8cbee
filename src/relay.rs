use std::future::Future;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Json, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures::StreamExt;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domains::agent::AgentReference;
use crate::domains::message::ChatRequest;
use crate::error::{
    RelayError, Result, WorkbenchError, AGENT_NOT_CONFIGURED, API_KEY_NOT_CONFIGURED,
    LAST_MESSAGE_NOT_USER, MESSAGES_REQUIRED,
};
use crate::interfaces::agent_stream::AgentStream;
use crate::providers::letta::LettaClient;

static X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Everything a request needs. Either half may be missing; the relay still
/// starts and answers every `/chat` with a 500 until it is configured.
#[derive(Clone, Default)]
pub struct AppState {
    pub agent: Option<Arc<dyn AgentStream>>,
    pub agent_ref: Option<AgentReference>,
}

impl AppState {
    pub fn new(agent: Option<Arc<dyn AgentStream>>, agent_ref: Option<AgentReference>) -> Self {
        Self { agent, agent_ref }
    }

    pub fn from_config(config: &Config) -> Self {
        let agent = LettaClient::from_config(config)
            .map(|client| Arc::new(client) as Arc<dyn AgentStream>);
        Self::new(agent, config.agent_reference())
    }

    pub fn is_configured(&self) -> bool {
        self.agent.is_some() && self.agent_ref.is_some()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    configured: bool,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::BUILD_VERSION,
        configured: state.is_configured(),
    })
}

/// Pulls the prompt out of a `/chat` body. Only the last message is used;
/// the remote agent keeps its own history.
pub fn last_user_prompt(body: &[u8]) -> std::result::Result<String, RelayError> {
    let request: ChatRequest = serde_json::from_slice(body)
        .map_err(|_| RelayError::InvalidRequest(MESSAGES_REQUIRED))?;
    let last = request
        .messages
        .last()
        .ok_or(RelayError::InvalidRequest(MESSAGES_REQUIRED))?;
    if last.role != "user" {
        return Err(RelayError::InvalidRequest(LAST_MESSAGE_NOT_USER));
    }
    Ok(last.content.clone())
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    let prompt = match last_user_prompt(&body) {
        Ok(prompt) => prompt,
        Err(err) => {
            warn!(reason = %err, "rejected chat request");
            return err.into_response();
        }
    };
    let Some(agent_ref) = state.agent_ref.clone() else {
        warn!("chat request received but LETTA_AGENT_ID is not set");
        return RelayError::NotConfigured(AGENT_NOT_CONFIGURED).into_response();
    };
    let Some(agent) = state.agent.clone() else {
        warn!("chat request received but LETTA_API_KEY is not set");
        return RelayError::NotConfigured(API_KEY_NOT_CONFIGURED).into_response();
    };

    let mut stream = agent.stream_prompt(&agent_ref, &prompt);

    // The status line is chosen only once the remote side has answered.
    let first = match stream.next().await {
        Some(Ok(chunk)) => Some(chunk),
        Some(Err(err)) => {
            let mapped = RelayError::from_agent_error(&err);
            error!(
                agent = %agent_ref,
                status = %mapped.status(),
                error = %err,
                "remote agent request failed"
            );
            return mapped.into_response();
        }
        None => None,
    };

    let body = Body::from_stream(async_stream::stream! {
        let mut chunks = 0usize;
        if let Some(chunk) = first {
            chunks += 1;
            yield Ok::<Bytes, WorkbenchError>(Bytes::from(chunk));
        }
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    chunks += 1;
                    yield Ok(Bytes::from(chunk));
                }
                Err(err) => {
                    error!(agent = %agent_ref, chunks, error = %err, "remote agent stream failed mid-response");
                    yield Err(err);
                    break;
                }
            }
        }
        debug!(agent = %agent_ref, chunks, "relay stream finished");
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING.clone(), "no"),
        ],
        body,
    )
        .into_response()
}

pub async fn run(host: &str, port: u16, config: &Config) -> Result<()> {
    run_with_shutdown(
        host,
        port,
        AppState::from_config(config),
        futures::future::pending::<()>(),
    )
    .await
}

pub async fn run_with_shutdown<F>(host: &str, port: u16, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| WorkbenchError::Runtime(format!("failed to bind {addr}: {e}")))?;
    serve(listener, state, shutdown).await
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if state.agent_ref.is_none() {
        warn!("LETTA_AGENT_ID is not set; /chat will answer 500 until iq-workbench-setup has run");
    }
    if state.agent.is_none() {
        warn!("LETTA_API_KEY is not set; /chat will answer 500");
    }
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, configured = state.is_configured(), "relay listening");
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| WorkbenchError::Runtime(e.to_string()))?;

    info!("relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_is_the_last_user_message() {
        let body = br#"{"messages":[{"role":"user","content":"first"},{"role":"assistant","content":"reply"},{"role":"user","content":"second"}]}"#;
        assert_eq!(last_user_prompt(body).unwrap(), "second");
    }

    #[test]
    fn malformed_bodies_need_messages() {
        for body in [
            &b"not json"[..],
            br#"{}"#,
            br#"{"messages":"hi"}"#,
            br#"{"messages":[]}"#,
        ] {
            assert_eq!(
                last_user_prompt(body),
                Err(RelayError::InvalidRequest(MESSAGES_REQUIRED))
            );
        }
    }

    #[test]
    fn trailing_assistant_message_is_rejected() {
        let body = br#"{"messages":[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]}"#;
        assert_eq!(
            last_user_prompt(body),
            Err(RelayError::InvalidRequest(LAST_MESSAGE_NOT_USER))
        );
    }

    #[test]
    fn default_state_is_unconfigured() {
        assert!(!AppState::default().is_configured());
    }
}
