use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkbenchError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("upstream error: Letta request failed ({status}): {body}")]
    Upstream { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub use crate::Result;

pub const MESSAGES_REQUIRED: &str = "Messages are required";
pub const LAST_MESSAGE_NOT_USER: &str = "Last message must be from user";
pub const AGENT_NOT_CONFIGURED: &str = "Agent not configured. Please run: iq-workbench-setup";
pub const API_KEY_NOT_CONFIGURED: &str = "Letta API key not configured. Please set LETTA_API_KEY";

/// Failures surfaced by the `/chat` relay. The display text is exactly what
/// the caller receives; remote detail never leaves the server log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidRequest(&'static str),
    #[error("{0}")]
    NotConfigured(&'static str),
    #[error("Invalid API key. Please check your LETTA_API_KEY")]
    Unauthorized,
    #[error("Agent not found. Please run: iq-workbench-setup")]
    RemoteNotFound,
    #[error("Internal server error")]
    Transport,
}

impl RelayError {
    /// Classifies an error raised while talking to the remote agent. A
    /// non-2xx answer is mapped by its status; anything else falls back to
    /// the message text.
    pub fn from_agent_error(err: &WorkbenchError) -> Self {
        match err {
            WorkbenchError::Upstream { status: 401, .. } => RelayError::Unauthorized,
            WorkbenchError::Upstream { status: 404, .. } => RelayError::RemoteNotFound,
            WorkbenchError::Upstream { .. } => RelayError::Transport,
            other => Self::from_remote(&other.to_string()),
        }
    }

    pub fn from_remote(detail: &str) -> Self {
        let lower = detail.to_ascii_lowercase();
        if lower.contains("401") || lower.contains("unauthorized") {
            RelayError::Unauthorized
        } else if lower.contains("404") || lower.contains("not found") {
            RelayError::RemoteNotFound
        } else {
            RelayError::Transport
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::NotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::RemoteNotFound => StatusCode::NOT_FOUND,
            RelayError::Transport => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
