use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::config_store;
use crate::domains::agent::AgentReference;
use crate::error::Result;
use crate::providers::letta::{first_assistant_text, LettaClient};

pub const SMOKE_TEST_PROMPT: &str = "Hello! Please introduce yourself.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryBlock {
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MemoryBlock {
    fn new(label: &str, value: &str) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
            description: None,
        }
    }
}

/// Request body for creating the remote agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentBlueprint {
    pub memory_blocks: Vec<MemoryBlock>,
    pub tools: Vec<String>,
    pub model: String,
    pub embedding: String,
}

impl Default for AgentBlueprint {
    fn default() -> Self {
        let mut project = MemoryBlock::new(
            "project_context",
            "The user is chatting through IQ Workbench, a terminal client and streaming relay \
             built on Letta. It exists to show what a stateful agent can do.",
        );
        project.description =
            Some("Stores information about the current project and technical context".to_string());

        Self {
            memory_blocks: vec![
                MemoryBlock::new(
                    "human",
                    "The user is trying Letta for the first time and is interested in AI and \
                     building applications.",
                ),
                MemoryBlock::new(
                    "persona",
                    "I am the IQ Workbench assistant. I keep memory across conversations and help \
                     with questions about data, code and writing. I am friendly, precise and \
                     encouraging.",
                ),
                project,
            ],
            tools: vec!["web_search".to_string(), "run_code".to_string()],
            model: "openai/gpt-4.1".to_string(),
            embedding: "openai/text-embedding-3-small".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub agent: AgentReference,
    pub env_path: PathBuf,
    /// First assistant reply to the smoke-test prompt, if the agent sent one.
    pub greeting: Option<String>,
}

/// Creates the agent, records it in `env_path`, then sends one message to
/// prove the round trip works.
pub async fn provision(
    client: &LettaClient,
    env_path: &Path,
    api_key: &str,
) -> Result<ProvisionReport> {
    info!(base_url = client.base_url(), "creating agent");
    let agent = client.create_agent(&AgentBlueprint::default()).await?;
    info!(agent = %agent, "agent created");

    config_store::save_agent_credentials(env_path, agent.as_str(), api_key)?;
    info!(path = %env_path.display(), "saved agent credentials");

    let messages = client.send_message(&agent, SMOKE_TEST_PROMPT).await?;
    let greeting = first_assistant_text(&messages);

    Ok(ProvisionReport {
        agent,
        env_path: env_path.to_path_buf(),
        greeting,
    })
}
