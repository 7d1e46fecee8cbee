use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config_store;
use crate::domains::agent::AgentReference;
use crate::error::Result;

pub const API_KEY_VAR: &str = "LETTA_API_KEY";
pub const AGENT_ID_VAR: &str = "LETTA_AGENT_ID";
pub const BASE_URL_VAR: &str = "LETTA_BASE_URL";
pub const DEFAULT_ENV_FILE: &str = ".env.local";
pub const DEFAULT_BASE_URL: &str = "https://api.letta.com";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LettaConfig {
    pub api_key: Option<String>,
    pub agent_id: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    pub letta: LettaConfig,
}

impl Config {
    /// Reads the process environment, falling back to `env_file` for any
    /// variable the environment leaves unset or blank.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        let file_vars = match env_file {
            Some(path) => config_store::read_env_file(path)?,
            None => Vec::new(),
        };
        Ok(Self::from_sources(|key| std::env::var(key).ok(), &file_vars))
    }

    pub fn from_sources<F>(env: F, file_vars: &[(String, String)]) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| -> Option<String> {
            env(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .or_else(|| {
                    file_vars
                        .iter()
                        .rev()
                        .find(|(name, _)| name == key)
                        .map(|(_, value)| value.trim().to_string())
                        .filter(|value| !value.is_empty())
                })
        };

        Self {
            letta: LettaConfig {
                api_key: lookup(API_KEY_VAR),
                agent_id: lookup(AGENT_ID_VAR),
                base_url: lookup(BASE_URL_VAR),
            },
        }
    }

    pub fn agent_reference(&self) -> Option<AgentReference> {
        self.letta.agent_id.as_deref().and_then(AgentReference::new)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.letta
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn base_url(&self) -> &str {
        self.letta
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_some() && self.agent_reference().is_some()
    }
}
