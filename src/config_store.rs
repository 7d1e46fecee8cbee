//! The local `KEY=VALUE` env file shared by the relay (reads it) and the
//! setup utility (writes the agent id and credential into it).

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use std::fs;
use std::path::Path;

use crate::config::{AGENT_ID_VAR, API_KEY_VAR};
use crate::error::{Result, WorkbenchError};

static AGENT_ID_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?m)^{AGENT_ID_VAR}=.*$")).unwrap());
static API_KEY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?m)^{API_KEY_VAR}=")).unwrap());

pub fn parse_env(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// A missing file reads as empty.
pub fn read_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(parse_env(&contents)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(WorkbenchError::Config(format!(
            "could not read {}: {err}",
            path.display()
        ))),
    }
}

/// Rewrites every agent id line (or appends one) and appends the credential
/// only when no credential line exists yet.
pub fn apply_agent_credentials(existing: &str, agent_id: &str, api_key: &str) -> String {
    let agent_line = format!("{AGENT_ID_VAR}={agent_id}");
    let mut contents = if AGENT_ID_LINE.is_match(existing) {
        AGENT_ID_LINE
            .replace_all(existing, NoExpand(&agent_line))
            .into_owned()
    } else {
        let mut contents = existing.to_string();
        ensure_trailing_newline(&mut contents);
        contents.push_str(&agent_line);
        contents.push('\n');
        contents
    };

    if !API_KEY_LINE.is_match(&contents) {
        ensure_trailing_newline(&mut contents);
        contents.push_str(&format!("{API_KEY_VAR}={api_key}\n"));
    }
    ensure_trailing_newline(&mut contents);
    contents
}

fn ensure_trailing_newline(contents: &mut String) {
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
}

pub fn save_agent_credentials(path: &Path, agent_id: &str, api_key: &str) -> Result<()> {
    let existing = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(WorkbenchError::Config(format!(
                "could not read {}: {err}",
                path.display()
            )))
        }
    };
    ensure_parent_dir(path)?;
    let updated = apply_agent_credentials(&existing, agent_id, api_key);
    fs::write(path, updated).map_err(|e| {
        WorkbenchError::Config(format!("could not write {}: {e}", path.display()))
    })
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| WorkbenchError::Config(e.to_string()))?;
        }
    }
    Ok(())
}
