//! Diagnosis configuration stored as TOML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

/// Diagnosis configuration (TOML).
///
/// Missing fields default to the values below, so an empty or absent file is a
/// valid configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnoseConfig {
    /// Engine turns allowed before the next turn is forced to `final_answer`.
    pub step_ceiling: u32,

    /// Consecutive forced turns tolerated before the session errors.
    pub forced_turn_limit: u32,

    /// Truncate `read_file_by_id` output beyond this many bytes.
    pub max_file_bytes: usize,

    /// Buffered snapshots between a session and its subscriber.
    pub channel_capacity: usize,

    /// First user message sent to the engine.
    pub task_message: String,

    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "DIAGNOSE_API_KEY".to_string(),
            timeout_secs: 120,
            max_tokens: 4096,
            temperature: None,
        }
    }
}

impl Default for DiagnoseConfig {
    fn default() -> Self {
        Self {
            step_ceiling: 100,
            forced_turn_limit: 3,
            max_file_bytes: 200_000,
            channel_capacity: 64,
            task_message: "check this project for deployability".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl DiagnoseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.forced_turn_limit == 0 {
            return Err(anyhow!("forced_turn_limit must be > 0"));
        }
        if self.max_file_bytes == 0 {
            return Err(anyhow!("max_file_bytes must be > 0"));
        }
        if self.channel_capacity == 0 {
            return Err(anyhow!("channel_capacity must be > 0"));
        }
        if self.task_message.trim().is_empty() {
            return Err(anyhow!("task_message must not be empty"));
        }
        if self.engine.endpoint.trim().is_empty() {
            return Err(anyhow!("engine.endpoint must not be empty"));
        }
        if self.engine.model.trim().is_empty() {
            return Err(anyhow!("engine.model must not be empty"));
        }
        if self.engine.timeout_secs == 0 {
            return Err(anyhow!("engine.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DiagnoseConfig::default()`.
pub fn load_config(path: &Path) -> Result<DiagnoseConfig> {
    if !path.exists() {
        let cfg = DiagnoseConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DiagnoseConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
