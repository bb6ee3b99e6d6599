//! `handoff.toml` loading and validation.

use handoff_core::{HandoffError, HandoffResult};
use handoff_gateway::HubConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub hub: HubConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub handoff: HandoffSection,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Where customer messages are answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffSection {
    /// Notice shown to the session when staff hand it back to the bot.
    #[serde(default = "default_transfer_message")]
    pub transfer_message: String,
}

impl Default for HandoffSection {
    fn default() -> Self {
        Self {
            transfer_message: default_transfer_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_transfer_message() -> String {
    "You are now chatting with our virtual assistant again.".to_string()
}
fn default_true() -> bool {
    true
}

impl HandoffConfig {
    pub async fn load(path: &Path) -> HandoffResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            HandoffError::Config(format!("Failed to read config file '{}': {e}", path.display()))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> HandoffResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| HandoffError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> HandoffResult<()> {
        let url = self.engine.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(HandoffError::Config(format!(
                "engine.url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.engine.timeout_secs == 0 {
            return Err(HandoffError::Config("engine.timeout_secs must be positive".into()));
        }
        if self.hub.outbound_buffer == 0 {
            return Err(HandoffError::Config("hub.outbound_buffer must be positive".into()));
        }
        Ok(())
    }

    pub fn history_dir(&self) -> PathBuf {
        self.data_dir.join("history")
    }
}
