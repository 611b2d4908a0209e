//! Engine configuration
//!
//! Loaded from a TOML file (`SHADOW_CONFIG`, default `shadow.toml`). Every
//! field is optional; a missing file means all defaults.

use crate::dispatch::Allowlist;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use shadow_shared::timing;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "SHADOW_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "shadow.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the remote command API
    pub api_url: String,
    /// Bearer token for the command API; empty sends no header
    pub auth_token: String,
    /// Seconds between polls
    pub polling_interval: u64,
    /// Extra delivery attempts per result report
    pub max_retries: u32,
    /// Log command start/finish at INFO
    pub log_commands: bool,
    /// Empty allows every command
    pub allowed_commands: Vec<String>,
    pub shadow_mode: bool,
    pub key_path: PathBuf,
    /// Device to drive; first enumerated device when unset
    pub device_id: Option<String>,
    /// Seconds before a single device call is abandoned
    pub step_timeout: u64,
    /// Seconds to pause after a loop-level failure
    pub loop_backoff: u64,
    /// adb binary used by the device bridge
    pub adb_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".into(),
            auth_token: String::new(),
            polling_interval: timing::DEFAULT_POLLING_INTERVAL_SECS,
            max_retries: timing::DEFAULT_MAX_RETRIES,
            log_commands: true,
            allowed_commands: Vec::new(),
            shadow_mode: true,
            key_path: PathBuf::from("config/shadow_key.key"),
            device_id: None,
            step_timeout: timing::DEFAULT_STEP_TIMEOUT_SECS,
            loop_backoff: timing::LOOP_BACKOFF_SECS,
            adb_path: "adb".into(),
        }
    }
}

impl EngineConfig {
    /// Load from the path in `SHADOW_CONFIG`, or `shadow.toml`
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            bail!("api_url must be an http(s) URL, got '{}'", self.api_url);
        }
        if self.polling_interval == 0 {
            bail!("polling_interval must be at least 1 second");
        }
        if self.step_timeout == 0 {
            bail!("step_timeout must be at least 1 second");
        }
        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout)
    }

    pub fn loop_backoff(&self) -> Duration {
        Duration::from_secs(self.loop_backoff)
    }

    pub fn allowlist(&self) -> Allowlist {
        Allowlist::new(&self.allowed_commands)
    }
}
