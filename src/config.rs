//! Configuration loader and validator for the page store and import pipeline.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Environment variable that overrides `anthropic.api_key`.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub server: Server,
    pub anthropic: Anthropic,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default)]
    pub log_file: String,
    pub concurrency: usize,
}

/// HTTP surface settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub bind: String,
    #[serde(default)]
    pub shared_secret: String,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

/// Model service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Anthropic {
    #[serde(default)]
    pub api_key: String,
    pub version: String,
    pub model: String,
    pub max_tokens: u32,
    pub retry: Retry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Retry {
    pub max_retries: u32,
    pub base_delay_seconds: u64,
}

fn default_max_upload_mb() -> usize {
    200
}

impl App {
    /// `data_dir` with a leading `~/` expanded against `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        expand_home(&self.data_dir)
    }

    /// Diagnostic log path, if one is configured.
    pub fn resolved_log_file(&self) -> Option<String> {
        let trimmed = self.log_file.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(expand_home(trimmed))
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())?;
        if let Some(log) = self.app.resolved_log_file() {
            if let Some(parent) = Path::new(&log).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(())
    }

    /// The model API key: `ANTHROPIC_API_KEY` wins over the file; blank counts as absent.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| Some(self.anthropic.api_key.clone()).filter(|k| !k.trim().is_empty()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.anthropic.retry.max_retries,
            base_delay: Duration::from_secs(self.anthropic.retry.base_delay_seconds),
        }
    }
}

fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{}/{}", home.trim_end_matches('/'), rest);
        }
    }
    path.to_string()
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.concurrency == 0 {
        return Err(ConfigError::Invalid("app.concurrency must be > 0"));
    }

    if cfg.server.bind.trim().is_empty() {
        return Err(ConfigError::Invalid("server.bind must be non-empty"));
    }
    if cfg.server.max_upload_mb == 0 {
        return Err(ConfigError::Invalid("server.max_upload_mb must be > 0"));
    }

    // api_key may be empty here; a missing key is reported per import request.
    if cfg.anthropic.version.trim().is_empty() {
        return Err(ConfigError::Invalid("anthropic.version must be non-empty"));
    }
    if cfg.anthropic.model.trim().is_empty() {
        return Err(ConfigError::Invalid("anthropic.model must be non-empty"));
    }
    if cfg.anthropic.max_tokens == 0 {
        return Err(ConfigError::Invalid("anthropic.max_tokens must be > 0"));
    }

    Ok(())
}

/// Returns the example YAML shipped with the project (`config.example.yaml`).
pub fn example() -> &'static str {
    include_str!("../config.example.yaml")
}
