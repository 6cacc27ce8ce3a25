//! Configuration for the workflow engine and its collaborators.
//!
//! Reads `atelier.toml` when present, falling back to defaults for every
//! field. Layering: file → environment (`ATELIER_REVIEWER_CMD`) → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [reviewer]
//! mode = "command"            # or "static" for the offline adapter
//! cmd = "claude"
//! generation_timeout_secs = 120
//!
//! [notifications]
//! channel_capacity = 256
//!
//! [storage]
//! db_path = "/var/lib/atelier/atelier.db"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which reviewer adapter to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewerMode {
    /// Shell out to a model CLI.
    #[default]
    Command,
    /// Deterministic offline adapter (demos, tests).
    Static,
}

impl std::fmt::Display for ReviewerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewerMode::Command => write!(f, "command"),
            ReviewerMode::Static => write!(f, "static"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerConfig {
    #[serde(default)]
    pub mode: ReviewerMode,
    /// Model CLI command (default: "claude")
    #[serde(default = "default_reviewer_cmd")]
    pub cmd: String,
    /// Caller-supplied bound on a single generation call
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
}

fn default_reviewer_cmd() -> String {
    "claude".to_string()
}

fn default_generation_timeout_secs() -> u64 {
    120
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            mode: ReviewerMode::default(),
            cmd: default_reviewer_cmd(),
            generation_timeout_secs: default_generation_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path; defaults to the platform data directory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_db_path(&self) -> PathBuf {
        if let Some(path) = &self.db_path {
            return path.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("atelier")
            .join("atelier.db")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtelierConfig {
    #[serde(default)]
    pub reviewer: ReviewerConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AtelierConfig {
    /// Load from a config file, falling back to defaults when it does not
    /// exist. Environment overrides are applied after the file layer.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            _ => Self::default(),
        };

        if let Ok(cmd) = std::env::var("ATELIER_REVIEWER_CMD") {
            config.reviewer.cmd = cmd;
        }

        Ok(config)
    }

    pub fn generation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reviewer.generation_timeout_secs)
    }
}
