//! Server configuration.
//!
//! Stored as TOML at `~/.config/fileferry/server.toml`, or wherever
//! `FERRY_CONFIG` points. Every field is optional.

use std::path::{Path, PathBuf};

use fileferry_protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_TRANSFER_SIZE, DEFAULT_PORT};
use fileferry_server::ServerConfig;
use fileferry_transfer::TransferConfig;
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory served to clients.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// WebSocket listen port (0 = auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Largest upload or download accepted, in bytes.
    #[serde(default = "default_max_transfer_size")]
    pub max_transfer_size: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from("./")
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_transfer_size() -> u64 {
    DEFAULT_MAX_TRANSFER_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            port: default_port(),
            chunk_size: default_chunk_size(),
            max_transfer_size: default_max_transfer_size(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            root: self.root.clone(),
            transfer: TransferConfig {
                chunk_size: self.chunk_size,
                max_transfer_size: self.max_transfer_size,
            },
        }
    }
}

/// `FERRY_CONFIG` if set, else the per-user config file.
fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("FERRY_CONFIG") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("fileferry")
        .join("server.toml")
}
