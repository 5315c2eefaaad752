//! Client configuration.
//!
//! Stored as TOML at `~/.config/fileferry/client.toml`, or wherever
//! `FERRY_CONFIG` points.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fileferry_client::ClientConfig;
use fileferry_protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_TRANSFER_SIZE, DEFAULT_PORT};
use fileferry_transfer::TransferConfig;
use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server URL.
    #[serde(default = "default_address")]
    pub address: String,

    /// Where downloaded files land.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Applies to unary calls and stream setup, never to chunk streaming.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Must not exceed the server's `chunk_size`: its frame limit is sized
    /// from its own setting, and a larger frame drops the connection.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_address() -> String {
    format!("ws://127.0.0.1:{DEFAULT_PORT}")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./")
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            download_dir: default_download_dir(),
            request_timeout_secs: default_request_timeout_secs(),
            chunk_size: default_chunk_size(),
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
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            address: self.address.clone(),
            download_dir: self.download_dir.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            transfer: TransferConfig {
                chunk_size: self.chunk_size,
                max_transfer_size: DEFAULT_MAX_TRANSFER_SIZE,
            },
        }
    }
}

fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("FERRY_CONFIG") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("fileferry")
        .join("client.toml")
}
