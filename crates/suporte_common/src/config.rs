//! Engine configuration.
//!
//! Loaded from a TOML file (default `suporte.toml` in the working
//! directory). Every field carries a serde default, so a missing or
//! partial file still yields a working configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ollama::OllamaConfig;

/// Engine configuration, one section per collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub scripts: ScriptSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub repair: RepairSettings,
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

/// Where the remediation scripts live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSettings {
    #[serde(default = "default_scripts_dir")]
    pub dir: PathBuf,
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("bats")
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            dir: default_scripts_dir(),
        }
    }
}

/// The file server probed for the status indicator and by the repair
/// pipeline's connectivity stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

fn default_server_host() -> String {
    "10.254.1.236".to_string()
}

fn default_server_port() -> u16 {
    445
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_check_interval_secs() -> u64 {
    10
}

impl ServerSettings {
    /// Probe target as host:port.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            probe_timeout_secs: default_probe_timeout_secs(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

/// Spreadsheet repair pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairSettings {
    /// Process name of the spreadsheet editor to terminate
    #[serde(default = "default_editor_process")]
    pub editor_process: String,
    /// Office file cache directory to purge
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_editor_process() -> String {
    if cfg!(windows) {
        "excel.exe".to_string()
    } else {
        "excel".to_string()
    }
}

fn default_cache_dir() -> PathBuf {
    if cfg!(windows) {
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(local)
                .join("Microsoft")
                .join("Office")
                .join("16.0")
                .join("OfficeFileCache");
        }
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("OfficeFileCache")
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            editor_process: default_editor_process(),
            cache_dir: default_cache_dir(),
        }
    }
}
