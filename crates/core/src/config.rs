// crates/core/src/config.rs
//! Application configuration loaded from a single TOML file.
//!
//! Every section falls back to defaults so a minimal file only needs to name
//! the paths that differ from the stock layout.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::extraction::DbKind;

/// Default bound on enumerated attribute value lists.
pub const DEFAULT_MAX_ATTR_LIST_SIZE: usize = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listen_address: String,
    pub listen_port: u16,
    pub log_level: String,
    /// Endpoint notified (POST, empty body) after a file-backed extraction is installed.
    pub kontext_soft_reset_url: Option<String>,
    pub jobs: JobsConfig,
    pub liveattrs: LiveAttrsConfig,
    pub extractor: CommandConfig,
    pub corpus_sync: CorpusSyncConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 8090,
            log_level: "info".to_string(),
            kontext_soft_reset_url: None,
            jobs: JobsConfig::default(),
            liveattrs: LiveAttrsConfig::default(),
            extractor: CommandConfig::default(),
            corpus_sync: CorpusSyncConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub status_data_path: PathBuf,
    pub max_num_restarts: u32,
    pub cleanup_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            status_data_path: PathBuf::from("corpadm-jobs.json"),
            max_num_restarts: 3,
            cleanup_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveAttrsConfig {
    pub db_path: PathBuf,
    pub conf_dir_path: PathBuf,
    pub text_types_db_dir_path: PathBuf,
    pub extraction_db_kind: DbKind,
    pub max_attr_list_size: usize,
    pub usage_channel_capacity: usize,
}

impl Default for LiveAttrsConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("liveattrs.db"),
            conf_dir_path: PathBuf::from("liveattrs-conf"),
            text_types_db_dir_path: PathBuf::from("text-types"),
            extraction_db_kind: DbKind::Shared,
            max_attr_list_size: DEFAULT_MAX_ATTR_LIST_SIZE,
            usage_channel_capacity: 256,
        }
    }
}

/// An external command with fixed leading arguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            command: "vte".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorpusSyncConfig {
    pub command: String,
    pub args: Vec<String>,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
}

impl Default for CorpusSyncConfig {
    fn default() -> Self {
        Self {
            command: "rsync".to_string(),
            args: vec!["-a".to_string(), "--delete".to_string()],
            source_dir: PathBuf::from("/mnt/corpora-src"),
            target_dir: PathBuf::from("/var/lib/corpora/data"),
        }
    }
}

impl AppConfig {
    /// Read and parse the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text).map_err(|message| ConfigError::Parse {
            path: path.to_owned(),
            message,
        })
    }

    fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    /// `address:port` for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }
}
