//! TOML configuration file loading
//!
//! Supports `~/.config/rpa-gateway/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [client]
//! task_timeout_secs = 60
//!
//! [devices.device_1]
//! name = "Phone A"
//! api_base = "http://192.168.1.100:9527"
//! target_app = "wework"
//! adb_serial = "R58M123ABC"
//!
//! [[apps]]
//! prefix = "wechat"
//! app_type = "wechat"
//! label = "WeChat"
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfigFile {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Device client tunables
    #[serde(default)]
    pub client: ClientFileConfig,

    /// Devices keyed by id, in file order
    #[serde(default)]
    pub devices: IndexMap<String, DeviceFileConfig>,

    /// App namespaces; replaces the built-in set when present
    #[serde(default)]
    pub apps: Option<Vec<AppFileConfig>>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Bind address
    pub host: Option<String>,
}

/// Device client configuration
#[derive(Debug, Default, Deserialize)]
pub struct ClientFileConfig {
    pub request_timeout_secs: Option<u64>,

    /// HTTP timeout for contact listing (the device itself allows ~90s)
    pub contact_list_timeout_secs: Option<u64>,

    pub poll_interval_ms: Option<u64>,

    /// Overall wait for a task result when a call waits
    pub task_timeout_secs: Option<u64>,

    /// Attempts per HTTP call, including the first
    pub max_attempts: Option<u32>,

    pub retry_backoff_ms: Option<u64>,

    /// Hold a per-device lane across submit and poll
    pub serialize_per_device: Option<bool>,
}

/// One device entry
#[derive(Debug, Default, Deserialize)]
pub struct DeviceFileConfig {
    /// Display name
    pub name: Option<String>,

    /// Base URL of the device's task endpoint
    pub api_base: String,

    /// Default app variant for calls that name none
    pub target_app: Option<String>,

    /// ADB serial, informational
    pub adb_serial: Option<String>,
}

/// One app namespace entry
#[derive(Debug, Deserialize)]
pub struct AppFileConfig {
    /// URL segment under `/api/`
    pub prefix: String,

    /// Discriminator forwarded to the device; defaults to the prefix
    pub app_type: Option<String>,

    /// Human label; defaults to the prefix
    pub label: Option<String>,
}

/// Load the TOML config file
///
/// An explicit `path` must exist. Without one the standard path is used and
/// a missing file yields `GatewayConfigFile::default()`.
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<GatewayConfigFile> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match config_file_path() {
            Some(path) if path.exists() => path,
            _ => {
                tracing::debug!("no config file, using defaults");
                return Ok(GatewayConfigFile::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path).map_err(|e| {
        Error::Config(format!("failed to read config file {}: {e}", path.display()))
    })?;
    let config = parse_config_file(&content).map_err(|e| {
        Error::Config(format!("failed to parse config file {}: {e}", path.display()))
    })?;

    tracing::info!(path = %path.display(), devices = config.devices.len(), "loaded config file");
    Ok(config)
}

/// Parse config file content
///
/// # Errors
///
/// Returns error if the content is not valid TOML for this schema
pub fn parse_config_file(content: &str) -> Result<GatewayConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/rpa-gateway/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("rpa-gateway").join("config.toml"))
}
