//! Configuration management for the RPA gateway
//!
//! Layering: built-in defaults, then the TOML file, then environment
//! variables. CLI flags are applied on top by the binary.

pub mod file;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::devices::{ClientSettings, DeviceRegistration, RetryPolicy};
use crate::{Error, Result};

use self::file::{AppFileConfig, ClientFileConfig, GatewayConfigFile};

/// Route segments owned by the gateway itself
const RESERVED_PREFIXES: &[&str] = &["devices", "broadcast", "health", "ready", "apps"];

/// RPA gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API server configuration
    pub server: ServerConfig,

    /// Settings shared by every device client
    pub client: ClientSettings,

    /// Devices to register at startup, in order
    pub devices: Vec<DeviceRegistration>,

    /// App namespaces exposed under `/api/{prefix}`
    pub apps: Vec<AppNamespace>,
}

/// HTTP API server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// A chat app variant served under its own route prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppNamespace {
    /// URL segment (`/api/{prefix}/...`)
    pub prefix: String,
    /// Discriminator forwarded to the device as `app_type`
    pub app_type: String,
    /// Human-readable name
    pub label: String,
}

impl AppNamespace {
    #[must_use]
    pub fn new(prefix: &str, app_type: &str, label: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            app_type: app_type.to_string(),
            label: label.to_string(),
        }
    }

    /// Built-in namespaces: personal and enterprise messenger
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("wechat", "wechat", "WeChat"),
            Self::new("wework", "wework", "WeCom"),
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            client: ClientSettings::default(),
            devices: Vec::new(),
            apps: AppNamespace::defaults(),
        }
    }
}

impl Config {
    /// Load configuration from file and process environment
    ///
    /// `path` wins over `RPA_GATEWAY_CONFIG`, which wins over the standard
    /// location.
    ///
    /// # Errors
    ///
    /// Returns error if the config file or an environment override is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("RPA_GATEWAY_CONFIG").ok().map(PathBuf::from);
        let file = file::load_config_file(path.or(env_path.as_deref()))?;
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error on unparsable environment values, duplicate or reserved
    /// app prefixes, or a malformed `RPA_DEVICES` list
    pub fn from_sources(
        file: GatewayConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = ServerConfig::default();
        let server = ServerConfig {
            host: env("RPA_GATEWAY_HOST")
                .or(file.server.host)
                .unwrap_or(defaults.host),
            port: match env("RPA_GATEWAY_PORT") {
                Some(raw) => parse_env("RPA_GATEWAY_PORT", &raw)?,
                None => file.server.port.unwrap_or(defaults.port),
            },
        };

        let mut client = client_settings(&file.client);
        if let Some(raw) = env("RPA_TASK_TIMEOUT") {
            client.task_timeout = Duration::from_secs(parse_env("RPA_TASK_TIMEOUT", &raw)?);
        }

        let mut devices: Vec<DeviceRegistration> = file
            .devices
            .into_iter()
            .map(|(id, device)| DeviceRegistration {
                id,
                endpoint_address: device.api_base,
                display_name: device.name,
                target_app: device.target_app,
                adb_serial: device.adb_serial,
            })
            .collect();

        if let Some(raw) = env("RPA_DEVICES") {
            for (id, endpoint) in parse_device_list(&raw)? {
                match devices.iter_mut().find(|d| d.id == id) {
                    Some(existing) => existing.endpoint_address = endpoint,
                    None => devices.push(DeviceRegistration::new(id, endpoint)),
                }
            }
        }

        let apps = match file.apps {
            Some(apps) => apps.into_iter().map(app_namespace).collect(),
            None => AppNamespace::defaults(),
        };
        validate_apps(&apps)?;

        Ok(Self {
            server,
            client,
            devices,
            apps,
        })
    }
}

fn client_settings(file: &ClientFileConfig) -> ClientSettings {
    let defaults = ClientSettings::default();
    let retry_defaults = RetryPolicy::default();

    ClientSettings {
        request_timeout: file
            .request_timeout_secs
            .map_or(defaults.request_timeout, Duration::from_secs),
        long_request_timeout: file
            .contact_list_timeout_secs
            .map_or(defaults.long_request_timeout, Duration::from_secs),
        poll_interval: file
            .poll_interval_ms
            .map_or(defaults.poll_interval, Duration::from_millis),
        task_timeout: file
            .task_timeout_secs
            .map_or(defaults.task_timeout, Duration::from_secs),
        retry: RetryPolicy {
            max_attempts: file.max_attempts.unwrap_or(retry_defaults.max_attempts),
            backoff: file
                .retry_backoff_ms
                .map_or(retry_defaults.backoff, Duration::from_millis),
        },
        serialize_per_device: file
            .serialize_per_device
            .unwrap_or(defaults.serialize_per_device),
    }
}

fn app_namespace(app: AppFileConfig) -> AppNamespace {
    let prefix = app.prefix.trim().to_string();
    AppNamespace {
        app_type: app.app_type.unwrap_or_else(|| prefix.clone()),
        label: app.label.unwrap_or_else(|| prefix.clone()),
        prefix,
    }
}

fn validate_apps(apps: &[AppNamespace]) -> Result<()> {
    let mut seen = HashSet::new();
    for app in apps {
        let valid_chars = app
            .prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if app.prefix.is_empty() || !valid_chars {
            return Err(Error::Config(format!("invalid app prefix '{}'", app.prefix)));
        }
        if RESERVED_PREFIXES.contains(&app.prefix.as_str()) {
            return Err(Error::Config(format!(
                "app prefix '{}' collides with a gateway route",
                app.prefix
            )));
        }
        if !seen.insert(app.prefix.as_str()) {
            return Err(Error::Config(format!("duplicate app prefix '{}'", app.prefix)));
        }
    }
    Ok(())
}

/// Parse `id=url,id2=url2`
fn parse_device_list(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(id, url)| (id.trim().to_string(), url.trim().to_string()))
                .filter(|(id, url)| !id.is_empty() && !url.is_empty())
                .ok_or_else(|| {
                    Error::Config(format!("RPA_DEVICES entry '{entry}' is not id=url"))
                })
        })
        .collect()
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} has invalid value '{raw}'")))
}
