//! Shared configuration for the zhaws CLI and server.
//!
//! TOML profiles describing how to reach a server, settings for running
//! one, and translation into `zhaws_core::ControllerConfig` and
//! `zhaws_server::ServerConfig`. Values merge in order: built-in defaults,
//! the config file, then `ZHAWS_*` environment variables (`__` separates
//! nested keys, e.g. `ZHAWS_SERVER__PORT=9000`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use zhaws_core::ControllerConfig;
use zhaws_server::{DEFAULT_HOST, DEFAULT_PORT, ServerConfig};

pub const DEFAULT_PROFILE: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("profile '{name}' not found in config")]
    ProfileNotFound { name: String },

    #[error("invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,

    /// Settings for `zhaws serve`-style hosts.
    #[serde(default)]
    pub server: ServerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some(DEFAULT_PROFILE.into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
            server: ServerSettings::default(),
        }
    }
}

impl Config {
    /// Look up a profile by name, falling back to `default_profile`.
    ///
    /// The built-in `default` profile (localhost on the default port) is
    /// available even when the file does not define it.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or(DEFAULT_PROFILE);
        match self.profiles.get(name) {
            Some(profile) => Ok((name.to_owned(), profile.clone())),
            None if name == DEFAULT_PROFILE => Ok((name.to_owned(), Profile::default())),
            None => Err(ConfigError::ProfileNotFound { name: name.to_owned() }),
        }
    }

    /// Resolve a profile straight into a runtime connection config.
    pub fn controller_config(&self, profile: Option<&str>) -> Result<ControllerConfig, ConfigError> {
        let (_, profile) = self.profile(profile)?;
        profile.to_controller_config(&self.defaults)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Seconds to wait for each command's result.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_request_timeout() -> u64 {
    zhaws_core::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

/// How to reach one server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default = "default_client_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Full WebSocket URL; wins over `host` and `port` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Override `defaults.request_timeout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            host: default_client_host(),
            port: default_port(),
            url: None,
            request_timeout: None,
        }
    }
}

fn default_client_host() -> String {
    "localhost".into()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Profile {
    pub fn url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .url
            .clone()
            .unwrap_or_else(|| format!("ws://{}:{}", self.host, self.port));
        parse_ws_url(&raw)
    }

    /// Build a `ControllerConfig`, taking anything the profile leaves
    /// unset from `defaults`.
    pub fn to_controller_config(&self, defaults: &Defaults) -> Result<ControllerConfig, ConfigError> {
        let timeout = self.request_timeout.unwrap_or(defaults.request_timeout);
        Ok(ControllerConfig::new(self.url()?).with_request_timeout(Duration::from_secs(timeout)))
    }
}

/// Parse and check a server URL. Only `ws` and `wss` are accepted.
pub fn parse_ws_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_owned(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(invalid(format!("expected ws:// or wss://, got {other}://"))),
    }
}

/// Where and how a server listens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub network_auto_start: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_port(),
            network_auto_start: false,
        }
    }
}

fn default_server_host() -> String {
    DEFAULT_HOST.into()
}

impl ServerSettings {
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig::new(self.host.clone(), self.port).with_network_auto_start(self.network_auto_start)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "zhaws", "zhaws").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("zhaws");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ZHAWS_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if anything goes wrong.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(&path, cfg)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.defaults.output, "table");
        assert_eq!(config.server, ServerSettings::default());

        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, DEFAULT_PROFILE);
        assert_eq!(profile.url().unwrap().as_str(), "ws://localhost:8001/");
    }

    #[test]
    fn file_values_fill_profiles_and_server() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_profile = "lab"

[defaults]
request_timeout = 5

[profiles.lab]
host = "10.0.0.7"
port = 9001

[profiles.remote]
url = "wss://zigbee.example.org/ws"
request_timeout = 60

[server]
port = 9100
network_auto_start = true
"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        let lab = config.controller_config(None).unwrap();
        assert_eq!(lab.url.as_str(), "ws://10.0.0.7:9001/");
        assert_eq!(lab.request_timeout, Duration::from_secs(5));

        let remote = config.controller_config(Some("remote")).unwrap();
        assert_eq!(remote.url.as_str(), "wss://zigbee.example.org/ws");
        assert_eq!(remote.request_timeout, Duration::from_secs(60));

        let server = config.server.to_server_config();
        assert_eq!(server.address(), "0.0.0.0:9100");
        assert!(server.network_auto_start);
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let config = Config::default();
        let err = config.profile(Some("attic")).unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound { name } if name == "attic"));
    }

    #[test]
    fn only_websocket_urls_are_accepted() {
        assert!(parse_ws_url("ws://127.0.0.1:8001").is_ok());
        let err = parse_ws_url("http://127.0.0.1:8001").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
        assert!(parse_ws_url("not a url").is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "garage".into(),
            Profile {
                host: "garage.local".into(),
                ..Profile::default()
            },
        );
        save_config_to(&path, &config).unwrap();

        assert_eq!(load_config_from(&path).unwrap(), config);
    }
}
