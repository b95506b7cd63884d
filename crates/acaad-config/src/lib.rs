//! Configuration for ACAAD engine embedders.
//!
//! TOML file + `ACAAD_` environment overrides, translation into
//! `acaad_core::EngineConfig` and static `Host` lists, and a
//! `tracing-subscriber` setup helper.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use acaad_api::{Authentication, Host, Scheme};
use acaad_core::EngineConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no client secret configured for host '{host}'")]
    NoCredentials { host: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("tracing setup failed: {0}")]
    Tracing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub logging: Logging,

    /// Statically configured ACAAD servers.
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

/// Connection tuning. Durations are whole seconds.
#[derive(Debug, Deserialize, Serialize)]
pub struct EngineSection {
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval: u64,

    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,

    pub user_agent: Option<String>,

    /// Accept self-signed certificates on `https` hosts.
    #[serde(default)]
    pub insecure: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            reconnect_interval: default_reconnect_interval(),
            keepalive_interval: default_keepalive_interval(),
            user_agent: None,
            insecure: false,
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_reconnect_interval() -> u64 {
    5
}
fn default_keepalive_interval() -> u64 {
    15
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".into()
}

/// One ACAAD server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostEntry {
    pub name: String,

    pub address: String,

    /// REST port.
    pub port: u16,

    /// SignalR hub port. Defaults to `port`.
    pub push_port: Option<u16>,

    /// "http" or "https".
    #[serde(default = "default_scheme")]
    pub scheme: String,

    pub auth: Option<AuthEntry>,
}

fn default_scheme() -> String {
    "http".into()
}

/// OAuth client-credentials reference.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthEntry {
    pub token_endpoint: String,

    pub client_id: String,

    /// Plaintext secret. Prefer `client_secret_env`.
    pub client_secret: Option<String>,

    /// Environment variable holding the secret.
    pub client_secret_env: Option<String>,

    #[serde(default)]
    pub grants: Vec<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "acaad", "acaad").map_or_else(
        || PathBuf::from("acaad.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the default path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` + environment, then validate it.
///
/// Environment keys use `__` as the section separator, e.g.
/// `ACAAD_ENGINE__TIMEOUT=10` or `ACAAD_LOGGING__JSON=true`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ACAAD_").split("__"));

    let config: Config = figment.extract()?;
    validate(&config)?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the default path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Validation ──────────────────────────────────────────────────────

pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let engine = &cfg.engine;
    for (field, value) in [
        ("engine.timeout", engine.timeout),
        ("engine.connect_timeout", engine.connect_timeout),
        ("engine.reconnect_interval", engine.reconnect_interval),
        ("engine.keepalive_interval", engine.keepalive_interval),
    ] {
        if value == 0 {
            return Err(invalid(field, "must be at least 1 second"));
        }
    }

    EnvFilter::try_new(&cfg.logging.level).map_err(|e| invalid("logging.level", e.to_string()))?;

    let mut seen = HashSet::new();
    for entry in &cfg.hosts {
        if entry.name.trim().is_empty() {
            return Err(invalid("hosts.name", "must not be empty"));
        }
        if entry.address.trim().is_empty() {
            return Err(invalid(format!("hosts.{}.address", entry.name), "must not be empty"));
        }
        if entry.port == 0 || entry.push_port == Some(0) {
            return Err(invalid(format!("hosts.{}.port", entry.name), "must not be 0"));
        }
        parse_scheme(entry)?;

        let identity = (
            entry.address.as_str(),
            entry.port,
            entry.push_port.unwrap_or(entry.port),
        );
        if !seen.insert(identity) {
            return Err(invalid(
                format!("hosts.{}", entry.name),
                "duplicates the address and ports of another host",
            ));
        }
    }
    Ok(())
}

fn parse_scheme(entry: &HostEntry) -> Result<Scheme, ConfigError> {
    match entry.scheme.as_str() {
        "http" => Ok(Scheme::Http),
        "https" => Ok(Scheme::Https),
        other => Err(invalid(
            format!("hosts.{}.scheme", entry.name),
            format!("expected 'http' or 'https', got '{other}'"),
        )),
    }
}

// ── Translation ─────────────────────────────────────────────────────

pub fn to_engine_config(cfg: &Config) -> EngineConfig {
    let engine = &cfg.engine;
    EngineConfig {
        request_timeout: Duration::from_secs(engine.timeout),
        connect_timeout: Duration::from_secs(engine.connect_timeout),
        reconnect_interval: Duration::from_secs(engine.reconnect_interval),
        keepalive_interval: Duration::from_secs(engine.keepalive_interval),
        user_agent: engine.user_agent.clone(),
        accept_invalid_certs: engine.insecure,
    }
}

/// Build the configured hosts, resolving client secrets.
pub fn hosts(cfg: &Config) -> Result<Vec<Host>, ConfigError> {
    cfg.hosts.iter().map(to_host).collect()
}

fn to_host(entry: &HostEntry) -> Result<Host, ConfigError> {
    let mut host = Host::new(entry.name.clone(), entry.address.clone(), entry.port)
        .with_scheme(parse_scheme(entry)?);
    if let Some(push_port) = entry.push_port {
        host = host.with_push_port(push_port);
    }
    if let Some(ref auth) = entry.auth {
        host = host.with_auth(Authentication {
            token_endpoint: auth.token_endpoint.clone(),
            client_id: auth.client_id.clone(),
            client_secret: resolve_client_secret(auth, &entry.name)?,
            grants: auth.grants.clone(),
        });
    }
    Ok(host)
}

/// Secret from the named env var first, then the plaintext field.
fn resolve_client_secret(auth: &AuthEntry, host: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = auth.client_secret_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Some(ref secret) = auth.client_secret {
        return Ok(SecretString::from(secret.clone()));
    }

    Err(ConfigError::NoCredentials { host: host.into() })
}

// ── Tracing ─────────────────────────────────────────────────────────

/// Install a global `fmt` subscriber. `RUST_LOG` wins over
/// `logging.level`.
pub fn init_tracing(logging: &Logging) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| invalid("logging.level", e.to_string()))?;

    let result = if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };
    result.map_err(|e| ConfigError::Tracing(e.to_string()))
}
