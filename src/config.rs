//! Portal configuration.
//!
//! DESIGN
//! ======
//! Loaded once at startup: an optional TOML file, then `PORTAL_*` environment
//! overrides, then validation. The validated config is injected into the
//! transport and realtime clients; neither reads the environment on its own.
//!
//! Certificate validation can only be disabled by an explicit flag. Nothing
//! here defaults to an insecure transport.

use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Deserialize;

pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_NAMESPACE: &str = wire::DEFAULT_NAMESPACE;
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_STARTUP_MESSAGE: &str = "Hello from client!";
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;
pub const DEFAULT_INITIAL_ROUTE: &str = "/welcome";
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Environment variable naming a TOML config file.
pub const CONFIG_PATH_ENV: &str = "PORTAL_CONFIG";

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP transport defaults applied to every API call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    /// Remote origin, e.g. `https://diag.example:5000`. Required.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_owned()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: default_timeout_ms(),
            content_type: default_content_type(),
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

/// Realtime channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RealtimeConfig {
    /// `ws://` or `wss://` origin. Derived from `api.base_url` when empty.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
    #[serde(default = "default_startup_message")]
    pub startup_message: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_owned()
}

fn default_send_queue_capacity() -> usize {
    DEFAULT_SEND_QUEUE_CAPACITY
}

fn default_startup_message() -> String {
    DEFAULT_STARTUP_MESSAGE.to_owned()
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            namespace: default_namespace(),
            accept_invalid_certs: false,
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            startup_message: default_startup_message(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct SessionConfig {
    /// Durable credential file. Defaults under the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SessionConfig {
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join("diagnosis-portal").join("session.json"))
                .unwrap_or_else(|| PathBuf::from("./session.json"))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_initial_route")]
    pub initial_route: String,
}

fn default_initial_route() -> String {
    DEFAULT_INITIAL_ROUTE.to_owned()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { initial_route: default_initial_route() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: default_log_filter(), format: LogFormat::default() }
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl PortalConfig {
    /// Load, override from the process environment, and validate.
    ///
    /// `path` wins over `PORTAL_CONFIG`; with neither, defaults are used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if any
    /// setting fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()
    }

    /// Parse a TOML file without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&raw)
    }

    /// Parse TOML text without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `PORTAL_*` overrides read through `lookup`.
    ///
    /// Recognised keys:
    /// - `PORTAL_API_BASE_URL`, `PORTAL_API_TIMEOUT_MS`, `PORTAL_API_ACCEPT_INVALID_CERTS`
    /// - `PORTAL_REALTIME_URL`, `PORTAL_REALTIME_NAMESPACE`,
    ///   `PORTAL_REALTIME_ACCEPT_INVALID_CERTS`, `PORTAL_REALTIME_RECONNECT`
    /// - `PORTAL_SESSION_PATH`, `PORTAL_INITIAL_ROUTE`
    /// - `PORTAL_LOG_FILTER`, `PORTAL_LOG_FORMAT`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a numeric, boolean or enum
    /// override does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PORTAL_API_BASE_URL") {
            self.api.base_url = value;
        }
        if let Some(value) = lookup("PORTAL_API_TIMEOUT_MS") {
            self.api.timeout_ms = parse_u64("PORTAL_API_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("PORTAL_API_ACCEPT_INVALID_CERTS") {
            self.api.accept_invalid_certs = parse_bool("PORTAL_API_ACCEPT_INVALID_CERTS", &value)?;
        }
        if let Some(value) = lookup("PORTAL_REALTIME_URL") {
            self.realtime.url = value;
        }
        if let Some(value) = lookup("PORTAL_REALTIME_NAMESPACE") {
            self.realtime.namespace = value;
        }
        if let Some(value) = lookup("PORTAL_REALTIME_ACCEPT_INVALID_CERTS") {
            self.realtime.accept_invalid_certs = parse_bool("PORTAL_REALTIME_ACCEPT_INVALID_CERTS", &value)?;
        }
        if let Some(value) = lookup("PORTAL_REALTIME_RECONNECT") {
            self.realtime.reconnect.enabled = parse_bool("PORTAL_REALTIME_RECONNECT", &value)?;
        }
        if let Some(value) = lookup("PORTAL_SESSION_PATH") {
            self.session.path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("PORTAL_INITIAL_ROUTE") {
            self.router.initial_route = value;
        }
        if let Some(value) = lookup("PORTAL_LOG_FILTER") {
            self.logging.filter = value;
        }
        if let Some(value) = lookup("PORTAL_LOG_FORMAT") {
            self.logging.format = match value.trim().to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                other => {
                    return Err(ConfigError::Invalid {
                        key: "PORTAL_LOG_FORMAT",
                        reason: format!("expected `pretty` or `json`, got `{other}`"),
                    });
                }
            };
        }
        Ok(())
    }

    /// Normalise and check every setting. Fills `realtime.url` from the API
    /// origin when unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] without an API base URL and
    /// [`ConfigError::Invalid`] for bad URLs, schemes, or zero limits.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let base = self.api.base_url.trim().trim_end_matches('/').to_owned();
        if base.is_empty() {
            return Err(ConfigError::Missing("api.base_url"));
        }
        check_url("api.base_url", &base, &["http", "https"])?;
        self.api.base_url = base;

        if self.api.timeout_ms == 0 {
            return Err(invalid("api.timeout_ms", "must be greater than zero"));
        }
        if self.api.content_type.trim().is_empty() {
            return Err(invalid("api.content_type", "must not be empty"));
        }

        let realtime = self.realtime.url.trim().trim_end_matches('/').to_owned();
        self.realtime.url = if realtime.is_empty() {
            realtime_origin(&self.api.base_url)?
        } else {
            check_url("realtime.url", &realtime, &["ws", "wss"])?;
            realtime
        };

        if !self.realtime.namespace.starts_with('/') {
            return Err(invalid("realtime.namespace", "must start with `/`"));
        }
        if self.realtime.send_queue_capacity == 0 {
            return Err(invalid("realtime.send_queue_capacity", "must be greater than zero"));
        }
        let reconnect = self.realtime.reconnect;
        if reconnect.initial_backoff_ms == 0 || reconnect.max_backoff_ms < reconnect.initial_backoff_ms {
            return Err(invalid(
                "realtime.reconnect",
                "initial_backoff_ms must be positive and not exceed max_backoff_ms",
            ));
        }

        if !self.router.initial_route.trim_start_matches('#').starts_with('/') {
            return Err(invalid("router.initial_route", "must be an absolute route path"));
        }

        Ok(self)
    }
}

/// Map an `http(s)` origin onto the matching `ws(s)` origin.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] for any other scheme.
pub fn realtime_origin(base_url: &str) -> Result<String, ConfigError> {
    if let Some(rest) = base_url.strip_prefix("https://") {
        return Ok(format!("wss://{rest}"));
    }
    if let Some(rest) = base_url.strip_prefix("http://") {
        return Ok(format!("ws://{rest}"));
    }
    Err(invalid("api.base_url", "cannot derive a realtime origin"))
}

fn check_url(key: &'static str, raw: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| invalid(key, &e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(key, &format!("scheme `{}` not one of {}", url.scheme(), schemes.join(", "))));
    }
    if url.host_str().is_none() {
        return Err(invalid(key, "missing host"));
    }
    Ok(())
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid { key, reason: reason.to_owned() }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| invalid(key, &e.to_string()))
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(key, &format!("expected a boolean, got `{other}`"))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
