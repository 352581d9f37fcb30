//! Proxy settings, read once from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `PROXY_HOST` | `0.0.0.0` |
//! | `PROXY_PORT` | `8080` |
//! | `PROXY_TARGET` | required, `http(s)://` origin |
//! | `PROXY_PREFIX` | `/api` |
//! | `PROXY_TLS_CERT` / `PROXY_TLS_KEY` | unset (plain HTTP); both or neither |
//! | `PROXY_INSECURE_UPSTREAM` | `false` |
//! | `PROXY_STATIC_DIR` | unset (non-prefixed paths 404) |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use reqwest::Url;

use crate::error::ProxyError;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_PREFIX: &str = "/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub listen: SocketAddr,
    /// Upstream origin without trailing slash.
    pub target: String,
    /// Path prefix that is forwarded and stripped, e.g. `/api`.
    pub prefix: String,
    pub tls: Option<TlsFiles>,
    pub insecure_upstream: bool,
    pub static_dir: Option<PathBuf>,
}

impl ProxyConfig {
    /// # Errors
    ///
    /// See [`ProxyConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ProxyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Missing`] without `PROXY_TARGET` and
    /// [`ProxyError::Invalid`] for anything that does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProxyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let host: IpAddr = get("PROXY_HOST")
            .unwrap_or_else(|| DEFAULT_HOST.to_owned())
            .parse()
            .map_err(|e| invalid("PROXY_HOST", e))?;
        let port = match get("PROXY_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| invalid("PROXY_PORT", e))?,
            None => DEFAULT_PORT,
        };

        let target = parse_target(&get("PROXY_TARGET").ok_or(ProxyError::Missing("PROXY_TARGET"))?)?;
        let prefix = parse_prefix(&get("PROXY_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_owned()))?;

        let tls = match (get("PROXY_TLS_CERT"), get("PROXY_TLS_KEY")) {
            (Some(cert), Some(key)) => Some(TlsFiles { cert: cert.into(), key: key.into() }),
            (None, None) => None,
            (Some(_), None) => return Err(invalid("PROXY_TLS_KEY", "required when PROXY_TLS_CERT is set")),
            (None, Some(_)) => return Err(invalid("PROXY_TLS_CERT", "required when PROXY_TLS_KEY is set")),
        };

        let insecure_upstream = match get("PROXY_INSECURE_UPSTREAM") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| invalid("PROXY_INSECURE_UPSTREAM", "expected a boolean"))?,
            None => false,
        };

        Ok(Self {
            listen: SocketAddr::new(host, port),
            target,
            prefix,
            tls,
            insecure_upstream,
            static_dir: get("PROXY_STATIC_DIR").map(PathBuf::from),
        })
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_target(raw: &str) -> Result<String, ProxyError> {
    let url = Url::parse(raw).map_err(|e| invalid("PROXY_TARGET", e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("PROXY_TARGET", format!("unsupported scheme `{}`", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("PROXY_TARGET", "missing host"));
    }
    if url.query().is_some() {
        return Err(invalid("PROXY_TARGET", "must not carry a query"));
    }
    Ok(raw.trim_end_matches('/').to_owned())
}

fn parse_prefix(raw: &str) -> Result<String, ProxyError> {
    let prefix = raw.trim_end_matches('/');
    if !prefix.starts_with('/') || prefix.len() < 2 {
        return Err(invalid("PROXY_PREFIX", "must be an absolute path other than `/`"));
    }
    if prefix.contains(['?', '#', '{', '}', '*']) {
        return Err(invalid("PROXY_PREFIX", "must be a literal path"));
    }
    Ok(prefix.to_owned())
}

fn invalid(key: &'static str, reason: impl ToString) -> ProxyError {
    ProxyError::Invalid { key, reason: reason.to_string() }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
