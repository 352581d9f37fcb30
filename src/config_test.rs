use std::collections::HashMap;

use super::*;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    move |key: &str| map.get(key).cloned()
}

fn with_base(base: &str) -> PortalConfig {
    let mut config = PortalConfig::default();
    config.api.base_url = base.to_owned();
    config
}

// =============================================================
// defaults
// =============================================================

#[test]
fn defaults_match_transport_bootstrap() {
    let config = with_base("https://diag.example:5000").validate().unwrap();
    assert_eq!(config.api.timeout_ms, 300_000);
    assert_eq!(config.api.content_type, "application/json");
    assert!(!config.api.accept_invalid_certs);
    assert!(!config.realtime.accept_invalid_certs);
    assert_eq!(config.realtime.namespace, "/");
    assert_eq!(config.realtime.startup_message, "Hello from client!");
    assert_eq!(config.router.initial_route, "/welcome");
}

#[test]
fn missing_base_url_is_rejected() {
    let err = PortalConfig::default().validate().unwrap_err();
    assert!(matches!(err, ConfigError::Missing("api.base_url")));
}

// =============================================================
// realtime origin
// =============================================================

#[test]
fn realtime_url_derived_from_https_origin() {
    let config = with_base("https://diag.example:5000/").validate().unwrap();
    assert_eq!(config.api.base_url, "https://diag.example:5000");
    assert_eq!(config.realtime.url, "wss://diag.example:5000");
}

#[test]
fn realtime_url_derived_from_http_origin() {
    assert_eq!(realtime_origin("http://127.0.0.1:5000").unwrap(), "ws://127.0.0.1:5000");
}

#[test]
fn explicit_realtime_url_must_be_websocket_scheme() {
    let mut config = with_base("https://diag.example");
    config.realtime.url = "https://diag.example".to_owned();
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("realtime.url"), "{err}");
}

#[test]
fn base_url_with_unsupported_scheme_is_rejected() {
    let err = with_base("ftp://diag.example").validate().unwrap_err().to_string();
    assert!(err.contains("api.base_url"), "{err}");
}

// =============================================================
// TOML + environment layering
// =============================================================

#[test]
fn toml_sections_parse_with_partial_fields() {
    let raw = r#"
        [api]
        base_url = "https://diag.example:5000"
        timeout_ms = 1000

        [realtime]
        accept_invalid_certs = true
        send_queue_capacity = 8

        [realtime.reconnect]
        enabled = false

        [logging]
        format = "json"
    "#;
    let config = PortalConfig::from_toml(raw).unwrap().validate().unwrap();
    assert_eq!(config.api.timeout_ms, 1000);
    assert!(config.realtime.accept_invalid_certs);
    assert_eq!(config.realtime.send_queue_capacity, 8);
    assert!(!config.realtime.reconnect.enabled);
    assert_eq!(config.realtime.reconnect.max_backoff_ms, DEFAULT_MAX_BACKOFF_MS);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn env_overrides_file_values() {
    let mut config = PortalConfig::from_toml("[api]\nbase_url = \"https://a.example\"\n").unwrap();
    config
        .apply_env(env(&[
            ("PORTAL_API_BASE_URL", "https://b.example"),
            ("PORTAL_API_TIMEOUT_MS", "42"),
            ("PORTAL_REALTIME_ACCEPT_INVALID_CERTS", "yes"),
            ("PORTAL_SESSION_PATH", "/tmp/portal-session.json"),
        ]))
        .unwrap();
    let config = config.validate().unwrap();
    assert_eq!(config.api.base_url, "https://b.example");
    assert_eq!(config.api.timeout_ms, 42);
    assert!(config.realtime.accept_invalid_certs);
    assert_eq!(config.session.resolved_path(), PathBuf::from("/tmp/portal-session.json"));
}

#[test]
fn env_bool_rejects_garbage() {
    let mut config = PortalConfig::default();
    let err = config.apply_env(env(&[("PORTAL_API_ACCEPT_INVALID_CERTS", "maybe")])).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { key: "PORTAL_API_ACCEPT_INVALID_CERTS", .. }));
}

#[test]
fn env_log_format_must_be_known() {
    let mut config = PortalConfig::default();
    assert!(config.apply_env(env(&[("PORTAL_LOG_FORMAT", "xml")])).is_err());
}

#[test]
fn malformed_toml_is_parse_error() {
    assert!(matches!(PortalConfig::from_toml("[api"), Err(ConfigError::Parse(_))));
}

#[test]
fn zero_timeout_and_queue_are_rejected() {
    let mut config = with_base("https://diag.example");
    config.api.timeout_ms = 0;
    assert!(config.validate().is_err());

    let mut config = with_base("https://diag.example");
    config.realtime.send_queue_capacity = 0;
    assert!(config.validate().is_err());
}

#[test]
fn backoff_bounds_are_checked() {
    let mut config = with_base("https://diag.example");
    config.realtime.reconnect.initial_backoff_ms = 5_000;
    config.realtime.reconnect.max_backoff_ms = 1_000;
    assert!(config.validate().is_err());
}

#[test]
fn hash_style_initial_route_is_accepted() {
    let mut config = with_base("https://diag.example");
    config.router.initial_route = "#/login".to_owned();
    assert!(config.validate().is_ok());
}

#[test]
fn from_file_reports_missing_path() {
    let err = PortalConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
