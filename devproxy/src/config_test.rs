use std::collections::HashMap;

use super::*;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn defaults_bind_all_interfaces_on_8080() {
    let config = ProxyConfig::from_lookup(lookup(&[("PROXY_TARGET", "https://10.0.0.5:5000/")])).unwrap();
    assert_eq!(config.listen, "0.0.0.0:8080".parse().unwrap());
    assert_eq!(config.target, "https://10.0.0.5:5000");
    assert_eq!(config.prefix, "/api");
    assert!(config.tls.is_none());
    assert!(!config.insecure_upstream);
    assert!(config.static_dir.is_none());
}

#[test]
fn target_is_required() {
    assert!(matches!(ProxyConfig::from_lookup(lookup(&[])), Err(ProxyError::Missing("PROXY_TARGET"))));
    assert!(matches!(
        ProxyConfig::from_lookup(lookup(&[("PROXY_TARGET", "  ")])),
        Err(ProxyError::Missing("PROXY_TARGET"))
    ));
}

#[test]
fn target_must_be_http_origin() {
    for bad in ["ftp://host", "not a url", "https://host/?q=1"] {
        let err = ProxyConfig::from_lookup(lookup(&[("PROXY_TARGET", bad)])).unwrap_err();
        assert!(matches!(err, ProxyError::Invalid { key: "PROXY_TARGET", .. }), "{bad}: {err:?}");
    }
}

#[test]
fn tls_needs_both_files() {
    let err = ProxyConfig::from_lookup(lookup(&[("PROXY_TARGET", "http://h"), ("PROXY_TLS_CERT", "c.pem")]))
        .unwrap_err();
    assert!(matches!(err, ProxyError::Invalid { key: "PROXY_TLS_KEY", .. }));

    let config = ProxyConfig::from_lookup(lookup(&[
        ("PROXY_TARGET", "http://h"),
        ("PROXY_TLS_CERT", "c.pem"),
        ("PROXY_TLS_KEY", "k.pem"),
    ]))
    .unwrap();
    assert_eq!(config.tls, Some(TlsFiles { cert: "c.pem".into(), key: "k.pem".into() }));
}

#[test]
fn prefix_is_normalized_and_checked() {
    let config = ProxyConfig::from_lookup(lookup(&[("PROXY_TARGET", "http://h"), ("PROXY_PREFIX", "/backend/")])).unwrap();
    assert_eq!(config.prefix, "/backend");

    for bad in ["/", "api", "/a{b}"] {
        let err = ProxyConfig::from_lookup(lookup(&[("PROXY_TARGET", "http://h"), ("PROXY_PREFIX", bad)])).unwrap_err();
        assert!(matches!(err, ProxyError::Invalid { key: "PROXY_PREFIX", .. }), "{bad}");
    }
}

#[test]
fn host_and_port_overrides() {
    let config = ProxyConfig::from_lookup(lookup(&[
        ("PROXY_TARGET", "http://h"),
        ("PROXY_HOST", "127.0.0.1"),
        ("PROXY_PORT", "9443"),
    ]))
    .unwrap();
    assert_eq!(config.listen, "127.0.0.1:9443".parse().unwrap());

    let err = ProxyConfig::from_lookup(lookup(&[("PROXY_TARGET", "http://h"), ("PROXY_PORT", "70000")])).unwrap_err();
    assert!(matches!(err, ProxyError::Invalid { key: "PROXY_PORT", .. }));
}

#[test]
fn insecure_upstream_is_opt_in() {
    for (raw, expected) in [("1", true), ("on", true), ("YES", true), ("false", false), ("off", false)] {
        let config =
            ProxyConfig::from_lookup(lookup(&[("PROXY_TARGET", "http://h"), ("PROXY_INSECURE_UPSTREAM", raw)])).unwrap();
        assert_eq!(config.insecure_upstream, expected, "{raw}");
    }
    let err = ProxyConfig::from_lookup(lookup(&[("PROXY_TARGET", "http://h"), ("PROXY_INSECURE_UPSTREAM", "maybe")]))
        .unwrap_err();
    assert!(matches!(err, ProxyError::Invalid { key: "PROXY_INSECURE_UPSTREAM", .. }));
}
