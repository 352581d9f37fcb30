use super::*;

#[test]
fn verifying_path_keeps_default_connector() {
    assert!(connector(false, "wss://diag.example").unwrap().is_none());
}

#[test]
fn insecure_path_builds_rustls_connector() {
    let built = connector(true, "wss://diag.example").unwrap();
    assert!(matches!(built, Some(Connector::Rustls(_))));
}

#[test]
fn insecure_verifier_still_offers_signature_schemes() {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = AcceptAnyCert(provider);
    assert!(!verifier.supported_verify_schemes().is_empty());
}
