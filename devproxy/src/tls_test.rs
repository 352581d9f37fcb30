use std::io::Write;

use super::*;

#[test]
fn missing_files_are_reported() {
    let files = TlsFiles { cert: "/nonexistent/cert.pem".into(), key: "/nonexistent/key.pem".into() };
    let err = acceptor(&files).err().expect("acceptor should fail for missing files");
    assert!(matches!(&err, ProxyError::Tls(msg) if msg.contains("cert.pem")), "{err:?}");
}

#[test]
fn cert_file_without_certificates_is_rejected() {
    let mut cert = tempfile::NamedTempFile::new().unwrap();
    writeln!(cert, "not a certificate").unwrap();
    let err = load_certs(cert.path()).unwrap_err();
    assert!(matches!(&err, ProxyError::Tls(msg) if msg.contains("no certificates")), "{err:?}");
}
