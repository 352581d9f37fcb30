use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: std::io::Error },
    #[error("tls setup failed: {0}")]
    Tls(String),
    #[error("upstream client failed: {0}")]
    Client(#[from] reqwest::Error),
    #[error("server failed: {0}")]
    Serve(#[from] std::io::Error),
}
