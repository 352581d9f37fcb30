//! Development reverse proxy.
//!
//! Serves the portal over one origin: `<prefix>/...` goes to the diagnosis
//! backend, everything else to an optional static directory. Settings come
//! from the environment (see [`config`]); a `.env` file is honoured.

mod config;
mod error;
mod proxy;
mod tls;

use tracing_subscriber::EnvFilter;

use crate::config::ProxyConfig;
use crate::error::ProxyError;

#[tokio::main]
async fn main() -> Result<(), ProxyError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ProxyConfig::from_env()?;
    let app = proxy::app(&config)?;
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .map_err(|source| ProxyError::Bind { addr: config.listen, source })?;

    match &config.tls {
        Some(files) => {
            let acceptor = tls::acceptor(files)?;
            tracing::info!(listen = %config.listen, upstream = %config.target, prefix = %config.prefix, "devproxy listening (https)");
            tls::serve(listener, acceptor, app).await;
        }
        None => {
            tracing::info!(listen = %config.listen, upstream = %config.target, prefix = %config.prefix, "devproxy listening (http)");
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}
