//! Request forwarding.
//!
//! FORWARDING
//! ==========
//! `<prefix>` and `<prefix>/...` are sent to the upstream origin with the
//! prefix removed (`/api/login?x=1` → `<target>/login?x=1`). Method, query,
//! body and end-to-end headers pass through. Hop-by-hop headers and `Host`
//! are dropped so the upstream sees its own origin. Every forwarded request
//! carries an `x-request-id`, generated when the client sent none.
//!
//! Everything else is served from the static directory when configured,
//! otherwise answered with 404.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::error::ProxyError;

pub const REQUEST_ID: &str = "x-request-id";

/// Largest request body buffered for forwarding. Model uploads are large.
pub const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug)]
pub struct ProxyState {
    client: reqwest::Client,
    target: String,
    prefix: String,
}

/// Build the proxy router.
///
/// # Errors
///
/// Returns [`ProxyError::Client`] if the upstream client cannot be built.
pub fn app(config: &ProxyConfig) -> Result<Router, ProxyError> {
    if config.insecure_upstream {
        tracing::warn!(upstream = %config.target, "TLS certificate validation is DISABLED for the upstream");
    }
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(config.insecure_upstream)
        .build()?;
    let state = Arc::new(ProxyState { client, target: config.target.clone(), prefix: config.prefix.clone() });

    let prefix = &config.prefix;
    let router = Router::new()
        .route(prefix, any(forward))
        .route(&format!("{prefix}/"), any(forward))
        .route(&format!("{prefix}/{{*rest}}"), any(forward))
        .with_state(state);

    let router = match &config.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true)),
        None => router.fallback(not_found),
    };
    Ok(router.layer(TraceLayer::new_for_http()))
}

/// Path the upstream sees. `None` when `path` is outside the prefix.
#[must_use]
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Copy end-to-end headers. Also drops anything named by `Connection`.
#[must_use]
pub fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str()) || named.iter().any(|n| n == name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

async fn forward(State(state): State<Arc<ProxyState>>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    match state.forward(req).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(%method, %path, error = %e, "upstream request failed");
            (StatusCode::BAD_GATEWAY, format!("upstream request failed: {e}\n")).into_response()
        }
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found\n")
}

impl ProxyState {
    async fn forward(&self, req: Request) -> Result<Response, ForwardError> {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path();
        let upstream_path = strip_prefix(path, &self.prefix).unwrap_or(path);
        let mut url = format!("{}{}", self.target, upstream_path);
        if let Some(query) = parts.uri.query() {
            url.push('?');
            url.push_str(query);
        }

        let mut headers = end_to_end_headers(&parts.headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        if !headers.contains_key(REQUEST_ID) {
            if let Ok(id) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
                headers.insert(HeaderName::from_static(REQUEST_ID), id);
            }
        }
        let request_id = headers.get(REQUEST_ID).and_then(|v| v.to_str().ok()).unwrap_or("-").to_owned();

        let body = to_bytes(body, MAX_BODY_BYTES).await.map_err(ForwardError::Body)?;
        tracing::debug!(method = %parts.method, %url, %request_id, "forwarding");

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(ForwardError::Upstream)?;

        let status = upstream.status();
        let mut response_headers = end_to_end_headers(upstream.headers());
        if let Ok(id) = HeaderValue::from_str(&request_id) {
            response_headers.insert(HeaderName::from_static(REQUEST_ID), id);
        }

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

#[derive(Debug, thiserror::Error)]
enum ForwardError {
    #[error("failed to read request body: {0}")]
    Body(axum::Error),
    #[error("{0}")]
    Upstream(reqwest::Error),
}

#[cfg(test)]
#[path = "proxy_test.rs"]
mod tests;
