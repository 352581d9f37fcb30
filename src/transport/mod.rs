//! HTTP transport to the diagnosis backend.
//!
//! ARCHITECTURE
//! ============
//! One `reqwest::Client` per process, built from [`ApiConfig`] with the
//! default `Content-Type` header and a fixed per-call timeout. Typed helpers
//! below cover the backend's routes; [`ApiClient::request_json`] is the escape
//! hatch for anything else.
//!
//! ERROR HANDLING
//! ==============
//! No retries and no interception. Non-2xx responses become
//! [`ApiError::Server`] with the body's `message` (or `error`) field so callers
//! decide what to surface.

pub mod types;

use std::path::Path;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ApiConfig;
use crate::session::{SessionContext, SessionCredential, StoreError};

pub use types::*;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("server returned {status}: {message}")]
    Server { status: StatusCode, message: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to read upload {path}: {source}")]
    Upload { path: String, source: std::io::Error },
    #[error("session store failed: {0}")]
    Session(#[from] StoreError),
}

impl ApiError {
    /// HTTP status for server-side failures.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Server { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build the shared client. `config` must already be validated.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidHeader`] for an unusable content type and
    /// [`ApiError::Http`] if the TLS backend cannot be initialised.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(&config.content_type)?);

        if config.accept_invalid_certs {
            tracing::warn!(
                base_url = %config.base_url,
                "TLS certificate validation is DISABLED for the API transport"
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_owned() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Arbitrary JSON call. `token` is sent as a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or a non-2xx status. An
    /// empty or non-JSON success body yields `Value::Null`.
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Value, ApiError> {
        let mut request = self.http.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// `GET /` on the backend; any 2xx counts as reachable.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the backend is unreachable or unhealthy.
    pub async fn ping(&self) -> Result<(), ApiError> {
        self.send(self.http.get(self.url("/"))).await?;
        Ok(())
    }

    // =========================================================================
    // AUTH + USERS
    // =========================================================================

    /// # Errors
    ///
    /// Returns [`ApiError::Server`] with 404 for unknown users and 401 for a
    /// wrong password.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = Credentials { username, password };
        self.json(self.http.post(self.url("/login")).json(&body)).await
    }

    /// Log in and persist the credential for the route guards.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the login fails or the credential cannot be
    /// stored.
    pub async fn login_and_store(
        &self,
        session: &SessionContext,
        username: &str,
        password: &str,
    ) -> Result<SessionCredential, ApiError> {
        let response = self.login(username, password).await?;
        let credential = SessionCredential { token: response.token, username: username.to_owned() };
        session.save(&credential)?;
        tracing::info!(username, "logged in");
        Ok(credential)
    }

    /// # Errors
    ///
    /// Returns [`ApiError::Server`] with 400 for missing fields or a taken
    /// username.
    pub async fn register(&self, username: &str, password: &str, email: &str) -> Result<Ack, ApiError> {
        let body = Registration { username, password, email };
        self.json(self.http.post(self.url("/register")).json(&body)).await
    }

    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.json(self.http.get(self.url("/users/api/users"))).await
    }

    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn delete_user(&self, user_id: i64) -> Result<Ack, ApiError> {
        self.json(self.http.delete(self.url(&format!("/users/api/users/{user_id}")))).await
    }

    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn touch_last_login(&self, user_id: i64) -> Result<Ack, ApiError> {
        self.json(self.http.put(self.url(&format!("/users/api/users/login/{user_id}")))).await
    }

    /// Ask the server who `token` belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Server`] with 401 for a missing, invalid or
    /// expired token.
    pub async fn current_user(&self, token: &str) -> Result<CurrentUser, ApiError> {
        self.json(self.http.get(self.url("/users/api/current_user")).bearer_auth(token)).await
    }

    // =========================================================================
    // FILES + MODELS
    // =========================================================================

    /// Upload a data file as multipart field `file`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Upload`] if the local file cannot be read and
    /// [`ApiError::Server`] for rejected types or duplicates.
    pub async fn upload_file(&self, path: &Path) -> Result<UploadReceipt, ApiError> {
        self.upload("/upload_file", "file", path).await
    }

    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn list_files(&self, page: Page) -> Result<FilePage, ApiError> {
        self.json(self.http.get(self.url("/get_files")).query(&page)).await
    }

    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn delete_file(&self, file_id: i64) -> Result<Ack, ApiError> {
        self.json(self.http.delete(self.url(&format!("/delete_file/{file_id}")))).await
    }

    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn file_exists(&self, file_name: &str) -> Result<bool, ApiError> {
        let request = self.http.get(self.url("/check_file_exists")).query(&[("file_name", file_name)]);
        Ok(self.json::<Exists>(request).await?.exists)
    }

    /// Upload a model file as multipart field `model`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Upload`] if the local file cannot be read and
    /// [`ApiError::Server`] for rejected extensions or duplicates.
    pub async fn upload_model(&self, path: &Path) -> Result<UploadReceipt, ApiError> {
        self.upload("/upload_model", "model", path).await
    }

    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn list_models(&self, page: Page) -> Result<ModelPage, ApiError> {
        self.json(self.http.get(self.url("/get_models")).query(&page)).await
    }

    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn delete_model(&self, model_id: i64) -> Result<Ack, ApiError> {
        self.json(self.http.delete(self.url(&format!("/delete_model/{model_id}")))).await
    }

    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn model_exists(&self, model_name: &str) -> Result<bool, ApiError> {
        let request = self.http.get(self.url("/check_model_exists")).query(&[("model_name", model_name)]);
        Ok(self.json::<Exists>(request).await?.exists)
    }

    // =========================================================================
    // DIAGNOSIS + REPORTS
    // =========================================================================

    /// Run a model against a data file. Can take minutes; bounded only by the
    /// configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Server`] for unknown ids or script failures.
    pub async fn diagnose(&self, file_id: i64, model_id: i64) -> Result<DiagnosisOutcome, ApiError> {
        let body = DiagnoseRequest { file_id, model_id };
        self.json(self.http.post(self.url("/diagnose")).json(&body)).await
    }

    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn diagnosis_records(&self) -> Result<Vec<DiagnosisRecord>, ApiError> {
        let envelope: RecordsEnvelope = self.json(self.http.get(self.url("/get_diagnosis_records"))).await?;
        Ok(envelope.records)
    }

    /// # Errors
    ///
    /// Returns [`ApiError::Server`] with 404 for an unknown record.
    pub async fn delete_diagnosis_record(&self, record_id: i64) -> Result<Ack, ApiError> {
        self.json(self.http.delete(self.url(&format!("/delete_diagnosis_record/{record_id}")))).await
    }

    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn data_records(&self) -> Result<Vec<DataRecord>, ApiError> {
        let envelope: DataRecordsEnvelope = self.json(self.http.get(self.url("/data_management"))).await?;
        Ok(envelope.data_records)
    }

    /// Download a generated report or image from `/reports/<name>`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn fetch_report(&self, name: &str) -> Result<Vec<u8>, ApiError> {
        let name = name.trim_start_matches("/reports/");
        let response = self.send(self.http.get(self.url(&format!("/reports/{name}")))).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // =========================================================================
    // PLUMBING
    // =========================================================================

    async fn upload(&self, path: &str, field: &'static str, file: &Path) -> Result<UploadReceipt, ApiError> {
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|source| ApiError::Upload { path: file.display().to_string(), source })?;
        let file_name = file
            .file_name()
            .map_or_else(|| "upload".to_owned(), |n| n.to_string_lossy().into_owned());
        let form = Form::new().part(field, Part::bytes(bytes).file_name(file_name));
        self.json(self.http.post(self.url(path)).multipart(form)).await
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = server_message(&body);
        tracing::debug!(%status, %message, "api call failed");
        Err(ApiError::Server { status, message })
    }
}

/// Pull the human readable reason out of an error body.
#[must_use]
pub fn server_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| body.trim().to_owned())
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
