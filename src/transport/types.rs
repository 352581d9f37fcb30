//! Request and response bodies for the diagnosis backend.
//!
//! Timestamps are kept as the strings the server sends; the backend mixes ISO
//! 8601 and RFC 1123 renderings depending on the endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// Pagination query for file and model listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: DEFAULT_PAGE, page_size: DEFAULT_PAGE_SIZE }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub email: &'a str,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub message: String,
    pub token: String,
}

/// Generic `{ "message": ... }` acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Ack {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: String,
    pub created_at: Option<String>,
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CurrentUser {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileEntry {
    pub file_id: i64,
    pub file_name: String,
    pub file_size: Option<String>,
    pub upload_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilePage {
    pub files: Vec<FileEntry>,
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelEntry {
    pub model_id: i64,
    #[serde(default)]
    pub model_name: Option<String>,
    pub model_size: Option<String>,
    pub upload_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelPage {
    pub models: Vec<ModelEntry>,
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u64,
}

/// Result of a file or model upload; `name` is the stored file name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(alias = "file_name", alias = "model_name")]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Exists {
    pub exists: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DiagnoseRequest {
    pub file_id: i64,
    pub model_id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiagnosisOutcome {
    pub diagnosis_result: Value,
    /// Server-relative URL under `/reports/`.
    pub tsne_image_path: String,
    pub confusion_matrix_image_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiagnosisRecord {
    pub record_id: i64,
    pub file_name: String,
    pub model_name: String,
    pub created_at: Option<String>,
    #[serde(default)]
    pub report_path: String,
    #[serde(default)]
    pub report_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RecordsEnvelope {
    pub records: Vec<DiagnosisRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DataRecord {
    pub id: i64,
    pub name: String,
    #[serde(rename = "uploadedAt")]
    pub uploaded_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataRecordsEnvelope {
    #[serde(rename = "dataRecords")]
    pub data_records: Vec<DataRecord>,
}
