use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router as AxumRouter;
use axum::body::Bytes;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap as AxumHeaders, StatusCode as AxumStatus};
use axum::routing::{delete, get, post, put};
use serde_json::json;

use super::*;
use crate::session::{MemoryStore, SessionStore, TOKEN_KEY, USERNAME_KEY};

#[derive(Clone, Default)]
struct Seen {
    content_type: Arc<Mutex<Option<String>>>,
    query: Arc<Mutex<Option<String>>>,
    upload: Arc<Mutex<Option<String>>>,
}

async fn login(State(seen): State<Seen>, headers: AxumHeaders, Json(body): Json<Value>) -> (AxumStatus, Json<Value>) {
    *seen.content_type.lock().unwrap() =
        headers.get("content-type").and_then(|v| v.to_str().ok()).map(ToOwned::to_owned);
    match (body["username"].as_str(), body["password"].as_str()) {
        (Some("alice"), Some("secret")) => (AxumStatus::OK, Json(json!({ "message": "Login successful", "token": "tok-1" }))),
        (Some("alice"), _) => (AxumStatus::UNAUTHORIZED, Json(json!({ "message": "Invalid password" }))),
        _ => (AxumStatus::NOT_FOUND, Json(json!({ "message": "User not found" }))),
    }
}

async fn get_files(State(seen): State<Seen>, Query(q): Query<std::collections::HashMap<String, String>>) -> Json<Value> {
    let mut pairs: Vec<_> = q.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    *seen.query.lock().unwrap() = Some(pairs.join("&"));
    Json(json!({
        "files": [{ "file_id": 3, "file_name": "a.csv", "file_size": "1.00 KB", "upload_time": "2024-01-01 00:00:00" }],
        "total": 6,
        "total_pages": 2,
        "current_page": 1
    }))
}

async fn upload_file(State(seen): State<Seen>, headers: AxumHeaders, body: Bytes) -> Json<Value> {
    let ct = headers.get("content-type").and_then(|v| v.to_str().ok()).unwrap_or_default().to_owned();
    let text = String::from_utf8_lossy(&body).into_owned();
    *seen.upload.lock().unwrap() = Some(format!("{ct}\n{text}"));
    Json(json!({ "message": "File uploaded successfully", "file_name": "a.csv" }))
}

async fn current_user(headers: AxumHeaders) -> (AxumStatus, Json<Value>) {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some("Bearer tok-1") => (AxumStatus::OK, Json(json!({ "username": "alice" }))),
        _ => (AxumStatus::UNAUTHORIZED, Json(json!({ "error": "Token is invalid or expired" }))),
    }
}

async fn delete_record(AxumPath(id): AxumPath<i64>) -> (AxumStatus, String) {
    if id == 1 {
        (AxumStatus::OK, json!({ "message": "Record deleted successfully" }).to_string())
    } else {
        (AxumStatus::INTERNAL_SERVER_ERROR, "boom".to_owned())
    }
}

async fn spawn_backend() -> (String, Seen) {
    let seen = Seen::default();
    let app = AxumRouter::new()
        .route("/", get(|| async { "Hello, World!" }))
        .route("/login", post(login))
        .route("/get_files", get(get_files))
        .route("/upload_file", post(upload_file))
        .route("/check_file_exists", get(|| async { Json(json!({ "exists": true })) }))
        .route("/users/api/current_user", get(current_user))
        .route("/delete_diagnosis_record/{id}", delete(delete_record))
        .route(
            "/users/api/users/login/{id}",
            put(|AxumPath(id): AxumPath<i64>| async move {
                if id == 7 {
                    (AxumStatus::OK, Json(json!({ "message": "Last login time updated successfully" })))
                } else {
                    (AxumStatus::NOT_FOUND, Json(json!({ "message": "User not found" })))
                }
            }),
        )
        .route(
            "/get_diagnosis_records",
            get(|| async {
                Json(json!({ "records": [{
                    "record_id": 9,
                    "file_name": "a.csv",
                    "model_name": "m.pth",
                    "created_at": "Mon, 01 Jan 2024 00:00:00 GMT",
                    "report_path": "reports/r.pdf",
                    "report_name": "r.pdf"
                }] }))
            }),
        )
        .route(
            "/data_management",
            get(|| async { Json(json!({ "dataRecords": [{ "id": 1, "name": "a.csv", "uploadedAt": "2024-01-01" }] })) }),
        )
        .route("/reports/{name}", get(|AxumPath(name): AxumPath<String>| async move { format!("report:{name}") }))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn client(base_url: &str) -> ApiClient {
    let config = ApiConfig { base_url: base_url.to_owned(), ..ApiConfig::default() };
    ApiClient::new(&config).unwrap()
}

// =============================================================
// error bodies
// =============================================================

#[test]
fn server_message_prefers_message_then_error_then_body() {
    assert_eq!(server_message(r#"{"message":"nope","error":"x"}"#), "nope");
    assert_eq!(server_message(r#"{"error":"Token is missing"}"#), "Token is missing");
    assert_eq!(server_message("  plain failure \n"), "plain failure");
    assert_eq!(server_message(r#"{"message":42}"#), r#"{"message":42}"#);
}

// =============================================================
// calls
// =============================================================

#[tokio::test]
async fn login_sends_json_content_type_and_returns_token() {
    let (base, seen) = spawn_backend().await;
    let response = client(&base).login("alice", "secret").await.unwrap();
    assert_eq!(response.token, "tok-1");
    assert_eq!(seen.content_type.lock().unwrap().as_deref(), Some(crate::config::DEFAULT_CONTENT_TYPE));
}

#[tokio::test]
async fn login_failure_surfaces_status_and_message() {
    let (base, _) = spawn_backend().await;
    let err = client(&base).login("alice", "wrong").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert!(matches!(err, ApiError::Server { ref message, .. } if message == "Invalid password"));

    let err = client(&base).login("bob", "x").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn touch_last_login_uses_put_and_maps_missing_user() {
    let (base, _) = spawn_backend().await;
    let ack = client(&base).touch_last_login(7).await.unwrap();
    assert_eq!(ack.message, "Last login time updated successfully");

    let err = client(&base).touch_last_login(8).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert!(matches!(err, ApiError::Server { ref message, .. } if message == "User not found"));
}

#[tokio::test]
async fn login_and_store_persists_credential() {
    let (base, _) = spawn_backend().await;
    let store = Arc::new(MemoryStore::new());
    let session = SessionContext::new(store.clone());

    let credential = client(&base).login_and_store(&session, "alice", "secret").await.unwrap();
    assert_eq!(credential.token, "tok-1");
    assert!(session.is_authenticated());
    assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("tok-1"));
    assert_eq!(store.get(USERNAME_KEY).unwrap().as_deref(), Some("alice"));
}

#[tokio::test]
async fn failed_login_leaves_session_untouched() {
    let (base, _) = spawn_backend().await;
    let session = SessionContext::new(Arc::new(MemoryStore::new()));
    assert!(client(&base).login_and_store(&session, "alice", "bad").await.is_err());
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn list_files_sends_page_query() {
    let (base, seen) = spawn_backend().await;
    let page = client(&base).list_files(Page { page: 2, page_size: 5 }).await.unwrap();
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.files[0].file_name, "a.csv");
    assert_eq!(seen.query.lock().unwrap().as_deref(), Some("page=2&page_size=5"));
}

#[tokio::test]
async fn upload_file_sends_multipart_field() {
    let (base, seen) = spawn_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.csv");
    std::fs::write(&path, "x,y\n1,2\n").unwrap();

    let receipt = client(&base).upload_file(&path).await.unwrap();
    assert_eq!(receipt.name, "a.csv");

    let raw = seen.upload.lock().unwrap().clone().unwrap();
    assert!(raw.starts_with("multipart/form-data; boundary="), "{raw}");
    assert!(raw.contains(r#"name="file"; filename="a.csv""#), "{raw}");
    assert!(raw.contains("1,2"));
}

#[tokio::test]
async fn upload_missing_file_fails_before_request() {
    let err = client("http://127.0.0.1:9").upload_file(Path::new("/definitely/not/here.csv")).await.unwrap_err();
    assert!(matches!(err, ApiError::Upload { .. }));
}

#[tokio::test]
async fn current_user_uses_bearer_token() {
    let (base, _) = spawn_backend().await;
    let api = client(&base);
    assert_eq!(api.current_user("tok-1").await.unwrap().username, "alice");

    let err = api.current_user("stale").await.unwrap_err();
    assert!(matches!(err, ApiError::Server { ref message, .. } if message == "Token is invalid or expired"));
}

#[tokio::test]
async fn envelopes_are_unwrapped() {
    let (base, _) = spawn_backend().await;
    let api = client(&base);
    let records = api.diagnosis_records().await.unwrap();
    assert_eq!(records[0].record_id, 9);
    assert_eq!(records[0].report_name, "r.pdf");

    let data = api.data_records().await.unwrap();
    assert_eq!(data[0].uploaded_at, "2024-01-01");
    assert!(api.file_exists("a.csv").await.unwrap());
}

#[tokio::test]
async fn plain_text_error_body_is_kept() {
    let (base, _) = spawn_backend().await;
    let api = client(&base);
    assert_eq!(api.delete_diagnosis_record(1).await.unwrap().message, "Record deleted successfully");
    let err = api.delete_diagnosis_record(2).await.unwrap_err();
    assert!(matches!(err, ApiError::Server { status, ref message } if status == StatusCode::INTERNAL_SERVER_ERROR && message == "boom"));
}

#[tokio::test]
async fn fetch_report_accepts_server_relative_path() {
    let (base, _) = spawn_backend().await;
    let bytes = client(&base).fetch_report("/reports/tsne.png").await.unwrap();
    assert_eq!(bytes, b"report:tsne.png");
}

#[tokio::test]
async fn ping_and_raw_request() {
    let (base, _) = spawn_backend().await;
    let api = client(&base);
    api.ping().await.unwrap();
    let value = api.request_json(Method::GET, "/check_file_exists", None, None).await.unwrap();
    assert_eq!(value, json!({ "exists": true }));
}
