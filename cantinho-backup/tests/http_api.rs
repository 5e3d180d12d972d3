#![cfg(unix)]

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use cantinho_backup::api;
use common::{dump_writing, Harness, Stub};
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "cantinho-test-boundary";

fn router(harness: &Harness) -> Router {
    api::create_router(api::create_app_state(harness.orchestrator(), 16))
}

fn restore_request(field: &str, file_name: Option<&str>, content: &[u8]) -> Request<Body> {
    let disposition = match file_name {
        Some(name) => format!("form-data; name=\"{field}\"; filename=\"{name}\""),
        None => format!("form-data; name=\"{field}\""),
    };

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/admin/backup/restore")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn download_streams_dump_as_attachment() {
    let mut harness = Harness::new();
    harness.stub(Stub::Dump, &dump_writing("-- dump\nSELECT 1;\n"));

    let response = router(&harness)
        .oneshot(
            Request::builder()
                .uri("/api/admin/backup/download")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"backup_cantinho_"));
    assert!(disposition.ends_with(".sql\""));
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "18");

    assert_eq!(body_bytes(response).await, b"-- dump\nSELECT 1;\n");
    assert!(harness.scratch_entries().is_empty());
}

#[tokio::test]
async fn download_failure_is_bare_server_error() {
    let mut harness = Harness::new();
    harness.stub(Stub::Dump, "echo 'pg_dump: error: permission denied' >&2\nexit 1\n");

    let response = router(&harness)
        .oneshot(
            Request::builder()
                .uri("/api/admin/backup/download")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_bytes(response).await.is_empty());
    assert!(harness.scratch_entries().is_empty());
}

#[tokio::test]
async fn restore_success_returns_message() {
    let mut harness = Harness::new();
    harness.stub(Stub::ArchiveRestore, "echo 'pg_restore: NOTICE: skipping' >&2\nexit 1\n");

    let response = router(&harness)
        .oneshot(restore_request("file", Some("migration.dump"), b"PGDMP"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["message"], "restored");
}

#[tokio::test]
async fn restore_without_filename_defaults_to_archive() {
    let mut harness = Harness::new();
    harness.stub(Stub::ArchiveRestore, "exit 0\n");

    let response = router(&harness)
        .oneshot(restore_request("file", None, b"PGDMP"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn restore_empty_file_is_client_error() {
    let harness = Harness::new();

    let response = router(&harness)
        .oneshot(restore_request("file", Some("backup.sql"), b""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("not provided"));
}

#[tokio::test]
async fn restore_missing_file_field_is_client_error() {
    let harness = Harness::new();

    let response = router(&harness)
        .oneshot(restore_request("attachment", Some("backup.sql"), b"SELECT 1;"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn restore_failure_embeds_tool_diagnostics() {
    let mut harness = Harness::new();
    harness.stub(
        Stub::ScriptApply,
        "echo 'ERROR:  syntax error at or near \"CRATE\"' >&2\nexit 2\n",
    );

    let response = router(&harness)
        .oneshot(restore_request("file", Some("broken.sql"), b"CRATE TABLE x();"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Restore failed: "), "{error}");
    assert!(error.contains("syntax error"), "{error}");
    assert!(harness.scratch_entries().is_empty());
}

#[tokio::test]
async fn health_reports_ok() {
    let harness = Harness::new();

    let response = router(&harness)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_operations"], 0);
}

#[tokio::test]
async fn finished_operations_leave_no_active_entries() {
    let mut harness = Harness::new();
    harness.stub(Stub::ScriptApply, "echo 'ERROR:  boom' >&2\nexit 2\n");
    harness.stub(Stub::Dump, "echo 'pg_dump: error: boom' >&2\nexit 1\n");
    let app = router(&harness);

    let restore = app
        .clone()
        .oneshot(restore_request("file", Some("broken.sql"), b"SELECT 1;"))
        .await
        .unwrap();
    assert_eq!(restore.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let download = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/backup/download")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(download.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let health = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(health).await["active_operations"], 0);
}
