//! Backup download and restore endpoints.
//!
//! The orchestrator call runs on its own task so a client that disconnects
//! mid-request cannot abort a restore halfway through.

use super::error::ApiError;
use super::job_tracker::OperationKind;
use super::AppState;
use crate::backup::UploadedArtifact;
use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// Multipart field carrying the uploaded backup
const UPLOAD_FIELD: &str = "file";

/// GET /api/admin/backup/download - Dump the database and stream the artifact
pub async fn download_backup(State(state): State<AppState>) -> Response {
    let orchestrator = state.orchestrator.clone();
    let result = state
        .job_tracker
        .spawn_tracked(OperationKind::Backup, async move { orchestrator.produce_backup().await })
        .await;

    let artifact = match result {
        Ok(Ok(artifact)) => artifact,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Backup download failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Backup task panicked");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let disposition = format!("attachment; filename=\"{}\"", artifact.name());
    let length = artifact.len().to_string();
    let stream = match artifact.into_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open backup artifact");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, length),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// POST /api/admin/backup/restore - Apply an uploaded backup (multipart field `file`)
pub async fn restore_backup(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content = field.bytes().await?;
        upload = Some(UploadedArtifact::new(file_name, content));
        break;
    }

    let upload = upload
        .filter(|u| !u.content.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Backup file not provided".into()))?;

    tracing::info!(
        file_name = upload.file_name.as_deref().unwrap_or("<unnamed>"),
        bytes = upload.content.len(),
        "Received restore request"
    );

    let orchestrator = state.orchestrator.clone();
    state
        .job_tracker
        .spawn_tracked(OperationKind::Restore, async move { orchestrator.apply_backup(upload).await })
        .await
    .map_err(|e| anyhow::anyhow!(e))?
    .map_err(ApiError::Restore)?;

    Ok(Json(json!({ "message": "restored" })))
}
