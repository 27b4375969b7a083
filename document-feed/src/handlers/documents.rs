use crate::dtos::DocumentResponse;
use crate::session::AuthUser;
use crate::startup::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
        })?
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Please select a valid file.")))?;

    let name = field.file_name().unwrap_or_default().to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e)))?
        .to_vec();

    tracing::info!(
        user_id = %user.id,
        filename = %name,
        size = data.len(),
        "Document upload started"
    );

    let record = state.uploader.upload(&name, &content_type, data).await?;

    Ok((StatusCode::CREATED, Json(DocumentResponse::from(record))))
}

/// Serve stored bytes at the URL handed out on upload.
pub async fn download_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let data = state.storage.download(&key).await.map_err(|e| {
        tracing::warn!(storage_key = %key, error = %e, "Failed to download file");
        e
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, detect_content_type(&key))],
        data,
    ))
}

fn detect_content_type(key: &str) -> &'static str {
    let lower = key.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".txt") {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}
