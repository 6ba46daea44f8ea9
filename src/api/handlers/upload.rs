use crate::AppState;
use crate::api::error::AppError;
use crate::services::upload_service::UploadContext;
use crate::utils::staging::StagedFile;
use axum::{
    Json,
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use utoipa::ToSchema;

/// Header carrying the epoch milliseconds at which the client started sending.
pub const UPLOAD_START_HEADER: &str = "x-upload-start-time";

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_id: i32,
    pub region: String,
    pub upload_duration: i64,
    pub file_name: String,
    pub file_size: usize,
}

/// Multipart form accepted by `POST /upload`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    region: String,
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    params(
        ("x-upload-start-time" = Option<i64>, Header, description = "Client start time in epoch milliseconds")
    ),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "Missing file or region, unknown region, or empty file"),
        (status = 413, description = "File exceeds the configured maximum size"),
        (status = 500, description = "The regional store rejected the write")
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let received_at = state.clock.now();
    let client_started_at_ms = headers
        .get(UPLOAD_START_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok());

    let mut region: Option<String> = None;
    let mut staged_file: Option<StagedFile> = None;

    let result: Result<Json<UploadResponse>, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::PayloadTooLarge(
                    "Request body exceeds the maximum allowed limit".to_string(),
                )
            } else {
                AppError::BadRequest(e.body_text())
            }
        })? {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                let file_name = field.file_name().unwrap_or("unnamed").to_string();
                let content_type = field.content_type().map(|s| s.to_string());

                staged_file = Some(
                    StagedFile::from_stream(
                        field,
                        file_name,
                        content_type,
                        state.config.max_file_size,
                    )
                    .await?,
                );
            } else if name == "region" {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                if !text.trim().is_empty() {
                    region = Some(text.trim().to_string());
                }
            }
        }

        let staged = staged_file
            .take()
            .ok_or(AppError::BadRequest("No file uploaded".to_string()))?;
        let region = region
            .take()
            .ok_or(AppError::BadRequest("Region is required".to_string()))?;

        let stored = state
            .upload_service
            .upload_staged(
                staged,
                UploadContext {
                    region,
                    client_started_at_ms,
                    received_at: Some(received_at),
                },
            )
            .await?;

        Ok(Json(UploadResponse {
            success: true,
            file_id: stored.id,
            region: stored.region.to_string(),
            upload_duration: stored.upload_duration_ms,
            file_name: stored.file_name,
            file_size: stored.file_size,
        }))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Drain the rest of the body so the client sees the error instead of a reset.
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}
