use crate::AppState;
use crate::api::error::AppError;
use crate::utils::headers::attachment_disposition;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    /// Region the file was uploaded to
    pub region: Option<String>,
}

#[utoipa::path(
    get,
    path = "/download/{id}",
    params(
        ("id" = i64, Path, description = "File id within the region"),
        DownloadQuery
    ),
    responses(
        (status = 200, description = "File contents"),
        (status = 400, description = "Malformed id or unknown region"),
        (status = 404, description = "File not found in that region")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let id: i64 = id
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid file id '{}'", id)))?;
    let region = query
        .region
        .filter(|r| !r.trim().is_empty())
        .ok_or(AppError::BadRequest("Region is required".to_string()))?;

    let file = state.download_service.download(id, region.trim()).await?;

    tracing::info!(
        "📎 Download of #{} '{}' from {} ({} bytes)",
        file.id,
        file.file_name,
        region,
        file.data.len()
    );

    let content_type = HeaderValue::from_str(&file.file_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            attachment_disposition(&file.file_name),
        )
        .header(header::CONTENT_LENGTH, file.data.len())
        .body(Body::from(file.data))
        .map_err(|e| AppError::Internal(format!("Failed to build download response: {}", e)))
}
