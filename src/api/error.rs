use crate::infrastructure::database::GatewayError;
use crate::services::download_service::DownloadError;
use crate::services::upload_service::UploadError;
use crate::utils::staging::StagingError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<StagingError> for AppError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::TooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            StagingError::Body(_) => AppError::BadRequest(err.to_string()),
            StagingError::Io(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::InvalidRegion(_) | UploadError::EmptyPayload => {
                AppError::BadRequest(err.to_string())
            }
            UploadError::PayloadTooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            UploadError::Staging(inner) => inner.into(),
            UploadError::UploadFailed(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<DownloadError> for AppError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::InvalidRequest(msg) => AppError::BadRequest(msg),
            DownloadError::NotFound => AppError::NotFound(err.to_string()),
            DownloadError::Gateway(inner) => inner.into(),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::RegionNotFound(_) => AppError::BadRequest(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}
