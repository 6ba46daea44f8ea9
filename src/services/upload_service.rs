use crate::config::{RegionId, UploadConfig};
use crate::infrastructure::database::GatewayError;
use crate::services::storage::{FileStore, NewFileRecord};
use crate::utils::clock::{Clock, UploadTimer};
use crate::utils::staging::{StagedFile, StagingError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("No file data uploaded")]
    EmptyPayload,

    #[error("File size {size} exceeds the maximum allowed size of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Upload failed: {0}")]
    UploadFailed(#[from] GatewayError),

    #[error("Upload failed: {0}")]
    Staging(#[from] StagingError),
}

pub struct UploadRequest {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub region: String,
    pub data: Vec<u8>,
    /// Epoch milliseconds at which the client started sending.
    pub client_started_at_ms: Option<i64>,
    /// When the server began processing the request.
    pub received_at: Option<Instant>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub id: i32,
    pub region: RegionId,
    pub upload_duration_ms: i64,
    pub file_name: String,
    pub file_size: usize,
}

/// Timing metadata that travels with a staged upload.
#[derive(Debug, Clone, Default)]
pub struct UploadContext {
    pub region: String,
    pub client_started_at_ms: Option<i64>,
    pub received_at: Option<Instant>,
}

pub struct UploadService {
    store: Arc<dyn FileStore>,
    clock: Arc<dyn Clock>,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(store: Arc<dyn FileStore>, clock: Arc<dyn Clock>, config: UploadConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<UploadResult, UploadError> {
        let timer = UploadTimer::start(
            self.clock.clone(),
            request.client_started_at_ms,
            request.received_at,
        );

        // 1. Validate region and payload before touching any store
        let region = self
            .store
            .registry()
            .resolve(&request.region)
            .map_err(|_| UploadError::InvalidRegion(request.region.clone()))?;

        if request.data.is_empty() {
            return Err(UploadError::EmptyPayload);
        }

        let size = request.data.len();
        if size > self.config.max_file_size {
            return Err(UploadError::PayloadTooLarge {
                size,
                limit: self.config.max_file_size,
            });
        }

        let file_name = if request.file_name.trim().is_empty() {
            "unnamed".to_string()
        } else {
            request.file_name
        };
        debug!("Timing '{}' from {:?}", file_name, timer.basis());

        let file_type = request
            .mime_type
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

        // 2. Ensure the table exists, then persist in one insert
        self.store.prepare(&region).await.map_err(|e| {
            warn!("❌ Region {} not ready for upload: {}", region, e);
            UploadError::UploadFailed(e)
        })?;

        let inserted = self
            .store
            .insert(
                &region,
                NewFileRecord {
                    file_name: file_name.clone(),
                    file_type,
                    data: request.data,
                },
                &timer,
            )
            .await
            .map_err(|e| {
                warn!("❌ Failed to store '{}' in {}: {}", file_name, region, e);
                UploadError::UploadFailed(e)
            })?;

        info!(
            "💾 Stored '{}' ({} bytes) in {} as #{} after {}ms",
            file_name, size, region, inserted.id, inserted.upload_duration_ms
        );

        Ok(UploadResult {
            id: inserted.id,
            region,
            upload_duration_ms: i64::from(inserted.upload_duration_ms),
            file_name,
            file_size: size,
        })
    }

    /// Upload a payload buffered on disk. The staging file is gone once this returns,
    /// whatever the outcome.
    pub async fn upload_staged(
        &self,
        staged: StagedFile,
        context: UploadContext,
    ) -> Result<UploadResult, UploadError> {
        debug!(
            "Uploading staged '{}' ({} bytes) from {}",
            staged.file_name(),
            staged.size(),
            staged.path().display()
        );
        let data = staged.read_all().await?;
        let request = UploadRequest {
            file_name: staged.file_name().to_string(),
            mime_type: staged.content_type().map(str::to_string),
            region: context.region,
            data,
            client_started_at_ms: context.client_started_at_ms,
            received_at: context.received_at,
        };

        let result = self.upload(request).await;
        drop(staged);
        result
    }
}
