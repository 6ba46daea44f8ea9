use crate::infrastructure::database::GatewayError;
use crate::services::storage::{FileStore, StoredFile};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("File not found")]
    NotFound,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub struct DownloadService {
    store: Arc<dyn FileStore>,
}

impl DownloadService {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }

    /// Read one record back from the region it was stored in. No cross-region lookup.
    pub async fn download(&self, id: i64, region: &str) -> Result<StoredFile, DownloadError> {
        let region = self
            .store
            .registry()
            .resolve(region)
            .map_err(|e| DownloadError::InvalidRequest(e.to_string()))?;

        if id <= 0 {
            return Err(DownloadError::InvalidRequest(format!(
                "File id must be a positive integer, got {}",
                id
            )));
        }
        // Ids are SERIAL columns, so anything wider cannot exist.
        let id = i32::try_from(id).map_err(|_| DownloadError::NotFound)?;

        self.store.prepare(&region).await?;
        self.store
            .fetch(&region, id)
            .await?
            .ok_or(DownloadError::NotFound)
    }
}
