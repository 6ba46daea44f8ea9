use crate::config::RegionId;
use crate::infrastructure::database::GatewayError;
use crate::services::storage::{FileRecordMeta, FileStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Error,
}

/// Reachability and file listing of one region at the time of the request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegionStatus {
    pub region: RegionId,
    pub endpoint: Option<String>,
    pub status: ConnectionState,
    pub files: Vec<FileRecordMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct StatusService {
    store: Arc<dyn FileStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }

    /// One entry per declared region, in declared order. Every region is probed in
    /// its own task; a failing or slow region only affects its own entry.
    pub async fn list_statuses(&self) -> Vec<RegionStatus> {
        let regions: Vec<RegionId> = self.store.registry().regions().cloned().collect();

        let handles: Vec<_> = regions
            .iter()
            .cloned()
            .map(|region| {
                let store = self.store.clone();
                tokio::spawn(async move { probe(store.as_ref(), &region).await })
            })
            .collect();

        let outcomes = futures::future::join_all(handles).await;

        regions
            .into_iter()
            .zip(outcomes)
            .map(|(region, outcome)| {
                let endpoint = self.store.registry().endpoint(&region);
                match outcome {
                    Ok(Ok(files)) => RegionStatus {
                        region,
                        endpoint,
                        status: ConnectionState::Connected,
                        files,
                        error: None,
                    },
                    Ok(Err(e)) => {
                        warn!("Database error for {}: {}", region, e);
                        failed(region, endpoint, e.to_string())
                    }
                    Err(join_err) => {
                        warn!("Status probe for {} did not complete: {}", region, join_err);
                        failed(region, endpoint, "Status probe aborted".to_string())
                    }
                }
            })
            .collect()
    }
}

async fn probe(store: &dyn FileStore, region: &RegionId) -> Result<Vec<FileRecordMeta>, GatewayError> {
    store.ping(region).await?;
    store.prepare(region).await?;
    let files = store.list(region).await?;
    debug!("Fetched {} files for region {}", files.len(), region);
    Ok(files)
}

fn failed(region: RegionId, endpoint: Option<String>, message: String) -> RegionStatus {
    RegionStatus {
        region,
        endpoint,
        status: ConnectionState::Error,
        files: Vec::new(),
        error: Some(message),
    }
}
