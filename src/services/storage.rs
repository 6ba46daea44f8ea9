use crate::config::{RegionId, RegionRegistry};
use crate::entities::{prelude::*, uploaded_files};
use crate::infrastructure::database::{GatewayError, StorageGateway};
use crate::utils::clock::UploadTimer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, EntityTrait, FromQueryResult, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use utoipa::ToSchema;

/// File metadata as listed on the dashboard; never carries the payload.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileRecordMeta {
    pub id: i32,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: Option<String>,
    pub region: String,
    pub upload_duration_ms: Option<i32>,
    pub created_at: DateTime<Utc>,
}

pub struct NewFileRecord {
    pub file_name: String,
    pub file_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedFile {
    pub id: i32,
    pub upload_duration_ms: i32,
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: i32,
    pub file_name: String,
    pub file_type: String,
    pub data: Vec<u8>,
}

/// Per-region file persistence used by the upload, status and download services.
#[async_trait]
pub trait FileStore: Send + Sync {
    fn registry(&self) -> &RegionRegistry;

    /// Trivial liveness query.
    async fn ping(&self, region: &RegionId) -> Result<(), GatewayError>;

    /// Make sure the region's table exists.
    async fn prepare(&self, region: &RegionId) -> Result<(), GatewayError>;

    /// Insert one record. The stored duration is read from `timer` right after the
    /// store acknowledges the insert.
    async fn insert(
        &self,
        region: &RegionId,
        record: NewFileRecord,
        timer: &UploadTimer,
    ) -> Result<InsertedFile, GatewayError>;

    /// All records of a region, most recent first.
    async fn list(&self, region: &RegionId) -> Result<Vec<FileRecordMeta>, GatewayError>;

    async fn fetch(&self, region: &RegionId, id: i32) -> Result<Option<StoredFile>, GatewayError>;
}

#[async_trait]
impl FileStore for StorageGateway {
    fn registry(&self) -> &RegionRegistry {
        StorageGateway::registry(self)
    }

    async fn ping(&self, region: &RegionId) -> Result<(), GatewayError> {
        StorageGateway::ping(self, region).await
    }

    async fn prepare(&self, region: &RegionId) -> Result<(), GatewayError> {
        self.ensure_schema(region).await
    }

    async fn insert(
        &self,
        region: &RegionId,
        record: NewFileRecord,
        timer: &UploadTimer,
    ) -> Result<InsertedFile, GatewayError> {
        let scoped = self.with_connection(region).await?;
        let file_size = record.data.len() as i64;

        let active = uploaded_files::ActiveModel {
            file_name: Set(record.file_name),
            file_data: Set(record.data),
            file_size: Set(file_size),
            file_type: Set(Some(record.file_type)),
            region: Set(region.to_string()),
            // Placeholder, overwritten below before the transaction commits.
            upload_duration_ms: Set(Some(0)),
            ..Default::default()
        };

        let id = UploadedFiles::insert(active)
            .exec(&*scoped)
            .await
            .map_err(|e| GatewayError::from_db(region, e))?
            .last_insert_id;

        let upload_duration_ms = i32::try_from(timer.elapsed_ms()).unwrap_or(i32::MAX);

        UploadedFiles::update_many()
            .col_expr(
                uploaded_files::Column::UploadDurationMs,
                Expr::value(upload_duration_ms),
            )
            .filter(uploaded_files::Column::Id.eq(id))
            .exec(&*scoped)
            .await
            .map_err(|e| GatewayError::from_db(region, e))?;

        tracing::debug!(
            "Committing #{} in {} after {}ms",
            id,
            scoped.region(),
            upload_duration_ms
        );
        scoped.commit().await?;

        Ok(InsertedFile {
            id,
            upload_duration_ms,
        })
    }

    async fn list(&self, region: &RegionId) -> Result<Vec<FileRecordMeta>, GatewayError> {
        UploadedFiles::find()
            .select_only()
            .columns([
                uploaded_files::Column::Id,
                uploaded_files::Column::FileName,
                uploaded_files::Column::FileSize,
                uploaded_files::Column::FileType,
                uploaded_files::Column::Region,
                uploaded_files::Column::UploadDurationMs,
                uploaded_files::Column::CreatedAt,
            ])
            .filter(uploaded_files::Column::Region.eq(region.as_str()))
            .order_by_desc(uploaded_files::Column::CreatedAt)
            .order_by_desc(uploaded_files::Column::Id)
            .into_model::<FileRecordMeta>()
            .all(self.connection(region)?)
            .await
            .map_err(|e| GatewayError::from_db(region, e))
    }

    async fn fetch(&self, region: &RegionId, id: i32) -> Result<Option<StoredFile>, GatewayError> {
        let model = UploadedFiles::find_by_id(id)
            .filter(uploaded_files::Column::Region.eq(region.as_str()))
            .one(self.connection(region)?)
            .await
            .map_err(|e| GatewayError::from_db(region, e))?;

        Ok(model.map(|m| StoredFile {
            id: m.id,
            file_name: m.file_name,
            file_type: m
                .file_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string()),
            data: m.file_data,
        }))
    }
}
