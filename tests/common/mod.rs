#![allow(dead_code)]

use async_trait::async_trait;
use axum::{Router, body::Body, http::Request, response::Response};
use http_body_util::BodyExt;
use region_upload_bench::config::{RegionConfig, RegionId, RegionRegistry, UploadConfig};
use region_upload_bench::infrastructure::database::{GatewayError, StorageGateway};
use region_upload_bench::services::storage::{
    FileRecordMeta, FileStore, InsertedFile, NewFileRecord, StoredFile,
};
use region_upload_bench::utils::clock::{Clock, ManualClock, UploadTimer};
use region_upload_bench::{AppState, create_app};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, RuntimeErr};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub const REGIONS: [&str; 3] = ["us-west-1", "sa-east-1", "ap-southeast-2"];
pub const BOUNDARY: &str = "----bench-boundary";

pub fn region(name: &str) -> RegionId {
    RegionId::parse(name).unwrap()
}

pub async fn memory_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    Database::connect(opt).await.unwrap()
}

pub fn registry(names: &[&str]) -> Arc<RegionRegistry> {
    Arc::new(
        RegionRegistry::from_configs(
            names
                .iter()
                .map(|n| RegionConfig::new(region(n), format!("db.{}.internal", n), 5432))
                .collect(),
        )
        .unwrap(),
    )
}

/// One in-memory SQLite database per region.
pub async fn memory_gateway(names: &[&str]) -> Arc<StorageGateway> {
    let mut connections = Vec::new();
    for name in names {
        connections.push((region(name), memory_db().await));
    }
    Arc::new(StorageGateway::with_connections(registry(names), connections).unwrap())
}

pub fn build_app(store: Arc<dyn FileStore>, clock: Arc<dyn Clock>, config: UploadConfig) -> Router {
    create_app(AppState::new(store, clock, config))
}

pub fn simulated_outage(region: &RegionId) -> GatewayError {
    GatewayError::Connection {
        region: region.clone(),
        source: DbErr::Conn(RuntimeErr::Internal("simulated outage".to_string())),
    }
}

/// Wraps a real store, slowing down or failing chosen regions.
pub struct FlakyStore {
    inner: Arc<dyn FileStore>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn FileStore>) -> Self {
        Self {
            inner,
            delays: HashMap::new(),
            failing: HashSet::new(),
        }
    }

    pub fn slow(mut self, region: &str, delay: Duration) -> Self {
        self.delays.insert(region.to_string(), delay);
        self
    }

    pub fn failing(mut self, region: &str) -> Self {
        self.failing.insert(region.to_string());
        self
    }

    async fn disturb(&self, region: &RegionId) -> Result<(), GatewayError> {
        if let Some(delay) = self.delays.get(region.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(region.as_str()) {
            return Err(simulated_outage(region));
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for FlakyStore {
    fn registry(&self) -> &RegionRegistry {
        self.inner.registry()
    }

    async fn ping(&self, region: &RegionId) -> Result<(), GatewayError> {
        self.disturb(region).await?;
        self.inner.ping(region).await
    }

    async fn prepare(&self, region: &RegionId) -> Result<(), GatewayError> {
        if self.failing.contains(region.as_str()) {
            return Err(simulated_outage(region));
        }
        self.inner.prepare(region).await
    }

    async fn insert(
        &self,
        region: &RegionId,
        record: NewFileRecord,
        timer: &UploadTimer,
    ) -> Result<InsertedFile, GatewayError> {
        self.disturb(region).await?;
        self.inner.insert(region, record, timer).await
    }

    async fn list(&self, region: &RegionId) -> Result<Vec<FileRecordMeta>, GatewayError> {
        self.inner.list(region).await
    }

    async fn fetch(&self, region: &RegionId, id: i32) -> Result<Option<StoredFile>, GatewayError> {
        self.inner.fetch(region, id).await
    }
}

/// Advances a manual clock by a fixed cost per KiB before each insert, giving
/// reproducible store latency.
pub struct LatencyStore {
    inner: Arc<dyn FileStore>,
    clock: Arc<ManualClock>,
    per_kib: Duration,
}

impl LatencyStore {
    pub fn new(inner: Arc<dyn FileStore>, clock: Arc<ManualClock>, per_kib: Duration) -> Self {
        Self {
            inner,
            clock,
            per_kib,
        }
    }
}

#[async_trait]
impl FileStore for LatencyStore {
    fn registry(&self) -> &RegionRegistry {
        self.inner.registry()
    }

    async fn ping(&self, region: &RegionId) -> Result<(), GatewayError> {
        self.inner.ping(region).await
    }

    async fn prepare(&self, region: &RegionId) -> Result<(), GatewayError> {
        self.inner.prepare(region).await
    }

    async fn insert(
        &self,
        region: &RegionId,
        record: NewFileRecord,
        timer: &UploadTimer,
    ) -> Result<InsertedFile, GatewayError> {
        let kib = record.data.len().div_ceil(1024) as u32;
        self.clock.advance(self.per_kib * kib);
        self.inner.insert(region, record, timer).await
    }

    async fn list(&self, region: &RegionId) -> Result<Vec<FileRecordMeta>, GatewayError> {
        self.inner.list(region).await
    }

    async fn fetch(&self, region: &RegionId, id: i32) -> Result<Option<StoredFile>, GatewayError> {
        self.inner.fetch(region, id).await
    }
}

pub struct FilePart<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

pub fn multipart_body(region: Option<&str>, file: Option<FilePart<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(region) = region {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"region\"\r\n\r\n{}\r\n",
                BOUNDARY, region
            )
            .as_bytes(),
        );
    }
    if let Some(file) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file.file_name, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(body: Vec<u8>, client_started_at_ms: Option<i64>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(started) = client_started_at_ms {
        builder = builder.header("x-upload-start-time", started.to_string());
    }
    builder.body(Body::from(body)).unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
