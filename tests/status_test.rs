mod common;

use axum::http::StatusCode;
use common::*;
use region_upload_bench::config::{
    ConfigError, RegionConfig, RegionEntry, RegionRegistry, UploadConfig,
};
use region_upload_bench::infrastructure::database::StorageGateway;
use region_upload_bench::services::status_service::{ConnectionState, StatusService};
use region_upload_bench::services::storage::FileStore;
use region_upload_bench::services::upload_service::{UploadRequest, UploadService};
use region_upload_bench::utils::clock::SystemClock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

async fn seed(store: Arc<dyn FileStore>, region: &str, names: &[&str]) {
    let service = UploadService::new(store, Arc::new(SystemClock), UploadConfig::default());
    for name in names {
        service
            .upload(UploadRequest {
                file_name: name.to_string(),
                mime_type: Some("text/plain".to_string()),
                region: region.to_string(),
                data: name.as_bytes().to_vec(),
                client_started_at_ms: None,
                received_at: None,
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_every_region_reported_in_declared_order() {
    let gateway = memory_gateway(&REGIONS).await;
    seed(gateway.clone(), "sa-east-1", &["a.txt", "b.txt"]).await;

    let statuses = StatusService::new(gateway).list_statuses().await;

    let names: Vec<&str> = statuses.iter().map(|s| s.region.as_str()).collect();
    assert_eq!(names, REGIONS);
    assert!(
        statuses
            .iter()
            .all(|s| s.status == ConnectionState::Connected)
    );
    assert_eq!(statuses[0].endpoint.as_deref(), Some("db.us-west-1.internal:5432"));
    assert!(statuses[0].files.is_empty());

    let sa_files: Vec<&str> = statuses[1]
        .files
        .iter()
        .map(|f| f.file_name.as_str())
        .collect();
    assert_eq!(sa_files, vec!["b.txt", "a.txt"]);
}

#[tokio::test]
async fn test_all_regions_failing_still_full_length() {
    let gateway = memory_gateway(&REGIONS).await;
    let mut flaky = FlakyStore::new(gateway);
    for name in REGIONS {
        flaky = flaky.failing(name);
    }

    let statuses = StatusService::new(Arc::new(flaky)).list_statuses().await;

    assert_eq!(statuses.len(), REGIONS.len());
    for (status, name) in statuses.iter().zip(REGIONS) {
        assert_eq!(status.region.as_str(), name);
        assert_eq!(status.status, ConnectionState::Error);
        assert!(status.files.is_empty());
        assert!(status.error.as_deref().unwrap().contains("simulated outage"));
    }
}

#[tokio::test]
async fn test_failing_region_does_not_alter_healthy_ones() {
    let gateway = memory_gateway(&REGIONS).await;
    seed(gateway.clone(), "us-west-1", &["only.txt"]).await;

    let alone = StatusService::new(gateway.clone()).list_statuses().await;

    let flaky = FlakyStore::new(gateway)
        .failing("sa-east-1")
        .slow("ap-southeast-2", Duration::from_millis(200))
        .failing("ap-southeast-2");
    let disturbed = StatusService::new(Arc::new(flaky)).list_statuses().await;

    assert_eq!(disturbed[0].status, ConnectionState::Connected);
    assert_eq!(disturbed[0].files, alone[0].files);
    assert_eq!(disturbed[1].status, ConnectionState::Error);
    assert_eq!(disturbed[2].status, ConnectionState::Error);
}

#[tokio::test]
async fn test_latency_bounded_by_slowest_region() {
    let gateway = memory_gateway(&REGIONS).await;
    let delay = Duration::from_millis(400);
    let flaky = FlakyStore::new(gateway)
        .slow("us-west-1", delay)
        .slow("sa-east-1", delay)
        .slow("ap-southeast-2", delay);
    let service = StatusService::new(Arc::new(flaky));

    let started = Instant::now();
    let statuses = service.list_statuses().await;
    let elapsed = started.elapsed();

    assert_eq!(statuses.len(), 3);
    assert!(elapsed >= delay);
    assert!(
        elapsed < delay * 2,
        "probes ran sequentially: {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_misconfigured_region_reported_as_error() {
    let west = region("us-west-1");
    let broken = region("sa-east-1");
    let registry = Arc::new(
        RegionRegistry::new(vec![
            RegionEntry::Ready(RegionConfig::new(west.clone(), "db.us-west-1.internal", 5432)),
            RegionEntry::Misconfigured {
                region: broken.clone(),
                endpoint: None,
                error: ConfigError::Missing {
                    region: broken.to_string(),
                    detail: "DB_HOST_SA_EAST_1 is not set".to_string(),
                },
            },
        ])
        .unwrap(),
    );
    let gateway = Arc::new(
        StorageGateway::with_connections(registry, vec![(west, memory_db().await)]).unwrap(),
    );

    let app = build_app(gateway, Arc::new(SystemClock), UploadConfig::default());
    let response = app.oneshot(get("/databases")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["status"], "connected");
    assert!(entries[0].get("error").is_none());
    assert_eq!(entries[1]["region"], "sa-east-1");
    assert_eq!(entries[1]["status"], "error");
    assert!(entries[1]["endpoint"].is_null());
    assert!(
        entries[1]["error"]
            .as_str()
            .unwrap()
            .contains("DB_HOST_SA_EAST_1")
    );
}

#[tokio::test]
async fn test_health_reports_region_counts() {
    let gateway = memory_gateway(&REGIONS).await;
    let app = build_app(gateway, Arc::new(SystemClock), UploadConfig::default());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["regions"], 3);
    assert_eq!(json["usable_regions"], 3);
}
