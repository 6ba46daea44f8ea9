pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::download_service::DownloadService;
use crate::services::status_service::StatusService;
use crate::services::storage::FileStore;
use crate::services::upload_service::UploadService;
use crate::utils::clock::Clock;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// `EnvFilter` directives used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "region_upload_bench=info,tower_http=info";

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_file,
        api::handlers::status::list_databases,
        api::handlers::download::download_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::upload::UploadResponse,
            api::handlers::upload::UploadForm,
            api::handlers::health::HealthResponse,
            services::status_service::RegionStatus,
            services::status_service::ConnectionState,
            services::storage::FileRecordMeta,
            config::RegionId,
        )
    ),
    tags(
        (name = "files", description = "Upload and download endpoints"),
        (name = "regions", description = "Per-region status"),
        (name = "system", description = "Process health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FileStore>,
    pub upload_service: Arc<UploadService>,
    pub status_service: Arc<StatusService>,
    pub download_service: Arc<DownloadService>,
    pub clock: Arc<dyn Clock>,
    pub config: UploadConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn FileStore>, clock: Arc<dyn Clock>, config: UploadConfig) -> Self {
        Self {
            upload_service: Arc::new(UploadService::new(
                store.clone(),
                clock.clone(),
                config.clone(),
            )),
            status_service: Arc::new(StatusService::new(store.clone())),
            download_service: Arc::new(DownloadService::new(store.clone())),
            store,
            clock,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.request_body_limit();

    // Runs inside the request-id middleware, so every span carries an id.
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(api::middleware::request_id::REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/upload",
            post(api::handlers::upload::upload_file)
                .layer(axum::extract::DefaultBodyLimit::max(body_limit)),
        )
        .route("/databases", get(api::handlers::status::list_databases))
        .route(
            "/download/:id",
            get(api::handlers::download::download_file),
        )
        .layer(from_fn(api::middleware::timing::timing_middleware))
        .layer(trace_layer)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegionConfig, RegionId, RegionRegistry};
    use crate::infrastructure::database::StorageGateway;
    use crate::utils::clock::SystemClock;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::fmt;
    use std::sync::Mutex;
    use tower::ServiceExt;
    use tracing::field::{Field, Visit};
    use tracing::span::{Attributes, Id};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Collects the `request_id` field of every `http_request` span.
    #[derive(Clone, Default)]
    struct SpanRequestIds(Arc<Mutex<Vec<String>>>);

    struct RequestIdField(Option<String>);

    impl Visit for RequestIdField {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "request_id" {
                self.0 = Some(format!("{:?}", value));
            }
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for SpanRequestIds {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            if attrs.metadata().name() != "http_request" {
                return;
            }
            let mut field = RequestIdField(None);
            attrs.record(&mut field);
            if let Some(value) = field.0 {
                self.0.lock().unwrap().push(value);
            }
        }
    }

    fn test_app() -> Router {
        let registry = RegionRegistry::from_configs(vec![RegionConfig::new(
            RegionId::parse("us-west-1").unwrap(),
            "localhost",
            5432,
        )])
        .unwrap();
        let gateway = Arc::new(StorageGateway::new(Arc::new(registry)));
        create_app(AppState::new(
            gateway,
            Arc::new(SystemClock),
            UploadConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_generated_request_id_reaches_trace_span() {
        let recorder = SpanRequestIds::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(recorder.clone()));

        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let minted = response.headers()["x-request-id"].to_str().unwrap().to_string();
        assert_ne!(minted, "unknown");
        assert_eq!(*recorder.0.lock().unwrap(), vec![minted]);
    }

    #[tokio::test]
    async fn test_caller_request_id_is_kept() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }
}
