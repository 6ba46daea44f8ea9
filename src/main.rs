use clap::Parser;
use dotenvy::dotenv;
use region_upload_bench::config::{RegionEntry, RegionRegistry, UploadConfig};
use region_upload_bench::infrastructure::database::StorageGateway;
use region_upload_bench::utils::clock::SystemClock;
use region_upload_bench::{AppState, DEFAULT_LOG_FILTER, create_app};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port for the HTTP server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Region Upload Bench...");

    // 2. Region registry; only a registry with no usable region is fatal
    let registry = RegionRegistry::from_env()?;
    registry.ensure_usable()?;

    for entry in registry.entries() {
        match entry {
            RegionEntry::Ready(config) => {
                info!("🌍 Region {} -> {}", config.region, config.endpoint())
            }
            RegionEntry::Misconfigured { region, error, .. } => {
                warn!("⚠️  Region {} is misconfigured: {}", region, error)
            }
        }
    }

    let upload_config = UploadConfig::from_env();
    info!(
        "📦 Upload Config: Max Size={}MB",
        upload_config.max_file_size / 1024 / 1024
    );

    // 3. Storage gateway with lazily opened per-region pools
    let gateway = Arc::new(StorageGateway::new(Arc::new(registry)));
    gateway.warm_up().await;

    let state = AppState::new(gateway.clone(), Arc::new(SystemClock), upload_config);

    // 4. HTTP server
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    let addr = listener.local_addr()?;

    info!("✅ API Server listening on: http://{}", addr);
    info!(
        "📖 Swagger UI documentation: http://localhost:{}/swagger-ui",
        args.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 5. Explicit teardown of every regional pool
    info!("🛑 Shutting down, closing regional pools...");
    gateway.close().await;

    info!("👋 Exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
