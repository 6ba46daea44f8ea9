use dotenvy::dotenv;
use region_upload_bench::config::{RegionEntry, RegionId, RegionRegistry};
use region_upload_bench::infrastructure::database::{GatewayError, StorageGateway, TABLE};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Read-only inspection of every configured region: connectivity, table presence, columns.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "check_regions=info,region_upload_bench=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🔍 Checking regional databases...");

    let registry = Arc::new(RegionRegistry::from_env()?);
    let gateway = StorageGateway::new(registry.clone());
    let mut failures = 0usize;

    for entry in registry.entries() {
        let region = entry.region();
        match entry {
            RegionEntry::Misconfigured { error, .. } => {
                error!("❌ {}: {}", region, error);
                failures += 1;
            }
            RegionEntry::Ready(config) => {
                info!("🌍 {} ({})", region, config.endpoint());
                if let Err(e) = inspect(&gateway, region).await {
                    error!("❌ {}: {}", region, e);
                    failures += 1;
                }
            }
        }
    }

    gateway.close().await;

    if failures > 0 {
        anyhow::bail!("{} of {} regions failed the check", failures, registry.len());
    }

    info!("✅ All regions reachable");
    Ok(())
}

async fn inspect(gateway: &StorageGateway, region: &RegionId) -> Result<(), GatewayError> {
    gateway.ping(region).await?;
    info!("   - Connection OK");

    let rows = gateway
        .execute(
            region,
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
            [TABLE.into()],
        )
        .await?;

    if rows.is_empty() {
        warn!("   - Table '{}' does not exist yet", TABLE);
        return Ok(());
    }

    info!("   - Table '{}' has {} columns:", TABLE, rows.len());
    for row in rows {
        let name: String = row
            .try_get("", "column_name")
            .map_err(|e| GatewayError::from_db(region, e))?;
        let data_type: String = row
            .try_get("", "data_type")
            .map_err(|e| GatewayError::from_db(region, e))?;
        info!("       {} {}", name, data_type);
    }

    Ok(())
}
