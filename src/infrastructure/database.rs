use crate::config::{ConfigError, RegionConfig, RegionId, RegionRegistry, SslMode};
use crate::entities::uploaded_files;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, DbErr, QueryResult,
    Schema, SqlxPostgresConnector, Statement, TransactionTrait, Value,
};
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub type RowSet = Vec<QueryResult>;

pub const TABLE: &str = "uploaded_files";

/// Columns that may be missing from tables created by older deployments.
/// `(name, postgres type, sqlite type)`; only ever added, never dropped or renamed.
const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    ("file_name", "VARCHAR(255)", "TEXT"),
    ("file_data", "BYTEA", "BLOB"),
    ("file_size", "BIGINT", "BIGINT"),
    ("file_type", "VARCHAR(100)", "TEXT"),
    ("region", "VARCHAR(50)", "TEXT"),
    ("upload_duration_ms", "INTEGER", "INTEGER"),
    (
        "created_at",
        "TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP",
        "TEXT",
    ),
];

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Region '{0}' is not known")]
    RegionNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(ConfigError),

    #[error("Connection to region '{region}' failed: {source}")]
    Connection {
        region: RegionId,
        #[source]
        source: DbErr,
    },

    #[error("Query against region '{region}' failed: {source}")]
    Query {
        region: RegionId,
        #[source]
        source: DbErr,
    },
}

impl GatewayError {
    pub fn from_db(region: &RegionId, err: DbErr) -> Self {
        match err {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => GatewayError::Connection {
                region: region.clone(),
                source: err,
            },
            _ => GatewayError::Query {
                region: region.clone(),
                source: err,
            },
        }
    }
}

impl From<ConfigError> for GatewayError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownRegion(region) => GatewayError::RegionNotFound(region),
            other => GatewayError::Configuration(other),
        }
    }
}

#[derive(Default)]
struct RegionSlot {
    connection: OnceLock<DatabaseConnection>,
    schema_ready: OnceCell<()>,
}

/// Pooled access to every regional store.
///
/// Pools are opened lazily on first use of a region and closed by [`StorageGateway::close`].
pub struct StorageGateway {
    registry: Arc<RegionRegistry>,
    slots: HashMap<RegionId, RegionSlot>,
}

impl StorageGateway {
    pub fn new(registry: Arc<RegionRegistry>) -> Self {
        let slots = registry
            .regions()
            .map(|region| (region.clone(), RegionSlot::default()))
            .collect();
        Self { registry, slots }
    }

    /// Use already-open connections instead of building Postgres pools.
    pub fn with_connections(
        registry: Arc<RegionRegistry>,
        connections: Vec<(RegionId, DatabaseConnection)>,
    ) -> Result<Self, GatewayError> {
        let mut gateway = Self::new(registry);
        for (region, db) in connections {
            let slot = gateway
                .slots
                .get_mut(&region)
                .ok_or_else(|| GatewayError::RegionNotFound(region.to_string()))?;
            slot.connection = OnceLock::from(db);
        }
        Ok(gateway)
    }

    pub fn registry(&self) -> &RegionRegistry {
        &self.registry
    }

    pub(crate) fn connection(
        &self,
        region: &RegionId,
    ) -> Result<&DatabaseConnection, GatewayError> {
        let slot = self
            .slots
            .get(region)
            .ok_or_else(|| GatewayError::RegionNotFound(region.to_string()))?;

        if let Some(db) = slot.connection.get() {
            return Ok(db);
        }

        let config = self.registry.config(region)?;
        Ok(slot.connection.get_or_init(|| connect_lazy(config)))
    }

    /// Run one statement with positional parameters against a region.
    pub async fn execute(
        &self,
        region: &RegionId,
        sql: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<RowSet, GatewayError> {
        let db = self.connection(region)?;
        let stmt = Statement::from_sql_and_values(db.get_database_backend(), sql, values);
        db.query_all(stmt)
            .await
            .map_err(|e| GatewayError::from_db(region, e))
    }

    /// Check out one pooled connection. It is returned to the pool when the
    /// scope is dropped, whether or not [`ScopedConnection::commit`] ran.
    pub async fn with_connection(&self, region: &RegionId) -> Result<ScopedConnection, GatewayError> {
        let db = self.connection(region)?;
        let txn = db
            .begin()
            .await
            .map_err(|e| GatewayError::from_db(region, e))?;
        Ok(ScopedConnection {
            region: region.clone(),
            txn,
        })
    }

    pub async fn ping(&self, region: &RegionId) -> Result<(), GatewayError> {
        let db = self.connection(region)?;
        let backend = db.get_database_backend();
        db.query_one(Statement::from_string(backend, "SELECT 1"))
            .await
            .map_err(|e| GatewayError::from_db(region, e))?;
        Ok(())
    }

    /// Create the upload table on first use of a region. A failed attempt is retried
    /// on the next call.
    pub async fn ensure_schema(&self, region: &RegionId) -> Result<(), GatewayError> {
        let db = self.connection(region)?;
        let slot = self
            .slots
            .get(region)
            .ok_or_else(|| GatewayError::RegionNotFound(region.to_string()))?;

        slot.schema_ready
            .get_or_try_init(|| async {
                create_schema(db)
                    .await
                    .map_err(|e| GatewayError::from_db(region, e))?;
                info!("   - Table '{}' checked/created in {}", TABLE, region);
                Ok::<(), GatewayError>(())
            })
            .await?;
        Ok(())
    }

    /// Prepare every usable region concurrently, logging the outcome per region.
    pub async fn warm_up(&self) {
        let usable: Vec<&RegionId> = self
            .registry
            .regions()
            .filter(|r| self.registry.config(r).is_ok())
            .collect();

        let results =
            futures::future::join_all(usable.iter().map(|region| self.ensure_schema(region)))
                .await;

        for (region, result) in usable.into_iter().zip(results) {
            match result {
                Ok(()) => info!("✅ Region {} is ready", region),
                Err(e) => warn!("⚠️  Region {} is not reachable yet: {}", region, e),
            }
        }
    }

    pub async fn close(&self) {
        for (region, slot) in &self.slots {
            if let Some(db) = slot.connection.get() {
                match db.clone().close().await {
                    Ok(()) => info!("🔌 Closed pool for region {}", region),
                    Err(e) => warn!("Failed to close pool for region {}: {}", region, e),
                }
            }
        }
    }
}

/// A pooled connection checked out for one unit of work.
pub struct ScopedConnection {
    region: RegionId,
    txn: DatabaseTransaction,
}

impl ScopedConnection {
    pub fn region(&self) -> &RegionId {
        &self.region
    }

    pub async fn commit(self) -> Result<(), GatewayError> {
        let region = self.region;
        self.txn
            .commit()
            .await
            .map_err(|e| GatewayError::from_db(&region, e))
    }
}

impl Deref for ScopedConnection {
    type Target = DatabaseTransaction;

    fn deref(&self) -> &Self::Target {
        &self.txn
    }
}

fn connect_lazy(config: &RegionConfig) -> DatabaseConnection {
    info!(
        "📂 Opening pool for region {} at {} (db: {})",
        config.region,
        config.endpoint(),
        config.database
    );

    let ssl_mode = match config.ssl_mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
    };

    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database)
        .ssl_mode(ssl_mode)
        .log_statements(log::LevelFilter::Debug);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(0)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect_lazy_with(options);

    SqlxPostgresConnector::from_sqlx_postgres_pool(pool)
}

async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let stmt = schema
        .create_table_from_entity(uploaded_files::Entity)
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&stmt)).await?;

    let present = existing_columns(db).await?;
    for (name, pg_type, sqlite_type) in ADDITIVE_COLUMNS {
        if present.iter().any(|c| c == name) {
            continue;
        }
        let column_type = match backend {
            DatabaseBackend::Sqlite => sqlite_type,
            _ => pg_type,
        };
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", TABLE, name, column_type);
        db.execute(Statement::from_string(backend, sql.clone()))
            .await?;
        warn!("   - Added missing column: {}", sql);
    }

    Ok(())
}

async fn existing_columns(db: &DatabaseConnection) -> Result<Vec<String>, DbErr> {
    let backend = db.get_database_backend();
    let sql = match backend {
        DatabaseBackend::Sqlite => {
            format!("SELECT name AS column_name FROM pragma_table_info('{}')", TABLE)
        }
        _ => format!(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = '{}'",
            TABLE
        ),
    };

    let rows = db.query_all(Statement::from_string(backend, sql)).await?;
    rows.iter()
        .map(|row| row.try_get::<String>("", "column_name"))
        .collect()
}
