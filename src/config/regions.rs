use serde::Serialize;
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Region order used when `REGIONS` is not set.
pub const DEFAULT_REGIONS: &str = "us-west-1,sa-east-1,ap-southeast-2";

const DEFAULT_PORT: u16 = 5432;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid region identifier: {0:?}")]
    InvalidRegionId(String),

    #[error("Region '{0}' is not configured")]
    UnknownRegion(String),

    #[error("Region '{0}' is declared more than once")]
    DuplicateRegion(String),

    #[error("Missing configuration for region '{region}': {detail}")]
    Missing { region: String, detail: String },

    #[error("Invalid configuration for region '{region}': {detail}")]
    Invalid { region: String, detail: String },

    #[error("No usable region configured")]
    NoUsableRegion,
}

/// Identifier of a deployment region, e.g. `us-west-1`.
///
/// Only lower-case ASCII letters, digits and `-` are accepted, so the identifier
/// can always be mapped onto an environment variable suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && !trimmed.starts_with('-')
            && !trimmed.ends_with('-')
            && trimmed
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ConfigError::InvalidRegionId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `us-west-1` -> `US_WEST_1`
    pub fn env_suffix(&self) -> String {
        self.0.replace('-', "_").to_uppercase()
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

impl SslMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "disable" => Some(Self::Disable),
            "prefer" => Some(Self::Prefer),
            "require" => Some(Self::Require),
            _ => None,
        }
    }
}

/// Settings shared by every regional store.
#[derive(Clone)]
pub struct DbSettings {
    pub username: String,
    pub password: String,
    pub database: String,
    pub connect_timeout: Duration,
    pub max_connections: u32,
    pub ssl_mode: SslMode,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            username: "dbadmin".to_string(),
            password: String::new(),
            database: "distributed_app".to_string(),
            connect_timeout: Duration::from_secs(10),
            max_connections: 10,
            ssl_mode: SslMode::Prefer,
        }
    }
}

/// Connection parameters of one region.
#[derive(Clone)]
pub struct RegionConfig {
    pub region: RegionId,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub max_connections: u32,
    pub ssl_mode: SslMode,
}

impl RegionConfig {
    pub fn new(region: RegionId, host: impl Into<String>, port: u16) -> Self {
        Self::with_settings(region, host, port, &DbSettings::default())
    }

    pub fn with_settings(
        region: RegionId,
        host: impl Into<String>,
        port: u16,
        settings: &DbSettings,
    ) -> Self {
        Self {
            region,
            host: host.into(),
            port,
            database: settings.database.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            connect_timeout: settings.connect_timeout,
            max_connections: settings.max_connections,
            ssl_mode: settings.ssl_mode,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for RegionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionConfig")
            .field("region", &self.region)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("connect_timeout", &self.connect_timeout)
            .field("max_connections", &self.max_connections)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum RegionEntry {
    Ready(RegionConfig),
    /// Declared in `REGIONS` but not usable; reported as an error region.
    Misconfigured {
        region: RegionId,
        endpoint: Option<String>,
        error: ConfigError,
    },
}

impl RegionEntry {
    pub fn region(&self) -> &RegionId {
        match self {
            RegionEntry::Ready(config) => &config.region,
            RegionEntry::Misconfigured { region, .. } => region,
        }
    }

    pub fn endpoint(&self) -> Option<String> {
        match self {
            RegionEntry::Ready(config) => Some(config.endpoint()),
            RegionEntry::Misconfigured { endpoint, .. } => endpoint.clone(),
        }
    }
}

/// Declared regions in their configured order. Loaded once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct RegionRegistry {
    entries: Vec<RegionEntry>,
}

impl RegionRegistry {
    pub fn new(entries: Vec<RegionEntry>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.region().clone()) {
                return Err(ConfigError::DuplicateRegion(entry.region().to_string()));
            }
        }
        Ok(Self { entries })
    }

    pub fn from_configs(configs: Vec<RegionConfig>) -> Result<Self, ConfigError> {
        Self::new(configs.into_iter().map(RegionEntry::Ready).collect())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = DbSettings::default();
        let settings = DbSettings {
            username: lookup("DB_USERNAME")
                .filter(|v| !v.is_empty())
                .unwrap_or(default.username),
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            database: lookup("DB_NAME")
                .filter(|v| !v.is_empty())
                .unwrap_or(default.database),
            connect_timeout: lookup("DB_CONNECT_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.connect_timeout),
            max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.max_connections),
            ssl_mode: lookup("DB_SSL_MODE")
                .and_then(|v| SslMode::parse(&v))
                .unwrap_or(default.ssl_mode),
        };

        let declared = lookup("REGIONS")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REGIONS.to_string());

        let mut entries = Vec::new();
        for raw in declared.split(',').filter(|r| !r.trim().is_empty()) {
            let region = RegionId::parse(raw)?;
            entries.push(load_region(region, &settings, &lookup));
        }

        Self::new(entries)
    }

    pub fn entries(&self) -> &[RegionEntry] {
        &self.entries
    }

    pub fn regions(&self) -> impl Iterator<Item = &RegionId> {
        self.entries.iter().map(RegionEntry::region)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn usable_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, RegionEntry::Ready(_)))
            .count()
    }

    /// Fails only when every declared region is unusable.
    pub fn ensure_usable(&self) -> Result<(), ConfigError> {
        if self.usable_count() == 0 {
            Err(ConfigError::NoUsableRegion)
        } else {
            Ok(())
        }
    }

    /// Map a caller-supplied name onto a declared region.
    pub fn resolve(&self, name: &str) -> Result<RegionId, ConfigError> {
        let candidate = RegionId::parse(name)?;
        self.entries
            .iter()
            .map(RegionEntry::region)
            .find(|r| **r == candidate)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownRegion(candidate.to_string()))
    }

    pub fn entry(&self, region: &RegionId) -> Option<&RegionEntry> {
        self.entries.iter().find(|e| e.region() == region)
    }

    pub fn config(&self, region: &RegionId) -> Result<&RegionConfig, ConfigError> {
        match self.entry(region) {
            Some(RegionEntry::Ready(config)) => Ok(config),
            Some(RegionEntry::Misconfigured { error, .. }) => Err(error.clone()),
            None => Err(ConfigError::UnknownRegion(region.to_string())),
        }
    }

    pub fn endpoint(&self, region: &RegionId) -> Option<String> {
        self.entry(region).and_then(RegionEntry::endpoint)
    }
}

/// Pre-`REGIONS` variable names used by the reference deployment.
fn legacy_host_var(region: &RegionId) -> Option<&'static str> {
    match region.as_str() {
        "us-west-1" => Some("DB_HOST_US_WEST"),
        "sa-east-1" => Some("DB_HOST_SA_EAST"),
        "ap-southeast-2" => Some("DB_HOST_AP_SOUTHEAST"),
        _ => None,
    }
}

fn load_region<F>(region: RegionId, settings: &DbSettings, lookup: &F) -> RegionEntry
where
    F: Fn(&str) -> Option<String>,
{
    let host_var = format!("DB_HOST_{}", region.env_suffix());
    let host_string = lookup(&host_var)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            legacy_host_var(&region)
                .and_then(|name| lookup(name))
                .filter(|v| !v.trim().is_empty())
        });

    let Some(host_string) = host_string else {
        return RegionEntry::Misconfigured {
            error: ConfigError::Missing {
                region: region.to_string(),
                detail: format!("{} is not set", host_var),
            },
            region,
            endpoint: None,
        };
    };

    let endpoint = Some(host_string.trim().to_string());
    let (host, port) = match parse_host_port(host_string.trim()) {
        Ok(parts) => parts,
        Err(detail) => {
            return RegionEntry::Misconfigured {
                error: ConfigError::Invalid {
                    region: region.to_string(),
                    detail,
                },
                region,
                endpoint,
            };
        }
    };

    if settings.password.is_empty() {
        return RegionEntry::Misconfigured {
            error: ConfigError::Missing {
                region: region.to_string(),
                detail: "DB_PASSWORD is not set".to_string(),
            },
            region,
            endpoint,
        };
    }

    RegionEntry::Ready(RegionConfig::with_settings(region, host, port, settings))
}

fn parse_host_port(raw: &str) -> Result<(String, u16), String> {
    let (host, port) = match raw.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid port in {:?}", raw))?;
            (host, port)
        }
        None => (raw, DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(format!("empty host in {:?}", raw));
    }

    Ok((host.to_string(), port))
}
