pub mod regions;

pub use regions::{
    ConfigError, DbSettings, RegionConfig, RegionEntry, RegionId, RegionRegistry, SslMode,
};

use std::env;

/// Upload limits
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum file size in bytes (default: 100 MiB)
    pub max_file_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024, // 100 MiB
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.max_file_size),
        }
    }

    /// Body limit for the HTTP layer: payload cap plus room for multipart framing.
    pub fn request_body_limit(&self) -> usize {
        self.max_file_size + 10 * 1024 * 1024
    }
}
