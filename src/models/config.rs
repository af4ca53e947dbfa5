//! Configuration models for subsidios.
//!
//! Every endpoint, limit and date the pipeline depends on is parameterized
//! here and resolved at runtime from a TOML file. Every field has a default,
//! so an absent file or an empty section is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::DatasetCategory;

/// Top-level configuration for subsidios.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Live open-data API (General category only)
    #[serde(default)]
    pub api: ApiConfig,

    /// Static snapshot exports, one file per category
    #[serde(default)]
    pub snapshots: SnapshotConfig,

    /// Process-lifetime dataset cache
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Paginated API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Resource endpoint returning a JSON array of rows
    #[serde(default = "default_resource_url")]
    pub resource_url: String,

    /// Metadata endpoint carrying `rowsUpdatedAt` / `dataUpdatedAt`
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,

    /// Rows per page (`$limit`); the upstream caps pages at 1000
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,

    /// Attempts per page when the upstream answers 429
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_resource_url() -> String {
    "https://www.datos.gov.co/resource/h2yr-zfb2.json".to_string()
}

fn default_metadata_url() -> String {
    "https://www.datos.gov.co/api/views/h2yr-zfb2.json".to_string()
}

fn default_page_size() -> usize {
    900
}

fn default_api_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            resource_url: default_resource_url(),
            metadata_url: default_metadata_url(),
            page_size: default_page_size(),
            timeout_secs: default_api_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Snapshot export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Directory URL the snapshot files live under
    #[serde(default = "default_snapshot_base_url")]
    pub base_url: String,

    /// Export date embedded in every snapshot filename (`YYYYMMDD`)
    #[serde(default = "default_snapshot_as_of")]
    pub as_of: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_snapshot_timeout")]
    pub timeout_secs: u64,

    /// Per-category filename overrides, keyed by category slug
    #[serde(default)]
    pub files: HashMap<String, String>,
}

fn default_snapshot_base_url() -> String {
    "https://www.datos.gov.co/snapshots/subsidios".to_string()
}

fn default_snapshot_as_of() -> String {
    "20260217".to_string()
}

fn default_snapshot_timeout() -> u64 {
    60
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            base_url: default_snapshot_base_url(),
            as_of: default_snapshot_as_of(),
            timeout_secs: default_snapshot_timeout(),
            files: HashMap::new(),
        }
    }
}

impl SnapshotConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Filename for a category: explicit override, else
    /// `subsidios_<slug>_<as_of>.csv`.
    pub fn file_name(&self, category: DatasetCategory) -> String {
        self.files
            .get(category.slug())
            .cloned()
            .unwrap_or_else(|| {
                format!(
                    "subsidios_{}_{}.csv",
                    category.slug().replace('-', "_"),
                    self.as_of
                )
            })
    }

    /// Full URL of a category's snapshot file.
    pub fn url_for(&self, category: DatasetCategory) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.file_name(category)
        )
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live of a cached dataset in seconds
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

fn default_ttl() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Load configuration from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            info!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate URLs, limits and the snapshot date.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("api.resource_url", &self.api.resource_url),
            ("api.metadata_url", &self.api.metadata_url),
            ("snapshots.base_url", &self.snapshots.base_url),
        ] {
            url::Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
                field,
                value: value.clone(),
                reason: e.to_string(),
            })?;
        }

        if self.api.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.page_size",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.api.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.max_retries",
                reason: "must be at least 1".to_string(),
            });
        }

        let as_of = &self.snapshots.as_of;
        if as_of.len() != 8 || !as_of.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue {
                field: "snapshots.as_of",
                reason: format!("expected an 8-digit YYYYMMDD date, got '{as_of}'"),
            });
        }

        for key in self.snapshots.files.keys() {
            match key.parse::<DatasetCategory>() {
                Ok(category) if category.slug() == key => {}
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "snapshots.files",
                        reason: format!("unknown category slug '{key}'"),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid URL in {field} ('{value}'): {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
