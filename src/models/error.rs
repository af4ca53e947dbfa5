//! Error types for subsidios.
//!
//! Failure classes:
//! - Expected failures: bad configuration, unparseable payloads
//! - Infrastructure failures: network, timeout, upstream HTTP status
//! - Terminal view failures: a category that yielded no rows at all

use thiserror::Error;

use super::DatasetCategory;

/// Top-level error type for subsidios.
#[derive(Debug, Error)]
pub enum SubsidiosError {
    // ═══════════════════════════════════════════════════════════════════
    // Expected failures
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // ═══════════════════════════════════════════════════════════════════
    // Infrastructure failures
    // ═══════════════════════════════════════════════════════════════════
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Terminal for a view
    // ═══════════════════════════════════════════════════════════════════
    #[error("No data available for {category}: {reason}")]
    NoData {
        category: DatasetCategory,
        reason: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SubsidiosError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Map a reqwest failure, separating timeouts from other transport errors.
    pub fn from_request(err: reqwest::Error, timeout: std::time::Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Network(err)
        }
    }

    /// Check if this error is worth retrying against the same endpoint.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Result type alias for subsidios.
pub type Result<T> = std::result::Result<T, SubsidiosError>;
