//! Source selection for the General category.
//!
//! The snapshot is the default: it costs one download instead of a full
//! pagination sweep. The API is used only when its metadata proves strictly
//! newer data, or when the caller forces a refresh. Dates are compared as
//! zero-padded `YYYYMMDD` strings, so lexicographic order is date order.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{ApiClient, ApiMetadata};
use crate::models::{DatasetCategory, FreshnessSignal, SourceKind};

use super::cache::TtlCache;

/// Colombia has no daylight saving time: always UTC−05:00.
const COLOMBIA_UTC_OFFSET_HOURS: i64 = -5;

/// `YYYYMMDD` in Colombia time for a Unix timestamp in seconds.
pub fn timestamp_to_date(unix_secs: i64) -> Option<String> {
    let local = unix_secs.checked_add(COLOMBIA_UTC_OFFSET_HOURS * 3600)?;
    DateTime::from_timestamp(local, 0).map(|dt| dt.format("%Y%m%d").to_string())
}

/// Today's `YYYYMMDD` in Colombia time.
pub fn today() -> String {
    (Utc::now() + TimeDelta::hours(COLOMBIA_UTC_OFFSET_HOURS))
        .format("%Y%m%d")
        .to_string()
}

/// API when its date is strictly newer than the snapshot's; otherwise the
/// snapshot (equal, older, or unknown).
pub fn choose_source(api_as_of: Option<&str>, snapshot_as_of: &str) -> SourceKind {
    match api_as_of {
        Some(api) if api > snapshot_as_of => SourceKind::Api,
        _ => SourceKind::Snapshot,
    }
}

/// Which fetcher to use, with the signals that decided it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSelection {
    pub source: SourceKind,
    /// API freshness, when known
    pub api: Option<FreshnessSignal>,
    pub snapshot: FreshnessSignal,
    /// Advisory message for the user (metadata unreachable, ...)
    pub notice: Option<String>,
}

impl SourceSelection {
    /// As-of date of the selected source.
    pub fn as_of(&self) -> &str {
        match (&self.source, &self.api) {
            (SourceKind::Api, Some(api)) => &api.as_of,
            _ => &self.snapshot.as_of,
        }
    }
}

/// Picks API or snapshot for the General category.
pub struct FreshnessArbiter {
    api: Arc<ApiClient>,
    snapshot_as_of: String,
    metadata: TtlCache<(), ApiMetadata, String>,
}

impl FreshnessArbiter {
    pub fn new(api: Arc<ApiClient>, snapshot_as_of: impl Into<String>, ttl: Duration) -> Self {
        Self {
            api,
            snapshot_as_of: snapshot_as_of.into(),
            metadata: TtlCache::new(ttl),
        }
    }

    pub fn snapshot_as_of(&self) -> &str {
        &self.snapshot_as_of
    }

    /// Forget the cached metadata.
    pub fn invalidate(&self) {
        self.metadata.invalidate_all();
    }

    /// Select the source for `category`. Never fails: an unreachable
    /// metadata endpoint selects the snapshot and adds a notice.
    pub async fn select_source(&self, category: DatasetCategory, force: bool) -> SourceSelection {
        let snapshot = FreshnessSignal {
            source: SourceKind::Snapshot,
            as_of: self.snapshot_as_of.clone(),
        };

        if !category.has_live_api() {
            return SourceSelection {
                source: SourceKind::Snapshot,
                api: None,
                snapshot,
                notice: None,
            };
        }

        if force {
            info!("Forced refresh, selecting API");
            return SourceSelection {
                source: SourceKind::Api,
                api: Some(FreshnessSignal {
                    source: SourceKind::Api,
                    as_of: today(),
                }),
                snapshot,
                notice: None,
            };
        }

        let (api_as_of, notice) = match self.api_as_of().await {
            Ok(Some(date)) => (Some(date), None),
            Ok(None) => (
                None,
                Some("API metadata carries no update timestamp; using snapshot".to_string()),
            ),
            Err(e) => {
                warn!(error = %e, "API metadata unavailable, defaulting to snapshot");
                (
                    None,
                    Some(format!("Could not check API freshness ({e}); using snapshot")),
                )
            }
        };

        let source = choose_source(api_as_of.as_deref(), &self.snapshot_as_of);
        debug!(
            api_as_of = api_as_of.as_deref().unwrap_or("unknown"),
            snapshot_as_of = %self.snapshot_as_of,
            selected = ?source,
            "Freshness compared"
        );

        SourceSelection {
            source,
            api: api_as_of.map(|as_of| FreshnessSignal {
                source: SourceKind::Api,
                as_of,
            }),
            snapshot,
            notice,
        }
    }

    async fn api_as_of(&self) -> Result<Option<String>, String> {
        let ttl = self.metadata.default_ttl();
        let metadata = self
            .metadata
            .get_or_fetch((), ttl, || async {
                self.api.fetch_metadata().await.map_err(|e| e.to_string())
            })
            .await?;
        Ok(metadata.last_updated().and_then(timestamp_to_date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApiConfig;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_strictly_newer_api_wins() {
        assert_eq!(choose_source(Some("20260301"), "20260217"), SourceKind::Api);
        assert_eq!(choose_source(Some("20260101"), "20260217"), SourceKind::Snapshot);
        assert_eq!(choose_source(Some("20260217"), "20260217"), SourceKind::Snapshot);
        assert_eq!(choose_source(None, "20260217"), SourceKind::Snapshot);
    }

    #[test]
    fn test_timestamp_uses_colombia_date() {
        // 2026-02-18T03:00:00Z is still the 17th in Bogotá
        assert_eq!(timestamp_to_date(1771383600).as_deref(), Some("20260217"));
        assert_eq!(timestamp_to_date(1772366400).as_deref(), Some("20260301"));
        assert_eq!(timestamp_to_date(i64::MAX), None);
    }

    #[test]
    fn test_today_is_eight_digits() {
        let date = today();
        assert_eq!(date.len(), 8);
        assert!(date.bytes().all(|b| b.is_ascii_digit()));
    }

    async fn arbiter_with_metadata(
        server: &MockServer,
        body: serde_json::Value,
    ) -> FreshnessArbiter {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/views/h2yr-zfb2.json");
                then.status(200).json_body(body);
            })
            .await;
        let config = ApiConfig {
            resource_url: server.url("/resource/h2yr-zfb2.json"),
            metadata_url: server.url("/api/views/h2yr-zfb2.json"),
            ..Default::default()
        };
        let api = Arc::new(ApiClient::new(&config, None).unwrap());
        FreshnessArbiter::new(api, "20260217", Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_newer_metadata_selects_api() {
        let server = MockServer::start_async().await;
        let arbiter =
            arbiter_with_metadata(&server, json!({"rowsUpdatedAt": 1772366400})).await;

        let selection = arbiter.select_source(DatasetCategory::General, false).await;
        assert_eq!(selection.source, SourceKind::Api);
        assert_eq!(selection.as_of(), "20260301");
        assert!(selection.notice.is_none());
    }

    #[tokio::test]
    async fn test_older_metadata_selects_snapshot() {
        let server = MockServer::start_async().await;
        let arbiter =
            arbiter_with_metadata(&server, json!({"dataUpdatedAt": 1767268800})).await;

        let selection = arbiter.select_source(DatasetCategory::General, false).await;
        assert_eq!(selection.source, SourceKind::Snapshot);
        assert_eq!(selection.as_of(), "20260217");
        assert_eq!(selection.api.unwrap().as_of, "20260101");
    }

    #[tokio::test]
    async fn test_metadata_without_timestamps_selects_snapshot() {
        let server = MockServer::start_async().await;
        let arbiter = arbiter_with_metadata(&server, json!({"name": "Subsidios"})).await;

        let selection = arbiter.select_source(DatasetCategory::General, false).await;
        assert_eq!(selection.source, SourceKind::Snapshot);
        assert!(selection.notice.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_metadata_selects_snapshot() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(500);
            })
            .await;
        let config = ApiConfig {
            metadata_url: server.url("/api/views/h2yr-zfb2.json"),
            ..Default::default()
        };
        let api = Arc::new(ApiClient::new(&config, None).unwrap());
        let arbiter = FreshnessArbiter::new(api, "20260217", Duration::from_secs(3600));

        let selection = arbiter.select_source(DatasetCategory::General, false).await;
        assert_eq!(selection.source, SourceKind::Snapshot);
        assert!(selection.notice.unwrap().contains("Could not check API freshness"));
    }

    #[tokio::test]
    async fn test_force_and_other_categories_skip_metadata() {
        let server = MockServer::start_async().await;
        let metadata = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/views/h2yr-zfb2.json");
                then.status(200).json_body(json!({"rowsUpdatedAt": 1767268800}));
            })
            .await;
        let config = ApiConfig {
            metadata_url: server.url("/api/views/h2yr-zfb2.json"),
            ..Default::default()
        };
        let api = Arc::new(ApiClient::new(&config, None).unwrap());
        let arbiter = FreshnessArbiter::new(api, "20260217", Duration::from_secs(3600));

        let forced = arbiter.select_source(DatasetCategory::General, true).await;
        assert_eq!(forced.source, SourceKind::Api);
        assert_eq!(forced.as_of(), today());

        let rural = arbiter.select_source(DatasetCategory::Rural, false).await;
        assert_eq!(rural.source, SourceKind::Snapshot);

        metadata.assert_calls_async(0).await;
    }
}
