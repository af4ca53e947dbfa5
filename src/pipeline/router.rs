//! Dataset router: category → source → fetch → normalize → cache.
//!
//! Pipeline flow:
//! Category → FreshnessArbiter (General only) → Fetcher → Normalizer → DatasetCache

use crate::client::{ApiClient, PageObserver, RateLimiter, SnapshotFetcher};
use crate::models::{
    Completeness, Config, Dataset, DatasetCategory, Result, SourceKind, SourceLabel,
    SubsidiosError,
};
use crate::schema::normalize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::cache::{DatasetCache, FetchKey};
use super::freshness::FreshnessArbiter;

/// A loaded dataset plus the banners to show next to it.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub dataset: Arc<Dataset>,
    /// Advisory messages (partial sweep, fallback, unknown freshness)
    pub notices: Vec<String>,
}

impl LoadOutcome {
    pub fn source(&self) -> SourceLabel {
        self.dataset.source()
    }

    pub fn as_of(&self) -> &str {
        self.dataset.as_of()
    }
}

/// Routes a category to its source and serves the normalized result.
pub struct DatasetRouter {
    api: Arc<ApiClient>,
    snapshots: SnapshotFetcher,
    arbiter: FreshnessArbiter,
    cache: Arc<DatasetCache>,
    observer: Option<Arc<dyn PageObserver>>,
}

impl DatasetRouter {
    pub fn new(api: Arc<ApiClient>, snapshots: SnapshotFetcher, cache: Arc<DatasetCache>) -> Self {
        let arbiter = FreshnessArbiter::new(
            Arc::clone(&api),
            snapshots.as_of().to_string(),
            cache.default_ttl(),
        );

        Self {
            api,
            snapshots,
            arbiter,
            cache,
            observer: None,
        }
    }

    /// Build the fetchers from configuration, sharing one rate limiter.
    pub fn from_config(config: &Config, cache: Arc<DatasetCache>) -> Result<Self> {
        let rate_limiter = Arc::new(RateLimiter::new());
        let api = Arc::new(ApiClient::new(&config.api, Some(rate_limiter))?);
        let snapshots = SnapshotFetcher::new(&config.snapshots)?;
        Ok(Self::new(api, snapshots, cache))
    }

    /// Report API pagination progress to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn PageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Load `category`, from cache when possible.
    ///
    /// `force_refresh` drops every cached dataset and, for General, fetches
    /// the API regardless of freshness. Fails with [`SubsidiosError::NoData`]
    /// when no source yields a single row.
    pub async fn load(
        &self,
        category: DatasetCategory,
        force_refresh: bool,
    ) -> Result<LoadOutcome> {
        let start = Instant::now();

        if force_refresh {
            self.cache.invalidate_all();
            self.arbiter.invalidate();
        }

        let selection = self.arbiter.select_source(category, force_refresh).await;
        let mut notices: Vec<String> = selection.notice.iter().cloned().collect();

        let dataset = match selection.source {
            SourceKind::Api => match self.load_api(selection.as_of()).await {
                Ok(dataset) => dataset,
                Err(e) => {
                    warn!(error = %e, "API yielded no rows, falling back to snapshot");
                    notices.push(format!(
                        "The API returned no data ({e}); showing the snapshot of {}",
                        self.snapshots.as_of()
                    ));
                    self.load_snapshot(category).await?
                }
            },
            SourceKind::Snapshot => self.load_snapshot(category).await?,
        };

        if let Completeness::Partial { reason } = dataset.completeness() {
            notices.push(format!(
                "Partial data: {} records were loaded before the API stopped responding ({reason})",
                dataset.len()
            ));
        }

        info!(
            category = %category,
            source = %dataset.source(),
            as_of = %dataset.as_of(),
            records = dataset.len(),
            cache_hits = self.cache.stats().hits,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dataset ready"
        );

        Ok(LoadOutcome { dataset, notices })
    }

    async fn load_api(&self, as_of: &str) -> Result<Arc<Dataset>> {
        let key = FetchKey::ApiSweep {
            as_of: as_of.to_string(),
        };

        self.cache
            .get_or_fetch(key, self.cache.default_ttl(), || async {
                let sweep = self.api.fetch_all(self.observer.as_deref()).await;

                if sweep.table.is_empty() {
                    return Err(match sweep.error {
                        Some(e) => format!("API sweep failed: {e}"),
                        None => "API returned no records".to_string(),
                    });
                }

                let completeness = match &sweep.error {
                    Some(e) => Completeness::Partial {
                        reason: e.to_string(),
                    },
                    None => Completeness::Complete,
                };

                Ok(normalize(sweep.table, DatasetCategory::General)
                    .with_source(SourceLabel::Api, as_of)
                    .with_completeness(completeness))
            })
            .await
            .map_err(|reason| SubsidiosError::NoData {
                category: DatasetCategory::General,
                reason,
            })
    }

    async fn load_snapshot(&self, category: DatasetCategory) -> Result<Arc<Dataset>> {
        let key = FetchKey::Snapshot(category);

        self.cache
            .get_or_fetch(key, self.cache.default_ttl(), || async {
                let raw = match self.snapshots.fetch(category).await {
                    Ok(raw) => raw,
                    Err(e) => return Err(format!("snapshot unavailable: {e}")),
                };

                if raw.is_empty() {
                    return Err("snapshot has no records".to_string());
                }

                Ok(normalize(raw, category)
                    .with_source(SourceLabel::Snapshot(category), self.snapshots.as_of()))
            })
            .await
            .map_err(|reason| SubsidiosError::NoData { category, reason })
    }
}
