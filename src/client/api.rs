//! Paginated client for the open-data (Socrata) API.
//!
//! - Rows are paged with `$limit` / `$offset`; a short or empty page is the last
//! - Pages are requested one at a time, never in parallel
//! - A failed page ends the sweep but keeps the rows already fetched
//! - 429 answers are retried on the same page after the limiter's backoff

use crate::client::RateLimiter;
use crate::models::{ApiConfig, RawTable, Result, SubsidiosError};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Receives the running record count after every page.
pub trait PageObserver: Send + Sync {
    fn on_page(&self, records_so_far: usize);
}

impl<F> PageObserver for F
where
    F: Fn(usize) + Send + Sync,
{
    fn on_page(&self, records_so_far: usize) {
        self(records_so_far)
    }
}

/// Result of a full pagination sweep.
#[derive(Debug)]
pub struct ApiSweep {
    /// Rows from every page that succeeded
    pub table: RawTable,
    /// HTTP requests issued, 429 retries included
    pub requests: usize,
    /// The failure that stopped pagination early, if any
    pub error: Option<SubsidiosError>,
    pub duration: Duration,
}

impl ApiSweep {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Dataset metadata; both timestamps are Unix seconds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiMetadata {
    #[serde(rename = "rowsUpdatedAt", default)]
    pub rows_updated_at: Option<i64>,
    #[serde(rename = "dataUpdatedAt", default)]
    pub data_updated_at: Option<i64>,
}

impl ApiMetadata {
    /// `rowsUpdatedAt`, falling back to `dataUpdatedAt`.
    pub fn last_updated(&self) -> Option<i64> {
        self.rows_updated_at.or(self.data_updated_at)
    }
}

/// Open-data API client.
pub struct ApiClient {
    http: reqwest::Client,
    resource_url: String,
    metadata_url: String,
    page_size: usize,
    timeout: Duration,
    max_retries: u32,
    rate_limiter: Arc<RateLimiter>,
}

impl ApiClient {
    /// Create a new API client.
    pub fn new(config: &ApiConfig, rate_limiter: Option<Arc<RateLimiter>>) -> Result<Self> {
        let timeout = config.timeout();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("subsidios/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SubsidiosError::Network)?;

        Ok(Self {
            http,
            resource_url: config.resource_url.clone(),
            metadata_url: config.metadata_url.clone(),
            page_size: config.page_size.max(1),
            timeout,
            max_retries: config.max_retries.max(1),
            rate_limiter: rate_limiter.unwrap_or_else(|| Arc::new(RateLimiter::new())),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch every page of the resource.
    ///
    /// Never fails as a whole: a failed page stops pagination and is
    /// reported in [`ApiSweep::error`] next to the rows gathered so far.
    pub async fn fetch_all(&self, observer: Option<&dyn PageObserver>) -> ApiSweep {
        let start = Instant::now();
        let mut table = RawTable::new();
        let mut requests = 0usize;
        let mut offset = 0usize;
        let mut error = None;

        info!(url = %self.resource_url, page_size = self.page_size, "Starting API sweep");

        loop {
            let page = match self.fetch_page(offset, &mut requests).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        offset = offset,
                        records_kept = table.len(),
                        error = %e,
                        "API page failed, stopping pagination"
                    );
                    error = Some(e);
                    break;
                }
            };

            let page_len = page.len();
            for row in page {
                table.push_json_object(row);
            }

            if page_len == 0 {
                break;
            }

            offset += self.page_size;
            if let Some(observer) = observer {
                observer.on_page(table.len());
            }
            debug!(page_len = page_len, total = table.len(), "Fetched API page");

            if page_len < self.page_size {
                break;
            }
        }

        let sweep = ApiSweep {
            table,
            requests,
            error,
            duration: start.elapsed(),
        };

        info!(
            records = sweep.table.len(),
            requests = sweep.requests,
            complete = sweep.is_complete(),
            throttled_total = self.rate_limiter.stats().throttled,
            elapsed_ms = sweep.duration.as_millis() as u64,
            "API sweep finished"
        );

        sweep
    }

    /// Fetch one page, retrying on 429 up to `max_retries` attempts.
    async fn fetch_page(
        &self,
        offset: usize,
        requests: &mut usize,
    ) -> Result<Vec<serde_json::Map<String, serde_json::Value>>> {
        let mut attempt = 1;
        loop {
            match self.request_page(offset, requests).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    debug!(
                        attempt = attempt,
                        offset = offset,
                        retry_after_secs = e.retry_after(),
                        "Page rate limited, retrying"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// One request for one page. The limiter's backoff is awaited first.
    async fn request_page(
        &self,
        offset: usize,
        requests: &mut usize,
    ) -> Result<Vec<serde_json::Map<String, serde_json::Value>>> {
        self.rate_limiter.wait_if_needed(&self.resource_url).await;

        *requests += 1;
        let response = self
            .http
            .get(&self.resource_url)
            .query(&[("$limit", self.page_size), ("$offset", offset)])
            .send()
            .await
            .map_err(|e| SubsidiosError::from_request(e, self.timeout))?;

        let status = response.status().as_u16();
        let pause = self
            .rate_limiter
            .record_response(&self.resource_url, status, response.headers());

        if status == 429 {
            return Err(SubsidiosError::RateLimited {
                retry_after_secs: pause.unwrap_or_default().as_secs_f64(),
            });
        }

        if !response.status().is_success() {
            return Err(SubsidiosError::HttpStatus {
                status,
                url: self.resource_url.clone(),
            });
        }

        let rows: Vec<serde_json::Value> = response.json().await.map_err(|e| {
            if e.is_timeout() {
                SubsidiosError::Timeout(self.timeout)
            } else {
                SubsidiosError::ParseError(format!("Invalid page at offset {offset}: {e}"))
            }
        })?;

        rows.into_iter()
            .map(|row| match row {
                serde_json::Value::Object(object) => Ok(object),
                other => Err(SubsidiosError::ParseError(format!(
                    "Expected a row object at offset {offset}, got {other}"
                ))),
            })
            .collect()
    }

    /// Fetch dataset metadata. Goes through the same limiter as the pages,
    /// tracked under the metadata URL.
    pub async fn fetch_metadata(&self) -> Result<ApiMetadata> {
        self.rate_limiter.wait_if_needed(&self.metadata_url).await;

        let response = self
            .http
            .get(&self.metadata_url)
            .send()
            .await
            .map_err(|e| SubsidiosError::from_request(e, self.timeout))?;

        let status = response.status().as_u16();
        let pause = self
            .rate_limiter
            .record_response(&self.metadata_url, status, response.headers());

        if let Some(pause) = pause {
            return Err(SubsidiosError::RateLimited {
                retry_after_secs: pause.as_secs_f64(),
            });
        }

        if !response.status().is_success() {
            return Err(SubsidiosError::HttpStatus {
                status,
                url: self.metadata_url.clone(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SubsidiosError::ParseError(format!("Invalid metadata: {e}")))
    }
}
