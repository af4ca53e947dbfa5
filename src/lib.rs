//! subsidios - Ingestion and normalization of Colombian housing-subsidy data.
//!
//! ## Architecture
//!
//! Five dataset categories come from two kinds of source:
//! - **Open-data API**: paginated, rate limited; General category only
//! - **Snapshots**: one delimited export per category, dated `20260217`
//!
//! ## Pipeline
//!
//! Category → Freshness check (General) → Fetch → Normalize → Cache → Query
//!
//! - **Schema**: column canonicalization, numeric coercion, derived totals
//! - **Pipeline**: source selection, single-flight TTL cache, router
//! - **Query**: read-only filters, group sums, headline totals, CSV export
//!
//! Datasets are immutable once normalized and shared as `Arc<Dataset>`.

pub mod client;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod schema;

// Re-exports for convenience
pub use client::{ApiClient, PageObserver, RateLimiter, SnapshotFetcher};
pub use models::{
    Config, Dataset, DatasetCategory, Record, Result, SourceLabel, SubsidiosError, Value,
};
pub use pipeline::{DatasetCache, DatasetRouter, FreshnessArbiter, LoadOutcome};
pub use query::{Filter, QueryView, Totals};
pub use schema::normalize;
