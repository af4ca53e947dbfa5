//! Pipeline module - source selection, loading and caching of datasets.

mod cache;
mod freshness;
mod router;

pub use cache::*;
pub use freshness::*;
pub use router::*;
