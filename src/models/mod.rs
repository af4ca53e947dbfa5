//! Core data models for subsidios.
//!
//! - Concrete types for categories, cells, records and datasets
//! - Configuration resolved from TOML
//! - Error variants with their recovery semantics

mod config;
mod dataset;
mod error;

pub use config::*;
pub use dataset::*;
pub use error::*;
