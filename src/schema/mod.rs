//! Schema module - column canonicalization, coercion and per-category rules.

mod coerce;
mod columns;
mod departments;
mod normalizer;
mod profile;

pub use coerce::*;
pub use columns::*;
pub use departments::{DepartmentRule, fold_key, official_name};
pub use normalizer::*;
pub use profile::*;
