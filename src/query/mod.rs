//! Query module - read-only filtering, aggregation and export.

mod export;
mod filter;
mod view;

pub use export::*;
pub use filter::*;
pub use view::*;
