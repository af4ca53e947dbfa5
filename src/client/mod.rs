//! Source fetchers: the paginated open-data API and the static snapshots.

mod api;
mod rate_limiter;
mod snapshot;

pub use api::*;
pub use rate_limiter::*;
pub use snapshot::*;
