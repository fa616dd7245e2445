pub mod error;
pub mod handlers;
pub mod server;
pub mod store;

use std::num::NonZeroU32;
use std::time::Duration;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    /// Creation bounds enforced at the API boundary.
    pub limits: Limits,
}

/// Upper bounds for the creation fields, fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_views: NonZeroU32,
    pub max_ttl: Duration,
}

pub use error::{ApiError, ApiResult};
pub use server::{router, run, ServerConfig};
pub use store::Store;
