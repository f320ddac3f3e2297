//! Shared application state for Axum routers.

use std::time::Instant;

use impact_storage::MetricsCacheService;

/// Application-wide state shared across all routes.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Cache-aside metrics service. Routes never talk to the repository or
    /// the cache client directly.
    pub metrics_service: MetricsCacheService,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(metrics_service: MetricsCacheService) -> Self {
        Self {
            metrics_service,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(MetricsCacheService, metrics_service);
crate::impl_from_ref!(Instant, start_time);
