//! Background Jobs for the impact API
//!
//! - `metrics_refresh`: Recomputes and re-caches the global metrics snapshot
//!
//! # Usage
//!
//! ```ignore
//! use impact_api::jobs::{metrics_refresh_task, RefreshJobConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(metrics_refresh_task(service.clone(), RefreshJobConfig::from_env(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod metrics_refresh;

pub use metrics_refresh::{
    metrics_refresh_task, run_refresh_cycle, MetricsRefreshMetrics, MetricsRefreshSnapshot,
    RefreshJobConfig,
};
