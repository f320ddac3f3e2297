//! Scheduled Metrics Refresh
//!
//! Periodically recomputes the global impact snapshot and overwrites its
//! cache entry through [`MetricsCacheService::refresh_metrics_cache`], so
//! dashboards reading the global metrics rarely see a cold cache.
//!
//! # Configuration
//!
//! ```rust
//! use impact_api::jobs::RefreshJobConfig;
//! use std::time::Duration;
//!
//! let config = RefreshJobConfig {
//!     enabled: true,
//!     interval: Duration::from_secs(3600), // Hourly
//!     run_on_start: true,                  // Warm the cache at boot
//! };
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use impact_storage::MetricsCacheService;
use tokio::sync::watch;
use tokio::time::{interval_at, MissedTickBehavior};

use crate::config::{flag_or, parse_or, process_env};
use crate::constants::DEFAULT_REFRESH_INTERVAL_SECS;
use crate::telemetry::metrics;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the refresh background task.
#[derive(Debug, Clone)]
pub struct RefreshJobConfig {
    /// Whether the task is spawned at all (default: true)
    pub enabled: bool,

    /// Time between refreshes (default: 1 hour)
    pub interval: Duration,

    /// Refresh immediately instead of waiting one interval (default: true)
    pub run_on_start: bool,
}

impl Default for RefreshJobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            run_on_start: true,
        }
    }
}

impl RefreshJobConfig {
    /// Create RefreshJobConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `IMPACT_REFRESH_ENABLED`: "true" or "false" (default: true)
    /// - `IMPACT_REFRESH_INTERVAL_SECS`: Seconds between refreshes (default: 3600)
    /// - `IMPACT_REFRESH_ON_START`: Refresh at boot (default: true)
    pub fn from_env() -> Self {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        // A zero interval would make tokio panic.
        let interval_secs =
            parse_or(&lookup, "IMPACT_REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS).max(1);

        Self {
            enabled: flag_or(&lookup, "IMPACT_REFRESH_ENABLED", true),
            interval: Duration::from_secs(interval_secs),
            run_on_start: flag_or(&lookup, "IMPACT_REFRESH_ON_START", true),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for refresh activity since the task started.
#[derive(Debug, Default)]
pub struct MetricsRefreshMetrics {
    /// Refresh cycles attempted
    pub runs: AtomicU64,

    /// Cycles where the snapshot was recomputed
    pub successes: AtomicU64,

    /// Cycles where the repository failed
    pub failures: AtomicU64,
}

impl MetricsRefreshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsRefreshSnapshot {
        MetricsRefreshSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of refresh metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsRefreshSnapshot {
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that refreshes the global metrics cache on a schedule.
///
/// Runs until the shutdown signal is received (or its sender is dropped)
/// and returns the metrics collected during its lifetime. A failed refresh
/// is logged and counted; the next tick tries again.
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(metrics_refresh_task(service, config, shutdown_rx));
///
/// // Later, trigger shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn metrics_refresh_task(
    service: MetricsCacheService,
    config: RefreshJobConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<MetricsRefreshMetrics> {
    let job_metrics = Arc::new(MetricsRefreshMetrics::new());

    let first_tick = if config.run_on_start {
        tokio::time::Instant::now()
    } else {
        tokio::time::Instant::now() + config.interval
    };
    let mut refresh_interval = interval_at(first_tick, config.interval);
    refresh_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        run_on_start = config.run_on_start,
        "Metrics refresh task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Metrics refresh task shutting down");
                    break;
                }
            }

            _ = refresh_interval.tick() => {
                run_refresh_cycle(&service, &job_metrics).await;
            }
        }
    }

    let snapshot = job_metrics.snapshot();
    tracing::info!(
        runs = snapshot.runs,
        successes = snapshot.successes,
        failures = snapshot.failures,
        "Metrics refresh task completed"
    );

    job_metrics
}

/// Run a single refresh and record its outcome. Returns whether it succeeded.
pub async fn run_refresh_cycle(
    service: &MetricsCacheService,
    job_metrics: &MetricsRefreshMetrics,
) -> bool {
    let start = Instant::now();
    job_metrics.runs.fetch_add(1, Ordering::Relaxed);

    let result = service.refresh_metrics_cache().await;
    let elapsed = start.elapsed();

    if let Some(m) = metrics() {
        m.record_refresh(result.is_ok(), elapsed.as_secs_f64());
    }

    match result {
        Ok(()) => {
            job_metrics.successes.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                duration_ms = elapsed.as_millis(),
                cache_backend = service.cache_backend().unwrap_or("none"),
                "Global metrics cache refreshed"
            );
            true
        }
        Err(e) => {
            job_metrics.failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                error = %e,
                duration_ms = elapsed.as_millis(),
                "Scheduled metrics refresh failed"
            );
            false
        }
    }
}
