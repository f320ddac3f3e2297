//! Impact Test Utilities
//!
//! Centralized test infrastructure for the impact workspace:
//! - Proptest generators for the metrics shapes
//! - Instrumented mocks for the repository and the cache client
//! - Test fixtures for common scenarios
//! - Custom assertions for metrics results

// Re-export the in-memory implementations from their source crate
pub use impact_storage::{InMemoryCacheClient, InMemoryMetricsRepository};

// Re-export core types for convenience
pub use impact_core::{
    CacheError, EnvironmentalImpact, GlobalImpactMetrics, ImpactError, ImpactResult,
    MetricsScope, OrganizationImpactMetrics, ProjectImpactMetrics, SocialImpact, StorageError,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use impact_storage::{CacheClient, MetricsRepository};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MOCK REPOSITORY
// ============================================================================

/// Repository mock that counts calls per operation and can be told to fail.
#[derive(Debug, Default)]
pub struct CountingRepository {
    global: Mutex<GlobalImpactMetrics>,
    organizations: Mutex<HashMap<String, OrganizationImpactMetrics>>,
    projects: Mutex<HashMap<String, ProjectImpactMetrics>>,
    failure: Mutex<Option<ImpactError>>,
    global_calls: AtomicUsize,
    organization_calls: AtomicUsize,
    project_calls: AtomicUsize,
    health_calls: AtomicUsize,
}

impl CountingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository whose global snapshot is `global`.
    pub fn with_global(global: GlobalImpactMetrics) -> Self {
        let repo = Self::default();
        repo.set_global(global);
        repo
    }

    pub fn set_global(&self, global: GlobalImpactMetrics) {
        *lock(&self.global) = global;
    }

    pub fn insert_organization(&self, metrics: OrganizationImpactMetrics) {
        lock(&self.organizations).insert(metrics.organization_id.clone(), metrics);
    }

    pub fn insert_project(&self, metrics: ProjectImpactMetrics) {
        lock(&self.projects).insert(metrics.project_id.clone(), metrics);
    }

    /// Make every subsequent call fail with `error`.
    pub fn fail_with(&self, error: ImpactError) {
        *lock(&self.failure) = Some(error);
    }

    /// Stop injecting failures.
    pub fn recover(&self) {
        *lock(&self.failure) = None;
    }

    pub fn global_calls(&self) -> usize {
        self.global_calls.load(Ordering::SeqCst)
    }

    pub fn organization_calls(&self) -> usize {
        self.organization_calls.load(Ordering::SeqCst)
    }

    pub fn project_calls(&self) -> usize {
        self.project_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    /// Calls across all metrics operations.
    pub fn total_calls(&self) -> usize {
        self.global_calls() + self.organization_calls() + self.project_calls()
    }

    fn injected_failure(&self) -> ImpactResult<()> {
        match lock(&self.failure).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MetricsRepository for CountingRepository {
    async fn global_metrics(&self) -> ImpactResult<GlobalImpactMetrics> {
        self.global_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        Ok(lock(&self.global).clone())
    }

    async fn organization_metrics(
        &self,
        organization_id: &str,
    ) -> ImpactResult<Option<OrganizationImpactMetrics>> {
        self.organization_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        Ok(lock(&self.organizations).get(organization_id).cloned())
    }

    async fn project_metrics(&self, project_id: &str) -> ImpactResult<Option<ProjectImpactMetrics>> {
        self.project_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        Ok(lock(&self.projects).get(project_id).cloned())
    }

    async fn health_check(&self) -> ImpactResult<()> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()
    }
}

// ============================================================================
// MOCK CACHE CLIENT
// ============================================================================

/// A `set` observed by [`RecordingCacheClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSet {
    pub key: String,
    pub value: Vec<u8>,
    pub ttl: Duration,
}

/// Cache client mock that records every call and can fail on demand.
///
/// Values are kept without expiry; TTLs are only recorded.
#[derive(Debug, Default)]
pub struct RecordingCacheClient {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    sets: Mutex<Vec<RecordedSet>>,
    gets: Mutex<Vec<String>>,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
}

impl RecordingCacheClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose every operation fails, as if the server were down.
    pub fn unreachable() -> Self {
        let client = Self::default();
        client.set_fail_get(true);
        client.set_fail_set(true);
        client
    }

    /// Store raw bytes directly, bypassing the recorded `set` path.
    pub fn seed(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        lock(&self.entries).insert(key.into(), value.into());
    }

    pub fn set_fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    /// Raw bytes currently stored under `key`.
    pub fn stored(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.entries).get(key).cloned()
    }

    /// Every `set` attempt, failed ones included.
    pub fn recorded_sets(&self) -> Vec<RecordedSet> {
        lock(&self.sets).clone()
    }

    /// Every key passed to `get`.
    pub fn recorded_gets(&self) -> Vec<String> {
        lock(&self.gets).clone()
    }

    pub fn set_count(&self) -> usize {
        lock(&self.sets).len()
    }
}

#[async_trait]
impl CacheClient for RecordingCacheClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        lock(&self.gets).push(key.to_string());
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(CacheError::Connection {
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.stored(key))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        lock(&self.sets).push(RecordedSet {
            key: key.to_string(),
            value: value.to_vec(),
            ttl,
        });
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(CacheError::Timeout {
                operation: "SET".to_string(),
                timeout_ms: 500,
            });
        }
        lock(&self.entries).insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating metrics types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a non-empty scope identifier.
    pub fn arb_scope_id() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9-]{0,23}"
    }

    /// Generate a display name.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z ]{0,30}"
    }

    /// Generate a finite, non-negative amount.
    pub fn arb_amount() -> impl Strategy<Value = f64> {
        prop_oneof![
            Just(0.0),
            (0u32..100_000).prop_map(f64::from),
            0.0f64..1e12,
        ]
    }

    /// Generate a count.
    pub fn arb_count() -> impl Strategy<Value = u64> {
        prop_oneof![0u64..10_000, any::<u64>()]
    }

    pub fn arb_environmental_impact() -> impl Strategy<Value = EnvironmentalImpact> {
        (arb_amount(), arb_amount(), arb_amount()).prop_map(
            |(co2_saved, trees_planted, waste_reduced)| EnvironmentalImpact {
                co2_saved,
                trees_planted,
                waste_reduced,
            },
        )
    }

    pub fn arb_social_impact() -> impl Strategy<Value = SocialImpact> {
        (arb_amount(), arb_amount(), arb_amount()).prop_map(
            |(lives_impacted, communities_served, education_hours)| SocialImpact {
                lives_impacted,
                communities_served,
                education_hours,
            },
        )
    }

    pub fn arb_global_metrics() -> impl Strategy<Value = GlobalImpactMetrics> {
        (
            (arb_count(), arb_count(), arb_count()),
            arb_amount(),
            arb_count(),
            arb_environmental_impact(),
            arb_social_impact(),
        )
            .prop_map(
                |(
                    (total_projects, total_volunteers, total_organizations),
                    total_hours_volunteered,
                    total_certificates_issued,
                    environmental_impact,
                    social_impact,
                )| GlobalImpactMetrics {
                    total_projects,
                    total_volunteers,
                    total_organizations,
                    total_hours_volunteered,
                    total_certificates_issued,
                    environmental_impact,
                    social_impact,
                },
            )
    }

    pub fn arb_organization_metrics() -> impl Strategy<Value = OrganizationImpactMetrics> {
        (
            (arb_scope_id(), arb_name()),
            (arb_count(), arb_count()),
            arb_amount(),
            arb_count(),
            arb_environmental_impact(),
            arb_social_impact(),
        )
            .prop_map(
                |(
                    (organization_id, organization_name),
                    (total_projects, total_volunteers),
                    total_hours_volunteered,
                    total_certificates_issued,
                    environmental_impact,
                    social_impact,
                )| OrganizationImpactMetrics {
                    organization_id,
                    organization_name,
                    total_projects,
                    total_volunteers,
                    total_hours_volunteered,
                    total_certificates_issued,
                    environmental_impact,
                    social_impact,
                },
            )
    }

    pub fn arb_project_metrics() -> impl Strategy<Value = ProjectImpactMetrics> {
        (
            (arb_scope_id(), arb_name(), arb_scope_id(), arb_name()),
            arb_count(),
            arb_amount(),
            arb_count(),
            arb_environmental_impact(),
            arb_social_impact(),
        )
            .prop_map(
                |(
                    (project_id, project_name, organization_id, organization_name),
                    total_volunteers,
                    total_hours_volunteered,
                    total_certificates_issued,
                    environmental_impact,
                    social_impact,
                )| ProjectImpactMetrics {
                    project_id,
                    project_name,
                    organization_id,
                    organization_name,
                    total_volunteers,
                    total_hours_volunteered,
                    total_certificates_issued,
                    environmental_impact,
                    social_impact,
                },
            )
    }

    pub fn arb_scope() -> impl Strategy<Value = MetricsScope> {
        prop_oneof![
            Just(MetricsScope::Global),
            arb_scope_id().prop_map(MetricsScope::Organization),
            arb_scope_id().prop_map(MetricsScope::Project),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// Id that no repository fixture knows about.
    pub const NON_EXISTENT_ID: &str = "non-existent";

    /// Global snapshot used by the reference cold-cache scenario.
    pub fn scenario_global_metrics() -> GlobalImpactMetrics {
        GlobalImpactMetrics {
            total_projects: 10,
            total_volunteers: 50,
            total_organizations: 5,
            total_hours_volunteered: 1000.0,
            total_certificates_issued: 25,
            environmental_impact: EnvironmentalImpact {
                co2_saved: 100.0,
                trees_planted: 50.0,
                waste_reduced: 200.0,
            },
            social_impact: SocialImpact {
                lives_impacted: 500.0,
                communities_served: 10.0,
                education_hours: 300.0,
            },
        }
    }

    /// The reference global snapshot as JSON, the way it sits in a cache.
    pub fn scenario_global_json() -> Vec<u8> {
        serde_json::to_vec(&scenario_global_metrics()).unwrap_or_default()
    }

    pub fn organization_metrics(organization_id: &str) -> OrganizationImpactMetrics {
        OrganizationImpactMetrics {
            organization_id: organization_id.to_string(),
            organization_name: "Green Streets".to_string(),
            total_projects: 4,
            total_volunteers: 32,
            total_hours_volunteered: 410.5,
            total_certificates_issued: 12,
            environmental_impact: EnvironmentalImpact {
                co2_saved: 42.25,
                trees_planted: 18.0,
                waste_reduced: 96.0,
            },
            social_impact: SocialImpact {
                lives_impacted: 120.0,
                communities_served: 3.0,
                education_hours: 64.0,
            },
        }
    }

    pub fn project_metrics(project_id: &str, organization_id: &str) -> ProjectImpactMetrics {
        ProjectImpactMetrics {
            project_id: project_id.to_string(),
            project_name: "River Cleanup".to_string(),
            organization_id: organization_id.to_string(),
            organization_name: "Green Streets".to_string(),
            total_volunteers: 9,
            total_hours_volunteered: 72.75,
            total_certificates_issued: 4,
            environmental_impact: EnvironmentalImpact {
                co2_saved: 0.0,
                trees_planted: 0.0,
                waste_reduced: 310.0,
            },
            social_impact: SocialImpact {
                lives_impacted: 40.0,
                communities_served: 1.0,
                education_hours: 6.0,
            },
        }
    }

    /// The error a failing source of record reports.
    pub fn database_error() -> ImpactError {
        ImpactError::Storage(StorageError::QueryFailed {
            operation: "global_metrics".to_string(),
            reason: "Database error".to_string(),
        })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for metrics results.

    use super::*;

    /// Assert that an ImpactResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &ImpactResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that an ImpactResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &ImpactResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that an ImpactResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &ImpactResult<T>) {
        match result {
            Err(ImpactError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a scoped read reported absence.
    #[track_caller]
    pub fn assert_absent<T: std::fmt::Debug>(result: &ImpactResult<Option<T>>) {
        match result {
            Ok(None) => {}
            other => panic!("Expected absent result, got: {:?}", other),
        }
    }

    /// Assert that the cache recorded no writes.
    #[track_caller]
    pub fn assert_no_cache_writes(cache: &RecordingCacheClient) {
        let sets = cache.recorded_sets();
        assert!(sets.is_empty(), "Expected no cache writes, got: {:?}", sets);
    }

    /// Assert that exactly one write hit `key` with `ttl` and return its bytes.
    #[track_caller]
    pub fn assert_single_write(cache: &RecordingCacheClient, key: &str, ttl: Duration) -> Vec<u8> {
        let sets = cache.recorded_sets();
        let matching: Vec<_> = sets.iter().filter(|set| set.key == key).collect();
        assert_eq!(
            matching.len(),
            1,
            "Expected one write to {}, got: {:?}",
            key,
            sets
        );
        assert_eq!(matching[0].ttl, ttl, "Unexpected TTL for {}", key);
        matching[0].value.clone()
    }

    /// Assert that two amounts are bit-for-bit equal.
    #[track_caller]
    pub fn assert_same_amount(left: f64, right: f64) {
        assert_eq!(
            left.to_bits(),
            right.to_bits(),
            "Amounts differ: {} vs {}",
            left,
            right
        );
    }
}
