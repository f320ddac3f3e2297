//! Property-Based Tests for the Metrics Cache
//!
//! **Property 1: Cache-aside transparency**
//!
//! For any snapshot the repository holds, a read through the service returns
//! that snapshot whether the cache is cold, warm, unreachable or detached.
//!
//! **Property 2: Single repository call per cold key**
//!
//! Two consecutive reads of the same scope call the repository once.
//!
//! **Property 3: Cached bytes round-trip**
//!
//! The bytes written to the cache decode to the exact snapshot returned,
//! float fields included.
//!
//! Organization and project snapshots round-trip through the codec, and an
//! entry never decodes as a different shape.
//!
//! **Property 4: Refresh wins**
//!
//! After `refresh_metrics_cache`, a global read observes the refreshed
//! snapshot, never the entry it replaced.

use std::sync::Arc;
use std::time::Duration;

use impact_core::{GlobalImpactMetrics, MetricsScope};
use impact_storage::{
    decode_metrics, encode_metrics, CacheConfig, CachedMetrics, InMemoryCacheClient,
    MetricsCacheKey, MetricsCacheService,
};
use impact_test_utils::assertions::*;
use impact_test_utils::generators::*;
use impact_test_utils::{CountingRepository, RecordingCacheClient};
use proptest::prelude::*;
use tokio::runtime::Runtime;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn cached_service(
    repo: &Arc<CountingRepository>,
    cache: &Arc<RecordingCacheClient>,
) -> MetricsCacheService {
    MetricsCacheService::new(repo.clone(), Some(cache.clone()), CacheConfig::default())
}

fn same_global(left: &GlobalImpactMetrics, right: &GlobalImpactMetrics) {
    assert_eq!(left.total_projects, right.total_projects);
    assert_same_amount(left.total_hours_volunteered, right.total_hours_volunteered);
    assert_same_amount(
        left.environmental_impact.co2_saved,
        right.environmental_impact.co2_saved,
    );
    assert_same_amount(
        left.social_impact.education_hours,
        right.social_impact.education_hours,
    );
    assert_eq!(left, right);
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_global_reads_are_transparent(global in arb_global_metrics()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let repo = Arc::new(CountingRepository::with_global(global.clone()));
            let cache = Arc::new(RecordingCacheClient::new());
            let service = cached_service(&repo, &cache);

            let cold = service.global_metrics().await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            let warm = service.global_metrics().await.map_err(|e| TestCaseError::fail(e.to_string()))?;

            same_global(&cold, &global);
            same_global(&warm, &global);
            prop_assert_eq!(repo.global_calls(), 1);

            let bytes = assert_single_write(&cache, "global:metrics", Duration::from_secs(86_400));
            let decoded: GlobalImpactMetrics = decode_metrics(&MetricsCacheKey::global(), &bytes)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            same_global(&decoded, &global);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_organization_reads_are_transparent(org in arb_organization_metrics()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let repo = Arc::new(CountingRepository::new());
            repo.insert_organization(org.clone());
            let cache = Arc::new(RecordingCacheClient::new());
            let service = cached_service(&repo, &cache);

            for _ in 0..2 {
                let read = service
                    .organization_metrics(&org.organization_id)
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(read.as_ref(), Some(&org));
            }
            prop_assert_eq!(repo.organization_calls(), 1);

            let key = MetricsCacheKey::organization(org.organization_id.clone());
            let stored = cache.stored(&key.encode());
            prop_assert!(stored.is_some());
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_project_reads_are_transparent(project in arb_project_metrics()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let repo = Arc::new(CountingRepository::new());
            repo.insert_project(project.clone());
            let cache = Arc::new(RecordingCacheClient::new());
            let service = cached_service(&repo, &cache);

            let first = service
                .project_metrics(&project.project_id)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let second = service
                .project_metrics(&project.project_id)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            prop_assert_eq!(first.as_ref(), Some(&project));
            prop_assert_eq!(second.as_ref(), Some(&project));
            prop_assert_eq!(repo.project_calls(), 1);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_scoped_snapshots_round_trip(
        org in arb_organization_metrics(),
        project in arb_project_metrics(),
    ) {
        let org_key = org.cache_key();
        let bytes = encode_metrics(&org_key, &org).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decoded: impact_core::OrganizationImpactMetrics = decode_metrics(&org_key, &bytes)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(&decoded, &org);

        let project_key = project.cache_key();
        let bytes = encode_metrics(&project_key, &project)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decoded: impact_core::ProjectImpactMetrics = decode_metrics(&project_key, &bytes)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(&decoded, &project);

        // An organization entry never decodes under a project key.
        let org_bytes = encode_metrics(&org_key, &org).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let misplaced =
            decode_metrics::<impact_core::ProjectImpactMetrics>(&project_key, &org_bytes);
        prop_assert!(misplaced.is_err());
    }

    #[test]
    fn prop_unreachable_cache_never_fails_reads(global in arb_global_metrics()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let repo = Arc::new(CountingRepository::with_global(global.clone()));
            let cache = Arc::new(RecordingCacheClient::unreachable());
            let service = cached_service(&repo, &cache);

            for _ in 0..3 {
                let read = service
                    .global_metrics()
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                same_global(&read, &global);
            }
            prop_assert_eq!(repo.global_calls(), 3);
            prop_assert_eq!(service.stats().errors, 3);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_unknown_scopes_are_never_cached(scope in arb_scope()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let repo = Arc::new(CountingRepository::new());
            let cache = Arc::new(RecordingCacheClient::new());
            let service = cached_service(&repo, &cache);

            match &scope {
                MetricsScope::Global => {
                    let read = service.global_metrics().await;
                    assert_ok(&read);
                }
                MetricsScope::Organization(id) => {
                    assert_absent(&service.organization_metrics(id).await);
                    assert_no_cache_writes(&cache);
                }
                MetricsScope::Project(id) => {
                    assert_absent(&service.project_metrics(id).await);
                    assert_no_cache_writes(&cache);
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_refresh_replaces_cached_global(
        before in arb_global_metrics(),
        after in arb_global_metrics(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let repo = Arc::new(CountingRepository::with_global(before.clone()));
            let service = MetricsCacheService::new(
                repo.clone(),
                Some(Arc::new(InMemoryCacheClient::new())),
                CacheConfig::default(),
            );

            let warm = service.global_metrics().await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            same_global(&warm, &before);

            repo.set_global(after.clone());
            service
                .refresh_metrics_cache()
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let read = service.global_metrics().await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            same_global(&read, &after);
            prop_assert_eq!(repo.global_calls(), 2);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
