//! Cache-aside metrics service.
//!
//! Routes every metrics read through an optional cache client before the
//! repository, and owns the forced write-through refresh of the global entry.
//!
//! | Cache attached? | Cache result | Action |
//! |---|---|---|
//! | no | n/a | repository, no write |
//! | yes | hit | decoded value, repository not called |
//! | yes | miss | repository, best-effort write |
//! | yes | error or undecodable | same as miss |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use impact_core::{
    GlobalImpactMetrics, ImpactResult, OrganizationImpactMetrics, ProjectImpactMetrics,
};
use tracing::{debug, warn};

use super::codec::{decode_metrics, encode_metrics};
use super::key::MetricsCacheKey;
use super::traits::{CacheClient, CacheCounters, CacheStats, CachedMetrics};
use crate::repository::MetricsRepository;

/// Time-to-live shared by every metrics entry (24 hours).
pub const DEFAULT_METRICS_TTL: Duration = Duration::from_secs(86_400);

/// Configuration for the metrics cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied to every cache write, for all scopes.
    pub entry_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: DEFAULT_METRICS_TTL,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }
}

/// How a repository result maps onto a cacheable snapshot.
///
/// The global read always yields a snapshot; scoped reads yield `Option`
/// and an absent result is never written.
trait MetricsLookup: Sized + Send {
    type Snapshot: CachedMetrics;

    fn from_cached(snapshot: Self::Snapshot) -> Self;

    fn snapshot(&self) -> Option<&Self::Snapshot>;
}

impl MetricsLookup for GlobalImpactMetrics {
    type Snapshot = GlobalImpactMetrics;

    fn from_cached(snapshot: Self::Snapshot) -> Self {
        snapshot
    }

    fn snapshot(&self) -> Option<&Self::Snapshot> {
        Some(self)
    }
}

impl<T: CachedMetrics> MetricsLookup for Option<T> {
    type Snapshot = T;

    fn from_cached(snapshot: Self::Snapshot) -> Self {
        Some(snapshot)
    }

    fn snapshot(&self) -> Option<&Self::Snapshot> {
        self.as_ref()
    }
}

/// Cache-aside service over a metrics repository.
///
/// Cheap to clone; clones share the repository, the cache client and the
/// statistics counters. Holds no per-request state, so one instance can
/// serve any number of concurrent callers.
///
/// # Example
///
/// ```ignore
/// let service = MetricsCacheService::new(repository, Some(cache), CacheConfig::default());
/// let global = service.global_metrics().await?;
/// ```
#[derive(Clone)]
pub struct MetricsCacheService {
    repository: Arc<dyn MetricsRepository>,
    cache: Option<Arc<dyn CacheClient>>,
    config: CacheConfig,
    counters: Arc<CacheCounters>,
}

impl MetricsCacheService {
    /// Create a service. `None` for `cache` runs every read straight
    /// against the repository.
    pub fn new(
        repository: Arc<dyn MetricsRepository>,
        cache: Option<Arc<dyn CacheClient>>,
        config: CacheConfig,
    ) -> Self {
        Self {
            repository,
            cache,
            config,
            counters: Arc::new(CacheCounters::new()),
        }
    }

    /// Create a service with caching disabled.
    pub fn without_cache(repository: Arc<dyn MetricsRepository>) -> Self {
        Self::new(repository, None, CacheConfig::default())
    }

    pub fn is_cache_attached(&self) -> bool {
        self.cache.is_some()
    }

    /// Name of the attached cache backend, if any.
    pub fn cache_backend(&self) -> Option<&'static str> {
        self.cache.as_ref().map(|cache| cache.backend_name())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a reference to the underlying repository.
    pub fn repository(&self) -> &Arc<dyn MetricsRepository> {
        &self.repository
    }

    /// Cache usage since this service was built.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Platform-wide metrics.
    pub async fn global_metrics(&self) -> ImpactResult<GlobalImpactMetrics> {
        self.cache_aside(MetricsCacheKey::global(), self.repository.global_metrics())
            .await
    }

    /// Metrics for one organization, `None` if it does not exist.
    pub async fn organization_metrics(
        &self,
        organization_id: &str,
    ) -> ImpactResult<Option<OrganizationImpactMetrics>> {
        self.cache_aside(
            MetricsCacheKey::organization(organization_id),
            self.repository.organization_metrics(organization_id),
        )
        .await
    }

    /// Metrics for one project, `None` if it does not exist.
    pub async fn project_metrics(
        &self,
        project_id: &str,
    ) -> ImpactResult<Option<ProjectImpactMetrics>> {
        self.cache_aside(
            MetricsCacheKey::project(project_id),
            self.repository.project_metrics(project_id),
        )
        .await
    }

    // ========================================================================
    // REFRESH
    // ========================================================================

    /// Recompute the global snapshot and overwrite its cache entry.
    ///
    /// Always calls the repository. A repository error is returned unchanged
    /// and nothing is written. A cache write failure is logged and counted
    /// but does not fail the refresh.
    pub async fn refresh_metrics_cache(&self) -> ImpactResult<()> {
        let snapshot = self.repository.global_metrics().await?;

        match self.cache.as_deref() {
            Some(cache) => {
                let key = MetricsCacheKey::global();
                if self.populate(cache, &key, &snapshot).await {
                    debug!(key = %key, "Refreshed metrics cache entry");
                }
            }
            None => {
                self.counters.record_bypass();
                debug!("No cache attached, refresh computed snapshot only");
            }
        }

        Ok(())
    }

    // ========================================================================
    // CACHE-ASIDE CORE
    // ========================================================================

    /// Serve `key` from the cache, or await `fetch` and populate.
    ///
    /// `fetch` is only polled on the fall-through path, so a hit never
    /// touches the repository.
    async fn cache_aside<L, F>(&self, key: MetricsCacheKey, fetch: F) -> ImpactResult<L>
    where
        L: MetricsLookup,
        F: Future<Output = ImpactResult<L>> + Send,
    {
        let Some(cache) = self.cache.as_deref() else {
            self.counters.record_bypass();
            return fetch.await;
        };

        if let Some(cached) = self.read_cached::<L::Snapshot>(cache, &key).await {
            return Ok(L::from_cached(cached));
        }

        let fetched = fetch.await?;
        match fetched.snapshot() {
            Some(snapshot) => {
                self.populate(cache, &key, snapshot).await;
            }
            None => debug!(key = %key, "Scope not found, nothing cached"),
        }
        Ok(fetched)
    }

    async fn read_cached<T: CachedMetrics>(
        &self,
        cache: &dyn CacheClient,
        key: &MetricsCacheKey,
    ) -> Option<T> {
        let encoded = key.encode();
        match cache.get(&encoded).await {
            Ok(Some(bytes)) => match decode_metrics::<T>(key, &bytes) {
                Ok(value) => {
                    self.counters.record_hit();
                    debug!(key = %encoded, "Metrics cache hit");
                    Some(value)
                }
                Err(e) => {
                    self.counters.record_decode_failure();
                    warn!(key = %encoded, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                self.counters.record_miss();
                debug!(key = %encoded, "Metrics cache miss");
                None
            }
            Err(e) => {
                self.counters.record_error();
                warn!(
                    key = %encoded,
                    backend = cache.backend_name(),
                    error = %e,
                    "Cache read failed, falling back to repository"
                );
                None
            }
        }
    }

    /// Best-effort write. Returns whether the entry was stored.
    async fn populate<T: CachedMetrics>(
        &self,
        cache: &dyn CacheClient,
        key: &MetricsCacheKey,
        snapshot: &T,
    ) -> bool {
        if let Err(e) = snapshot.validate_snapshot() {
            self.counters.record_write_failure();
            warn!(key = %key, error = %e, "Refusing to cache invalid snapshot");
            return false;
        }

        // The read path rejects entries owned by another key.
        let owner = snapshot.cache_key();
        if owner != *key {
            self.counters.record_write_failure();
            warn!(key = %key, owner = %owner, "Refusing to cache snapshot for a different scope id");
            return false;
        }

        let bytes = match encode_metrics(key, snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.counters.record_write_failure();
                warn!(key = %key, error = %e, "Failed to encode metrics snapshot");
                return false;
            }
        };

        match cache.set(&key.encode(), &bytes, self.config.entry_ttl).await {
            Ok(()) => {
                self.counters.record_write();
                true
            }
            Err(e) => {
                self.counters.record_write_failure();
                warn!(
                    key = %key,
                    backend = cache.backend_name(),
                    error = %e,
                    "Cache write failed"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for MetricsCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCacheService")
            .field("cache_backend", &self.cache_backend())
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use impact_core::{
        CacheError, EnvironmentalImpact, ImpactError, SocialImpact, StorageError,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // Mock cache client recording every write
    #[derive(Default)]
    struct MockCacheClient {
        entries: Mutex<HashMap<String, Vec<u8>>>,
        sets: Mutex<Vec<(String, Duration)>>,
        fail_get: bool,
        fail_set: bool,
    }

    impl MockCacheClient {
        fn failing() -> Self {
            Self {
                fail_get: true,
                fail_set: true,
                ..Default::default()
            }
        }

        fn seed(&self, key: &str, value: Vec<u8>) {
            self.entries.lock().unwrap().insert(key.to_string(), value);
        }

        fn sets(&self) -> Vec<(String, Duration)> {
            self.sets.lock().unwrap().clone()
        }

        fn raw(&self, key: &str) -> Option<Vec<u8>> {
            self.entries.lock().unwrap().get(key).cloned()
        }
    }

    #[async_trait]
    impl CacheClient for MockCacheClient {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            if self.fail_get {
                return Err(CacheError::Connection {
                    reason: "connection refused".to_string(),
                });
            }
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
            self.sets.lock().unwrap().push((key.to_string(), ttl));
            if self.fail_set {
                return Err(CacheError::Timeout {
                    operation: "SET".to_string(),
                    timeout_ms: 100,
                });
            }
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "mock"
        }
    }

    // Mock repository counting calls
    #[derive(Default)]
    struct MockRepository {
        global: Mutex<GlobalImpactMetrics>,
        organizations: Mutex<HashMap<String, OrganizationImpactMetrics>>,
        global_calls: AtomicUsize,
        organization_calls: AtomicUsize,
        project_calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MetricsRepository for MockRepository {
        async fn global_metrics(&self) -> ImpactResult<GlobalImpactMetrics> {
            self.global_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(database_error());
            }
            Ok(self.global.lock().unwrap().clone())
        }

        async fn organization_metrics(
            &self,
            organization_id: &str,
        ) -> ImpactResult<Option<OrganizationImpactMetrics>> {
            self.organization_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .organizations
                .lock()
                .unwrap()
                .get(organization_id)
                .cloned())
        }

        async fn project_metrics(
            &self,
            _project_id: &str,
        ) -> ImpactResult<Option<ProjectImpactMetrics>> {
            self.project_calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    fn database_error() -> ImpactError {
        ImpactError::Storage(StorageError::QueryFailed {
            operation: "global_metrics".to_string(),
            reason: "Database error".to_string(),
        })
    }

    fn scenario_global() -> GlobalImpactMetrics {
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

    fn service_with(
        repo: Arc<MockRepository>,
        cache: Option<Arc<MockCacheClient>>,
    ) -> MetricsCacheService {
        MetricsCacheService::new(
            repo,
            cache.map(|c| c as Arc<dyn CacheClient>),
            CacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_cold_cache_populates_with_default_ttl() {
        let repo = Arc::new(MockRepository {
            global: Mutex::new(scenario_global()),
            ..Default::default()
        });
        let cache = Arc::new(MockCacheClient::default());
        let service = service_with(repo.clone(), Some(cache.clone()));

        let result = service.global_metrics().await.unwrap();

        assert_eq!(result, scenario_global());
        assert_eq!(repo.global_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.sets(),
            vec![("global:metrics".to_string(), Duration::from_secs(86_400))]
        );
        let stored: GlobalImpactMetrics =
            serde_json::from_slice(&cache.raw("global:metrics").unwrap()).unwrap();
        assert_eq!(stored, scenario_global());
    }

    #[tokio::test]
    async fn test_second_read_served_from_cache() {
        let repo = Arc::new(MockRepository {
            global: Mutex::new(scenario_global()),
            ..Default::default()
        });
        let cache = Arc::new(MockCacheClient::default());
        let service = service_with(repo.clone(), Some(cache));

        let first = service.global_metrics().await.unwrap();
        let second = service.global_metrics().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.global_calls.load(Ordering::SeqCst), 1);
        let stats = service.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
    }

    #[tokio::test]
    async fn test_warm_cache_skips_repository() {
        let repo = Arc::new(MockRepository::default());
        let cache = Arc::new(MockCacheClient::default());
        cache.seed(
            "global:metrics",
            serde_json::to_vec(&scenario_global()).unwrap(),
        );
        let service = service_with(repo.clone(), Some(cache.clone()));

        let result = service.global_metrics().await.unwrap();

        assert_eq!(result, scenario_global());
        assert_eq!(repo.global_calls.load(Ordering::SeqCst), 0);
        assert!(cache.sets().is_empty());
    }

    #[tokio::test]
    async fn test_no_cache_always_hits_repository() {
        let repo = Arc::new(MockRepository::default());
        let service = MetricsCacheService::without_cache(repo.clone());

        service.global_metrics().await.unwrap();
        service.global_metrics().await.unwrap();

        assert!(!service.is_cache_attached());
        assert_eq!(service.cache_backend(), None);
        assert_eq!(repo.global_calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.stats().bypasses, 2);
    }

    #[tokio::test]
    async fn test_cache_faults_fall_through_to_repository() {
        let repo = Arc::new(MockRepository {
            global: Mutex::new(scenario_global()),
            ..Default::default()
        });
        let cache = Arc::new(MockCacheClient::failing());
        let service = service_with(repo.clone(), Some(cache));

        let result = service.global_metrics().await.unwrap();

        assert_eq!(result, scenario_global());
        let stats = service.stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.write_failures, 1);
    }

    #[tokio::test]
    async fn test_undecodable_entry_treated_as_miss() {
        let repo = Arc::new(MockRepository {
            global: Mutex::new(scenario_global()),
            ..Default::default()
        });
        let cache = Arc::new(MockCacheClient::default());
        cache.seed("global:metrics", b"\x00garbage".to_vec());
        let service = service_with(repo.clone(), Some(cache.clone()));

        let result = service.global_metrics().await.unwrap();

        assert_eq!(result, scenario_global());
        assert_eq!(repo.global_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.stats().decode_failures, 1);
        // overwritten with a good entry
        let stored: GlobalImpactMetrics =
            serde_json::from_slice(&cache.raw("global:metrics").unwrap()).unwrap();
        assert_eq!(stored, scenario_global());
    }

    #[tokio::test]
    async fn test_absent_organization_not_cached() {
        let repo = Arc::new(MockRepository::default());
        let cache = Arc::new(MockCacheClient::default());
        let service = service_with(repo.clone(), Some(cache.clone()));

        assert!(service
            .organization_metrics("non-existent")
            .await
            .unwrap()
            .is_none());
        assert!(cache.sets().is_empty());

        repo.organizations.lock().unwrap().insert(
            "non-existent".to_string(),
            OrganizationImpactMetrics::zeroed("non-existent", "Late Arrival"),
        );
        let found = service.organization_metrics("non-existent").await.unwrap();
        assert_eq!(
            found.map(|o| o.organization_name),
            Some("Late Arrival".to_string())
        );
        assert_eq!(repo.organization_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_absent_project_not_cached() {
        let repo = Arc::new(MockRepository::default());
        let cache = Arc::new(MockCacheClient::default());
        let service = service_with(repo.clone(), Some(cache.clone()));

        assert!(service.project_metrics("ghost").await.unwrap().is_none());
        assert!(service.project_metrics("ghost").await.unwrap().is_none());
        assert_eq!(repo.project_calls.load(Ordering::SeqCst), 2);
        assert!(cache.sets().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_overwrites_warm_entry() {
        let repo = Arc::new(MockRepository {
            global: Mutex::new(scenario_global()),
            ..Default::default()
        });
        let cache = Arc::new(MockCacheClient::default());
        let service = service_with(repo.clone(), Some(cache.clone()));

        service.global_metrics().await.unwrap();

        let mut updated = scenario_global();
        updated.total_projects = 11;
        *repo.global.lock().unwrap() = updated.clone();

        service.refresh_metrics_cache().await.unwrap();
        assert_eq!(repo.global_calls.load(Ordering::SeqCst), 2);

        let observed = service.global_metrics().await.unwrap();
        assert_eq!(observed, updated);
        assert_eq!(repo.global_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_propagates_repository_error_without_writing() {
        let repo = Arc::new(MockRepository {
            fail: true,
            ..Default::default()
        });
        let cache = Arc::new(MockCacheClient::default());
        let service = service_with(repo, Some(cache.clone()));

        let err = service.refresh_metrics_cache().await.unwrap_err();

        assert_eq!(err, database_error());
        assert!(cache.sets().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_succeeds_when_cache_write_fails() {
        let repo = Arc::new(MockRepository::default());
        let cache = Arc::new(MockCacheClient::failing());
        let service = service_with(repo, Some(cache.clone()));

        service.refresh_metrics_cache().await.unwrap();
        assert_eq!(cache.sets().len(), 1);
        assert_eq!(service.stats().write_failures, 1);
    }

    #[tokio::test]
    async fn test_refresh_without_cache_still_calls_repository() {
        let repo = Arc::new(MockRepository::default());
        let service = MetricsCacheService::without_cache(repo.clone());

        service.refresh_metrics_cache().await.unwrap();
        assert_eq!(repo.global_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_snapshot_returned_but_not_cached() {
        let mut bad = scenario_global();
        bad.social_impact.education_hours = -3.0;
        let repo = Arc::new(MockRepository {
            global: Mutex::new(bad.clone()),
            ..Default::default()
        });
        let cache = Arc::new(MockCacheClient::default());
        let service = service_with(repo, Some(cache.clone()));

        assert_eq!(service.global_metrics().await.unwrap(), bad);
        assert!(cache.sets().is_empty());
        assert_eq!(service.stats().write_failures, 1);
    }

    #[tokio::test]
    async fn test_snapshot_for_other_id_returned_but_not_cached() {
        let repo = Arc::new(MockRepository::default());
        repo.organizations.lock().unwrap().insert(
            "ORG-1".to_string(),
            OrganizationImpactMetrics::zeroed("org-1", "Canonical Org"),
        );
        let cache = Arc::new(MockCacheClient::default());
        let service = service_with(repo.clone(), Some(cache.clone()));

        for _ in 0..3 {
            let found = service.organization_metrics("ORG-1").await.unwrap();
            assert_eq!(found.map(|o| o.organization_id), Some("org-1".to_string()));
        }

        assert!(cache.sets().is_empty());
        assert!(cache.raw("organization:ORG-1:metrics").is_none());
        let stats = service.stats();
        assert_eq!(stats.write_failures, 3);
        assert_eq!(stats.writes, 0);
        assert_eq!(stats.decode_failures, 0);
        assert_eq!(repo.organization_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_custom_ttl_applies_to_all_scopes() {
        let repo = Arc::new(MockRepository::default());
        repo.organizations.lock().unwrap().insert(
            "org-1".to_string(),
            OrganizationImpactMetrics::zeroed("org-1", "One"),
        );
        let cache = Arc::new(MockCacheClient::default());
        let service = MetricsCacheService::new(
            repo,
            Some(cache.clone() as Arc<dyn CacheClient>),
            CacheConfig::new().with_ttl(Duration::from_secs(600)),
        );

        service.global_metrics().await.unwrap();
        service.organization_metrics("org-1").await.unwrap();

        assert!(cache
            .sets()
            .iter()
            .all(|(_, ttl)| *ttl == Duration::from_secs(600)));
        assert_eq!(cache.sets()[1].0, "organization:org-1:metrics");
    }

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::new().with_ttl(Duration::from_secs(1800));
        assert_eq!(config.entry_ttl, Duration::from_secs(1800));
        assert_eq!(CacheConfig::default().entry_ttl, DEFAULT_METRICS_TTL);
    }
}
