//! Source-of-record abstraction for impact metrics.
//!
//! Computing a snapshot is assumed to be slow and fallible. Implementations
//! own their connections; the metrics service only awaits them.

use std::collections::HashMap;

use ::async_trait::async_trait;
use impact_core::{
    GlobalImpactMetrics, ImpactResult, OrganizationImpactMetrics, ProjectImpactMetrics,
};
use tokio::sync::RwLock;

/// Async repository computing metrics snapshots from the system of record.
///
/// `organization_metrics` and `project_metrics` return `Ok(None)` for an id
/// with no corresponding data. `global_metrics` never reports absence: with
/// no data recorded yet it returns [`GlobalImpactMetrics::zeroed`].
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Compute the platform-wide snapshot.
    async fn global_metrics(&self) -> ImpactResult<GlobalImpactMetrics>;

    /// Compute the snapshot for one organization.
    async fn organization_metrics(
        &self,
        organization_id: &str,
    ) -> ImpactResult<Option<OrganizationImpactMetrics>>;

    /// Compute the snapshot for one project.
    async fn project_metrics(&self, project_id: &str) -> ImpactResult<Option<ProjectImpactMetrics>>;

    /// Check that the source of record is reachable.
    async fn health_check(&self) -> ImpactResult<()> {
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY REPOSITORY
// ============================================================================

/// In-process source of record.
///
/// Backs development mode and tests. Snapshots are replaced wholesale by the
/// setters, never patched.
#[derive(Debug, Default)]
pub struct InMemoryMetricsRepository {
    global: RwLock<Option<GlobalImpactMetrics>>,
    organizations: RwLock<HashMap<String, OrganizationImpactMetrics>>,
    projects: RwLock<HashMap<String, ProjectImpactMetrics>>,
}

impl InMemoryMetricsRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository seeded with a global snapshot.
    pub fn with_global(global: GlobalImpactMetrics) -> Self {
        Self {
            global: RwLock::new(Some(global)),
            ..Self::default()
        }
    }

    pub async fn set_global(&self, metrics: GlobalImpactMetrics) {
        *self.global.write().await = Some(metrics);
    }

    pub async fn clear_global(&self) {
        *self.global.write().await = None;
    }

    pub async fn upsert_organization(&self, metrics: OrganizationImpactMetrics) {
        self.organizations
            .write()
            .await
            .insert(metrics.organization_id.clone(), metrics);
    }

    pub async fn remove_organization(&self, organization_id: &str) -> bool {
        self.organizations
            .write()
            .await
            .remove(organization_id)
            .is_some()
    }

    pub async fn upsert_project(&self, metrics: ProjectImpactMetrics) {
        self.projects
            .write()
            .await
            .insert(metrics.project_id.clone(), metrics);
    }

    pub async fn remove_project(&self, project_id: &str) -> bool {
        self.projects.write().await.remove(project_id).is_some()
    }

    /// Number of organizations with a recorded snapshot.
    pub async fn organization_count(&self) -> usize {
        self.organizations.read().await.len()
    }

    /// Number of projects with a recorded snapshot.
    pub async fn project_count(&self) -> usize {
        self.projects.read().await.len()
    }
}

#[async_trait]
impl MetricsRepository for InMemoryMetricsRepository {
    async fn global_metrics(&self) -> ImpactResult<GlobalImpactMetrics> {
        Ok(self
            .global
            .read()
            .await
            .clone()
            .unwrap_or_else(GlobalImpactMetrics::zeroed))
    }

    async fn organization_metrics(
        &self,
        organization_id: &str,
    ) -> ImpactResult<Option<OrganizationImpactMetrics>> {
        Ok(self.organizations.read().await.get(organization_id).cloned())
    }

    async fn project_metrics(&self, project_id: &str) -> ImpactResult<Option<ProjectImpactMetrics>> {
        Ok(self.projects.read().await.get(project_id).cloned())
    }
}
