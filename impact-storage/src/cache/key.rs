//! Scope-aware cache key scheme.
//!
//! The encoded strings are part of the deployment contract: changing them
//! orphans every entry already sitting in a shared cache.

use impact_core::{MetricsScope, ScopeKind};

/// Key prefix for the platform-wide snapshot.
pub const GLOBAL_PREFIX: &str = "global";

/// Key prefix for organization snapshots.
pub const ORGANIZATION_PREFIX: &str = "organization";

/// Key prefix for project snapshots.
pub const PROJECT_PREFIX: &str = "project";

/// Suffix shared by every metrics key.
pub const METRICS_SUFFIX: &str = "metrics";

const SEPARATOR: char = ':';

/// A cache key naming one scope's metrics snapshot.
///
/// # Format
///
/// | Scope | Encoded |
/// |---|---|
/// | global | `global:metrics` |
/// | organization | `organization:{organizationId}:metrics` |
/// | project | `project:{projectId}:metrics` |
///
/// The inner scope is private, so a key can only come from one of the
/// constructors below or from [`MetricsCacheKey::decode`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricsCacheKey {
    scope: MetricsScope,
}

impl MetricsCacheKey {
    pub fn global() -> Self {
        Self {
            scope: MetricsScope::Global,
        }
    }

    pub fn organization(organization_id: impl Into<String>) -> Self {
        Self {
            scope: MetricsScope::Organization(organization_id.into()),
        }
    }

    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            scope: MetricsScope::Project(project_id.into()),
        }
    }

    pub fn for_scope(scope: &MetricsScope) -> Self {
        Self {
            scope: scope.clone(),
        }
    }

    /// The scope this key names.
    pub fn scope(&self) -> &MetricsScope {
        &self.scope
    }

    pub fn kind(&self) -> ScopeKind {
        self.scope.kind()
    }

    /// Encode to the cache-side string.
    pub fn encode(&self) -> String {
        match &self.scope {
            MetricsScope::Global => format!("{GLOBAL_PREFIX}{SEPARATOR}{METRICS_SUFFIX}"),
            MetricsScope::Organization(id) => {
                format!("{ORGANIZATION_PREFIX}{SEPARATOR}{id}{SEPARATOR}{METRICS_SUFFIX}")
            }
            MetricsScope::Project(id) => {
                format!("{PROJECT_PREFIX}{SEPARATOR}{id}{SEPARATOR}{METRICS_SUFFIX}")
            }
        }
    }

    /// Decode a cache-side string.
    ///
    /// Returns `None` for anything that is not a metrics key, including a
    /// scoped key with an empty id.
    pub fn decode(encoded: &str) -> Option<Self> {
        let rest = encoded.strip_suffix(METRICS_SUFFIX)?.strip_suffix(SEPARATOR)?;

        if rest == GLOBAL_PREFIX {
            return Some(Self::global());
        }

        let (prefix, id) = rest.split_once(SEPARATOR)?;
        if id.is_empty() {
            return None;
        }

        match prefix {
            ORGANIZATION_PREFIX => Some(Self::organization(id)),
            PROJECT_PREFIX => Some(Self::project(id)),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetricsCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<&MetricsScope> for MetricsCacheKey {
    fn from(scope: &MetricsScope) -> Self {
        Self::for_scope(scope)
    }
}
