//! Impact Core - Metrics Value Types
//!
//! Pure data structures shared by every other crate: the three metrics
//! snapshot shapes, scope identifiers and the error taxonomy.
//! No I/O lives here.

pub mod entities;
pub mod error;

pub use entities::{
    EnvironmentalImpact, GlobalImpactMetrics, MetricsScope, OrganizationImpactMetrics,
    ProjectImpactMetrics, ScopeKind, SocialImpact,
};
pub use error::{
    CacheError, ConfigError, ImpactError, ImpactResult, StorageError, ValidationError,
};
