//! Impact metrics value types.
//!
//! All three shapes are immutable snapshots produced by the source of record.
//! A refresh produces a brand-new snapshot; nothing here is patched in place.
//!
//! Wire names are camelCase. Every field is required and unknown fields are
//! rejected, so a half-populated object never decodes and the three shapes
//! never decode as one another.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ============================================================================
// IMPACT SUB-RECORDS
// ============================================================================

/// Environmental impact figures.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvironmentalImpact {
    /// CO2 saved (kg)
    pub co2_saved: f64,
    /// Trees planted
    pub trees_planted: f64,
    /// Waste reduced (kg)
    pub waste_reduced: f64,
}

impl EnvironmentalImpact {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_amount("environmentalImpact.co2Saved", self.co2_saved)?;
        check_amount("environmentalImpact.treesPlanted", self.trees_planted)?;
        check_amount("environmentalImpact.wasteReduced", self.waste_reduced)
    }
}

/// Social impact figures.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SocialImpact {
    /// Lives impacted
    pub lives_impacted: f64,
    /// Communities served
    pub communities_served: f64,
    /// Education hours delivered
    pub education_hours: f64,
}

impl SocialImpact {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_amount("socialImpact.livesImpacted", self.lives_impacted)?;
        check_amount("socialImpact.communitiesServed", self.communities_served)?;
        check_amount("socialImpact.educationHours", self.education_hours)
    }
}

// ============================================================================
// SCOPED SNAPSHOTS
// ============================================================================

/// Platform-wide impact snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GlobalImpactMetrics {
    pub total_projects: u64,
    pub total_volunteers: u64,
    pub total_organizations: u64,
    pub total_hours_volunteered: f64,
    pub total_certificates_issued: u64,
    pub environmental_impact: EnvironmentalImpact,
    pub social_impact: SocialImpact,
}

impl GlobalImpactMetrics {
    /// The snapshot reported before any activity has been recorded.
    pub fn zeroed() -> Self {
        Self::default()
    }

    /// Check that every figure is finite and non-negative.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_amount("totalHoursVolunteered", self.total_hours_volunteered)?;
        self.environmental_impact.validate()?;
        self.social_impact.validate()
    }
}

/// Impact snapshot scoped to one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrganizationImpactMetrics {
    pub organization_id: String,
    pub organization_name: String,
    pub total_projects: u64,
    pub total_volunteers: u64,
    pub total_hours_volunteered: f64,
    pub total_certificates_issued: u64,
    pub environmental_impact: EnvironmentalImpact,
    pub social_impact: SocialImpact,
}

impl OrganizationImpactMetrics {
    /// An organization that exists but has no recorded activity.
    pub fn zeroed(organization_id: impl Into<String>, organization_name: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            organization_name: organization_name.into(),
            total_projects: 0,
            total_volunteers: 0,
            total_hours_volunteered: 0.0,
            total_certificates_issued: 0,
            environmental_impact: EnvironmentalImpact::default(),
            social_impact: SocialImpact::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_id("organizationId", &self.organization_id)?;
        check_amount("totalHoursVolunteered", self.total_hours_volunteered)?;
        self.environmental_impact.validate()?;
        self.social_impact.validate()
    }
}

/// Impact snapshot scoped to one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectImpactMetrics {
    pub project_id: String,
    pub project_name: String,
    pub organization_id: String,
    pub organization_name: String,
    pub total_volunteers: u64,
    pub total_hours_volunteered: f64,
    pub total_certificates_issued: u64,
    pub environmental_impact: EnvironmentalImpact,
    pub social_impact: SocialImpact,
}

impl ProjectImpactMetrics {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_id("projectId", &self.project_id)?;
        check_amount("totalHoursVolunteered", self.total_hours_volunteered)?;
        self.environmental_impact.validate()?;
        self.social_impact.validate()
    }
}

// ============================================================================
// SCOPE
// ============================================================================

/// Granularity a metrics snapshot is computed at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MetricsScope {
    Global,
    Organization(String),
    Project(String),
}

/// Scope discriminator without the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Global,
    Organization,
    Project,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::Organization => "organization",
            ScopeKind::Project => "project",
        }
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricsScope {
    pub fn organization(id: impl Into<String>) -> Self {
        MetricsScope::Organization(id.into())
    }

    pub fn project(id: impl Into<String>) -> Self {
        MetricsScope::Project(id.into())
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            MetricsScope::Global => ScopeKind::Global,
            MetricsScope::Organization(_) => ScopeKind::Organization,
            MetricsScope::Project(_) => ScopeKind::Project,
        }
    }

    /// The scope id, `None` for the global scope.
    pub fn id(&self) -> Option<&str> {
        match self {
            MetricsScope::Global => None,
            MetricsScope::Organization(id) | MetricsScope::Project(id) => Some(id),
        }
    }
}

impl std::fmt::Display for MetricsScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}({})", self.kind(), id),
            None => write!(f, "{}", self.kind()),
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn check_amount(field: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("{} is not a finite number", value),
        });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

fn check_id(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_global() -> GlobalImpactMetrics {
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

    #[test]
    fn test_global_wire_names_are_camel_case() {
        let json = serde_json::to_value(sample_global()).unwrap();
        assert_eq!(json["totalProjects"], 10);
        assert_eq!(json["totalHoursVolunteered"], 1000.0);
        assert_eq!(json["environmentalImpact"]["co2Saved"], 100.0);
        assert_eq!(json["socialImpact"]["educationHours"], 300.0);
    }

    #[test]
    fn test_partial_object_is_rejected() {
        let json = r#"{"totalProjects": 3, "totalVolunteers": 1}"#;
        assert!(serde_json::from_str::<GlobalImpactMetrics>(json).is_err());
    }

    #[test]
    fn test_organization_shape_does_not_decode_as_global() {
        let org = OrganizationImpactMetrics::zeroed("org-1", "Org One");
        let bytes = serde_json::to_vec(&org).unwrap();
        assert!(serde_json::from_slice::<GlobalImpactMetrics>(&bytes).is_err());
        assert!(serde_json::from_slice::<ProjectImpactMetrics>(&bytes).is_err());
    }

    #[test]
    fn test_zeroed_global_is_valid() {
        let zero = GlobalImpactMetrics::zeroed();
        assert_eq!(zero.total_projects, 0);
        assert!(zero.validate().is_ok());
    }

    #[test]
    fn test_negative_amount_fails_validation() {
        let mut metrics = sample_global();
        metrics.environmental_impact.trees_planted = -1.0;
        let err = metrics.validate().unwrap_err();
        assert!(matches!(err, ValidationError::NegativeValue { ref field, .. } if field == "environmentalImpact.treesPlanted"));
    }

    #[test]
    fn test_non_finite_amount_fails_validation() {
        let mut metrics = sample_global();
        metrics.total_hours_volunteered = f64::NAN;
        assert!(matches!(
            metrics.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_scope_kind_and_id() {
        assert_eq!(MetricsScope::Global.kind(), ScopeKind::Global);
        assert_eq!(MetricsScope::Global.id(), None);

        let org = MetricsScope::organization("org-7");
        assert_eq!(org.kind(), ScopeKind::Organization);
        assert_eq!(org.id(), Some("org-7"));
        assert_eq!(org.to_string(), "organization(org-7)");

        let project = MetricsScope::project("p-1");
        assert_eq!(project.kind().as_str(), "project");
    }

    #[test]
    fn test_empty_organization_id_fails_validation() {
        let org = OrganizationImpactMetrics::zeroed("  ", "Nameless");
        assert!(matches!(
            org.validate(),
            Err(ValidationError::RequiredFieldMissing { ref field }) if field == "organizationId"
        ));
    }

    #[test]
    fn test_project_requires_only_its_own_id() {
        let project = ProjectImpactMetrics {
            project_id: "p-1".to_string(),
            project_name: "Orphan".to_string(),
            organization_id: String::new(),
            organization_name: String::new(),
            total_volunteers: 2,
            total_hours_volunteered: 4.5,
            total_certificates_issued: 0,
            environmental_impact: EnvironmentalImpact::default(),
            social_impact: SocialImpact::default(),
        };
        assert!(project.validate().is_ok());

        let unnamed = ProjectImpactMetrics {
            project_id: " ".to_string(),
            ..project
        };
        assert!(matches!(
            unnamed.validate(),
            Err(ValidationError::RequiredFieldMissing { ref field }) if field == "projectId"
        ));
    }
}
