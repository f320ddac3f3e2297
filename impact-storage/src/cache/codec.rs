//! JSON value codec for cached metrics.
//!
//! Values are stored as plain JSON so any client of a shared cache can read
//! them. Decoding is strict: a value is only accepted if it parses as the
//! expected shape, passes validation, and belongs to the key it was read from.

use impact_core::CacheError;

use super::key::MetricsCacheKey;
use super::traits::CachedMetrics;

/// Serialize a snapshot for storage under `key`.
pub fn encode_metrics<T: CachedMetrics>(
    key: &MetricsCacheKey,
    value: &T,
) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(value).map_err(|e| CacheError::Serialization {
        key: key.encode(),
        reason: e.to_string(),
    })
}

/// Decode bytes read from `key` into a snapshot.
///
/// Every rejection is a [`CacheError::Deserialization`]; the metrics service
/// treats it as a miss.
pub fn decode_metrics<T: CachedMetrics>(
    key: &MetricsCacheKey,
    bytes: &[u8],
) -> Result<T, CacheError> {
    let value: T = serde_json::from_slice(bytes).map_err(|e| CacheError::Deserialization {
        key: key.encode(),
        reason: e.to_string(),
    })?;

    value
        .validate_snapshot()
        .map_err(|e| CacheError::Deserialization {
            key: key.encode(),
            reason: e.to_string(),
        })?;

    let owner = value.cache_key();
    if owner != *key {
        return Err(CacheError::Deserialization {
            key: key.encode(),
            reason: format!("entry belongs to {}", owner),
        });
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use impact_core::{
        EnvironmentalImpact, GlobalImpactMetrics, OrganizationImpactMetrics,
        ProjectImpactMetrics, SocialImpact,
    };

    fn project() -> ProjectImpactMetrics {
        ProjectImpactMetrics {
            project_id: "p-1".to_string(),
            project_name: "Tree Drive".to_string(),
            organization_id: "org-1".to_string(),
            organization_name: "Roots".to_string(),
            total_volunteers: 7,
            total_hours_volunteered: 0.1 + 0.2,
            total_certificates_issued: 1,
            environmental_impact: EnvironmentalImpact {
                co2_saved: 1e-7,
                trees_planted: 123_456_789.987_654_3,
                waste_reduced: 0.0,
            },
            social_impact: SocialImpact {
                lives_impacted: 3.0,
                communities_served: 1.0,
                education_hours: 2.5,
            },
        }
    }

    #[test]
    fn test_floats_survive_exactly() {
        let key = MetricsCacheKey::project("p-1");
        let bytes = encode_metrics(&key, &project()).unwrap();
        let decoded: ProjectImpactMetrics = decode_metrics(&key, &bytes).unwrap();
        assert_eq!(decoded, project());
        assert_eq!(decoded.total_hours_volunteered.to_bits(), (0.1f64 + 0.2).to_bits());
    }

    #[test]
    fn test_malformed_bytes_rejected() {
        let key = MetricsCacheKey::global();
        let err = decode_metrics::<GlobalImpactMetrics>(&key, b"{not json").unwrap_err();
        assert!(matches!(err, CacheError::Deserialization { ref key, .. } if key == "global:metrics"));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let key = MetricsCacheKey::global();
        let org = OrganizationImpactMetrics::zeroed("org-1", "Roots");
        let bytes = serde_json::to_vec(&org).unwrap();
        assert!(decode_metrics::<GlobalImpactMetrics>(&key, &bytes).is_err());
    }

    #[test]
    fn test_invalid_value_rejected() {
        let key = MetricsCacheKey::global();
        let json = br#"{"totalProjects":1,"totalVolunteers":1,"totalOrganizations":1,
            "totalHoursVolunteered":-5.0,"totalCertificatesIssued":0,
            "environmentalImpact":{"co2Saved":0,"treesPlanted":0,"wasteReduced":0},
            "socialImpact":{"livesImpacted":0,"communitiesServed":0,"educationHours":0}}"#;
        let err = decode_metrics::<GlobalImpactMetrics>(&key, json).unwrap_err();
        assert!(err.to_string().contains("totalHoursVolunteered"));
    }

    #[test]
    fn test_entry_under_wrong_key_rejected() {
        let key = MetricsCacheKey::project("p-2");
        let bytes = encode_metrics(&MetricsCacheKey::project("p-1"), &project()).unwrap();
        let err = decode_metrics::<ProjectImpactMetrics>(&key, &bytes).unwrap_err();
        assert!(err.to_string().contains("project:p-1:metrics"));
    }
}
