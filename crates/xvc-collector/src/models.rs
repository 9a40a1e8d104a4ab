//! Upstream payload and canonical event models
//!
//! Upstream JSON is loosely structured; every field the collector does not
//! strictly require is an `Option` with its default documented at the point
//! of use in the normalizer.

use serde::{Deserialize, Serialize};

/// Timestamp format used by the Xray API (`created`, `created_from`).
pub const XRAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Timestamp format of the outgoing webhook events. Carries a milliseconds
/// field the upstream format does not have; the fraction is always zero.
pub const WEBHOOK_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

// ============================================================================
// Upstream (list endpoint)
// ============================================================================

/// One page of the violations list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ViolationPage {
    #[serde(default)]
    pub violations: Vec<ViolationSummary>,
    pub total_violations: Option<u64>,
}

impl ViolationPage {
    /// Whether the server reports more records beyond this page.
    pub fn has_more(&self) -> bool {
        match self.total_violations {
            Some(total) => total.saturating_sub(self.violations.len() as u64) > 0,
            None => false,
        }
    }
}

/// A violation as listed by the paginated endpoint. Only the fields the
/// collector consumes are modeled; the detail endpoint carries the rest.
#[derive(Debug, Clone, Deserialize)]
pub struct ViolationSummary {
    pub created: String,
    pub violation_details_url: Option<String>,
}

// ============================================================================
// Upstream (detail endpoint)
// ============================================================================

/// Full violation record returned by the per-item detail endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ViolationDetail {
    pub severity: String,
    #[serde(rename = "type")]
    pub violation_type: String,
    pub provider: Option<String>,
    pub created: String,
    pub watch_name: String,
    pub description: Option<String>,
    pub issue_id: Option<String>,
    pub summary: String,
    pub matched_policies: Option<Vec<MatchedPolicy>>,
    pub properties: Option<Vec<IssueProperty>>,
    pub impacted_artifacts: Option<Vec<String>>,
    pub infected_components: Option<Vec<String>>,
    pub infected_versions: Option<Vec<String>>,
    pub fix_versions: Option<Vec<String>>,
}

/// One policy matched by a violation.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchedPolicy {
    pub policy: String,
    pub watch: Option<String>,
}

/// Entry of the detail's `properties` list. Only `cve` is meaningful here.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueProperty {
    #[serde(default)]
    pub cve: Option<String>,
}

// ============================================================================
// Canonical output (webhook shape)
// ============================================================================

/// One outgoing event: a (violation, matched policy) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViolationEvent {
    pub created: String,
    pub watch_name: String,
    pub policy_name: String,
    pub top_severity: String,
    /// Always a single-element list, matching the webhook payload shape.
    pub issues: Vec<Issue>,
}

/// Issue block of an outgoing event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub severity: String,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub provider: String,
    pub created: String,
    pub description: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impacted_artifacts: Option<Vec<ImpactedArtifact>>,
}

/// Artifact impacted by a violation, derived from the composite component
/// id embedded in the detail URL plus the artifact path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImpactedArtifact {
    pub display_name: String,
    pub path: String,
    pub pkg_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infected_files: Option<Vec<InfectedFile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infected_versions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_versions: Option<Vec<String>>,
}

/// One infected component, parsed from a `scheme://identifier` URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfectedFile {
    pub name: String,
    pub path: String,
    pub pkg_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_more() {
        let page: ViolationPage = serde_json::from_value(json!({
            "violations": [{"created": "2024-01-01T00:00:00Z"}],
            "total_violations": 3
        }))
        .unwrap();
        assert!(page.has_more());

        let page: ViolationPage = serde_json::from_value(json!({
            "violations": [{"created": "2024-01-01T00:00:00Z"}],
            "total_violations": 1
        }))
        .unwrap();
        assert!(!page.has_more());
    }

    #[test]
    fn test_has_more_without_total() {
        let page: ViolationPage = serde_json::from_value(json!({
            "violations": [{"created": "2024-01-01T00:00:00Z"}]
        }))
        .unwrap();
        assert!(!page.has_more());
    }

    #[test]
    fn test_property_without_cve_deserializes() {
        let prop: IssueProperty = serde_json::from_value(json!({"x": 1})).unwrap();
        assert!(prop.cve.is_none());
    }

    #[test]
    fn test_event_serialization_omits_absent_fields() {
        let issue = Issue {
            severity: "High".into(),
            issue_type: "security".into(),
            provider: "JFrog".into(),
            created: "2024-01-01T00:00:00.000Z".into(),
            description: "desc".into(),
            summary: "sum".into(),
            cve: None,
            impacted_artifacts: None,
        };
        let value = serde_json::to_value(&issue).unwrap();
        assert!(value.get("cve").is_none());
        assert!(value.get("impacted_artifacts").is_none());
        assert_eq!(value["type"], "security");
    }

    #[test]
    fn test_detail_type_field_rename() {
        let detail: ViolationDetail = serde_json::from_value(json!({
            "severity": "High",
            "type": "security",
            "created": "2024-01-01T00:00:00Z",
            "watch_name": "prod-watch",
            "summary": "CVE in lodash"
        }))
        .unwrap();
        assert_eq!(detail.violation_type, "security");
        assert!(detail.matched_policies.is_none());
    }
}
