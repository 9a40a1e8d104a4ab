//! Violation detail normalization
//!
//! Pure transforms from a raw violation detail (plus the URL it was fetched
//! from) into the canonical webhook events. One detail fans out into one
//! event per matched policy; a detail without matched policies produces
//! nothing.
//!
//! The detail URL carries a composite component id in its query string
//! (`comp_id=<value>&issue_id=...`) that names the impacted package; the
//! value uses URL-encoded separators which are decoded and split here
//! rather than percent-decoded, because `%3A` and `%2F` both act as the
//! same field separator.

use chrono::NaiveDateTime;
use xvc_common::{Result, XvcError};

use crate::models::{
    ImpactedArtifact, InfectedFile, Issue, ViolationDetail, ViolationEvent,
    WEBHOOK_TIMESTAMP_FORMAT, XRAY_TIMESTAMP_FORMAT,
};

/// Provider used when the detail omits one.
const UNKNOWN_PROVIDER: &str = "Unknown";

/// Composite component id parsed from a detail URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentId {
    pub pkg_type: String,
    pub display_name: String,
}

/// Build the canonical events for one violation detail.
///
/// Returns an empty list when the detail has no matched policies. Errors
/// (bad timestamps, malformed infected-component URIs, a detail with
/// neither description nor issue id) propagate to the caller, which treats
/// them as a per-item failure.
pub fn transform_violation(
    detail: &ViolationDetail,
    detail_url: &str,
) -> Result<Vec<ViolationEvent>> {
    let Some(policies) = &detail.matched_policies else {
        return Ok(Vec::new());
    };

    let issue = build_issue(detail, detail_url)?;
    let created = to_webhook_timestamp(&detail.created)?;

    Ok(policies
        .iter()
        .map(|matched| ViolationEvent {
            created: created.clone(),
            watch_name: detail.watch_name.clone(),
            policy_name: matched.policy.clone(),
            top_severity: detail.severity.clone(),
            issues: vec![issue.clone()],
        })
        .collect())
}

/// Build the issue block shared by all of a violation's events.
fn build_issue(detail: &ViolationDetail, detail_url: &str) -> Result<Issue> {
    let description = detail
        .description
        .clone()
        .or_else(|| detail.issue_id.clone())
        .ok_or_else(|| {
            XvcError::Parse("violation detail has neither description nor issue_id".into())
        })?;

    // first property carrying a CVE wins
    let cve = detail
        .properties
        .as_ref()
        .and_then(|props| props.iter().find_map(|p| p.cve.clone()));

    Ok(Issue {
        severity: detail.severity.clone(),
        issue_type: detail.violation_type.clone(),
        provider: detail
            .provider
            .clone()
            .unwrap_or_else(|| UNKNOWN_PROVIDER.to_string()),
        created: to_webhook_timestamp(&detail.created)?,
        description,
        summary: detail.summary.clone(),
        cve,
        impacted_artifacts: build_impacted_artifacts(detail, detail_url)?,
    })
}

/// Build the impacted-artifact list, or `None` when the detail has no
/// artifact paths or the detail URL carries no parseable component id.
fn build_impacted_artifacts(
    detail: &ViolationDetail,
    detail_url: &str,
) -> Result<Option<Vec<ImpactedArtifact>>> {
    let Some(paths) = &detail.impacted_artifacts else {
        return Ok(None);
    };
    let Some(component) = parse_component_id(detail_url) else {
        return Ok(None);
    };

    let infected_files = detail
        .infected_components
        .as_ref()
        .map(|uris| {
            uris.iter()
                .map(|uri| parse_infected_component(uri))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    let artifacts: Vec<ImpactedArtifact> = paths
        .iter()
        .map(|path| ImpactedArtifact {
            display_name: component.display_name.clone(),
            path: path.clone(),
            pkg_type: component.pkg_type.clone(),
            name: component.display_name.clone(),
            infected_files: infected_files.clone(),
            infected_versions: detail.infected_versions.clone(),
            fix_versions: detail.fix_versions.clone(),
        })
        .collect();

    Ok(if artifacts.is_empty() {
        None
    } else {
        Some(artifacts)
    })
}

/// Reformat an upstream timestamp into the webhook format.
///
/// The input has whole-second resolution; the output carries a fixed `.000`
/// milliseconds field.
pub fn to_webhook_timestamp(created: &str) -> Result<String> {
    let parsed = NaiveDateTime::parse_from_str(created, XRAY_TIMESTAMP_FORMAT)
        .map_err(|e| XvcError::Parse(format!("bad created timestamp {created:?}: {e}")))?;
    Ok(parsed.format(WEBHOOK_TIMESTAMP_FORMAT).to_string())
}

/// Extract the composite component id from a detail URL.
///
/// The id is the raw query text between `comp_id=` and `&issue_id=`.
/// `%3A` and `%2F` are both field separators; runs of separators collapse
/// to one. The first field is the package type. The display name is the
/// second field when there are exactly two, otherwise the last two fields
/// joined by `:`; a lone field names itself.
pub fn parse_component_id(detail_url: &str) -> Option<ComponentId> {
    let start = detail_url.find("comp_id=")? + "comp_id=".len();
    let end = detail_url[start..].find("&issue_id=")?;
    let raw = &detail_url[start..start + end];

    let decoded = raw.replace("%3A", ",").replace("%2F", ",");
    let collapsed = collapse_separators(&decoded);
    let fields: Vec<&str> = collapsed.split(',').collect();

    let (pkg_type, display_name) = match fields.as_slice() {
        [] => return None,
        [only] => (only.to_string(), only.to_string()),
        [pkg_type, name] => (pkg_type.to_string(), name.to_string()),
        [pkg_type, .., group, version] => (pkg_type.to_string(), format!("{group}:{version}")),
    };

    Some(ComponentId {
        pkg_type,
        display_name,
    })
}

fn collapse_separators(value: &str) -> String {
    let mut collapsed = String::with_capacity(value.len());
    let mut previous_was_separator = false;
    for ch in value.chars() {
        if ch == ',' {
            if !previous_was_separator {
                collapsed.push(ch);
            }
            previous_was_separator = true;
        } else {
            collapsed.push(ch);
            previous_was_separator = false;
        }
    }
    collapsed
}

/// Parse one infected-component URI of the shape `scheme://identifier`.
///
/// The scheme precedes the first `://`, the identifier follows the last
/// one. A URI without `://` is a parse error for the whole detail.
pub fn parse_infected_component(uri: &str) -> Result<InfectedFile> {
    let scheme_end = uri
        .find("://")
        .ok_or_else(|| XvcError::Parse(format!("infected component {uri:?} has no scheme")))?;
    let name_start = uri.rfind("://").unwrap_or(scheme_end) + "://".len();

    Ok(InfectedFile {
        name: uri[name_start..].to_string(),
        path: uri.to_string(),
        pkg_type: uri[..scheme_end].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueProperty, MatchedPolicy};

    fn detail() -> ViolationDetail {
        serde_json::from_value(serde_json::json!({
            "severity": "High",
            "type": "security",
            "provider": "JFrog",
            "created": "2024-01-15T10:30:00Z",
            "watch_name": "prod-watch",
            "description": "Prototype pollution",
            "issue_id": "XRAY-12345",
            "summary": "lodash before 4.17.21",
            "matched_policies": [{"policy": "sec-policy"}]
        }))
        .unwrap()
    }

    const DETAIL_URL: &str =
        "http://xray.local:8000/api/v1/violation?comp_id=npm%3Alodash&issue_id=XRAY-12345";

    #[test]
    fn test_webhook_timestamp_carries_zero_millis() {
        assert_eq!(
            to_webhook_timestamp("2024-01-15T10:30:00Z").unwrap(),
            "2024-01-15T10:30:00.000Z"
        );
        assert!(to_webhook_timestamp("2024-01-15 10:30").is_err());
    }

    #[test]
    fn test_policy_fanout() {
        let mut d = detail();
        d.matched_policies = Some(vec![
            MatchedPolicy {
                policy: "P1".into(),
                watch: None,
            },
            MatchedPolicy {
                policy: "P2".into(),
                watch: None,
            },
        ]);

        let events = transform_violation(&d, DETAIL_URL).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].policy_name, "P1");
        assert_eq!(events[1].policy_name, "P2");
        assert_eq!(events[0].issues, events[1].issues);
        assert_eq!(events[0].issues.len(), 1);
        assert_eq!(events[0].created, "2024-01-15T10:30:00.000Z");
        assert_eq!(events[0].top_severity, "High");
        assert_eq!(events[0].watch_name, "prod-watch");
    }

    #[test]
    fn test_no_matched_policies_yields_nothing() {
        let mut d = detail();
        d.matched_policies = None;
        assert!(transform_violation(&d, DETAIL_URL).unwrap().is_empty());
    }

    #[test]
    fn test_first_cve_wins() {
        let mut d = detail();
        d.properties = Some(vec![
            IssueProperty { cve: None },
            IssueProperty {
                cve: Some("CVE-1".into()),
            },
            IssueProperty {
                cve: Some("CVE-2".into()),
            },
        ]);
        let events = transform_violation(&d, DETAIL_URL).unwrap();
        assert_eq!(events[0].issues[0].cve.as_deref(), Some("CVE-1"));
    }

    #[test]
    fn test_provider_defaults_to_unknown() {
        let mut d = detail();
        d.provider = None;
        let events = transform_violation(&d, DETAIL_URL).unwrap();
        assert_eq!(events[0].issues[0].provider, "Unknown");
    }

    #[test]
    fn test_description_falls_back_to_issue_id() {
        let mut d = detail();
        d.description = None;
        let events = transform_violation(&d, DETAIL_URL).unwrap();
        assert_eq!(events[0].issues[0].description, "XRAY-12345");
    }

    #[test]
    fn test_missing_description_and_issue_id_is_an_error() {
        let mut d = detail();
        d.description = None;
        d.issue_id = None;
        assert!(transform_violation(&d, DETAIL_URL).is_err());
    }

    #[test]
    fn test_component_id_two_fields() {
        let comp = parse_component_id(DETAIL_URL).unwrap();
        assert_eq!(comp.pkg_type, "npm");
        assert_eq!(comp.display_name, "lodash");
    }

    #[test]
    fn test_component_id_four_fields() {
        let url = "http://x/v?comp_id=maven%3Aorg.foo%3Abar%3A1.0&issue_id=1";
        let comp = parse_component_id(url).unwrap();
        assert_eq!(comp.pkg_type, "maven");
        assert_eq!(comp.display_name, "bar:1.0");
    }

    #[test]
    fn test_component_id_mixed_and_repeated_separators() {
        let url = "http://x/v?comp_id=docker%3A%2F%2Flib%2Fubuntu%3A22.04&issue_id=1";
        let comp = parse_component_id(url).unwrap();
        assert_eq!(comp.pkg_type, "docker");
        assert_eq!(comp.display_name, "ubuntu:22.04");
    }

    #[test]
    fn test_component_id_single_field() {
        let url = "http://x/v?comp_id=generic&issue_id=1";
        let comp = parse_component_id(url).unwrap();
        assert_eq!(comp.pkg_type, "generic");
        assert_eq!(comp.display_name, "generic");
    }

    #[test]
    fn test_component_id_requires_both_markers() {
        assert!(parse_component_id("http://x/v?comp_id=npm%3Alodash").is_none());
        assert!(parse_component_id("http://x/v?issue_id=1").is_none());
    }

    #[test]
    fn test_impacted_artifacts() {
        let mut d = detail();
        d.impacted_artifacts = Some(vec!["default/repo/lodash".into(), "other/repo".into()]);
        d.infected_components = Some(vec!["npm://lodash:4.17.20".into()]);
        d.infected_versions = Some(vec!["4.17.20".into()]);
        d.fix_versions = Some(vec!["4.17.21".into()]);

        let events = transform_violation(&d, DETAIL_URL).unwrap();
        let artifacts = events[0].issues[0].impacted_artifacts.as_ref().unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].display_name, "lodash");
        assert_eq!(artifacts[0].name, "lodash");
        assert_eq!(artifacts[0].pkg_type, "npm");
        assert_eq!(artifacts[0].path, "default/repo/lodash");
        assert_eq!(artifacts[1].path, "other/repo");

        let infected = artifacts[0].infected_files.as_ref().unwrap();
        assert_eq!(infected[0].pkg_type, "npm");
        assert_eq!(infected[0].name, "lodash:4.17.20");
        assert_eq!(infected[0].path, "npm://lodash:4.17.20");
        assert_eq!(artifacts[0].infected_versions.as_ref().unwrap()[0], "4.17.20");
        assert_eq!(artifacts[0].fix_versions.as_ref().unwrap()[0], "4.17.21");
    }

    #[test]
    fn test_artifacts_skipped_without_component_id() {
        let mut d = detail();
        d.impacted_artifacts = Some(vec!["default/repo/lodash".into()]);
        let url = "http://xray.local:8000/api/v1/violation?issue_id=XRAY-12345";
        let events = transform_violation(&d, url).unwrap();
        assert!(events[0].issues[0].impacted_artifacts.is_none());
    }

    #[test]
    fn test_malformed_infected_component_fails_the_item() {
        let mut d = detail();
        d.impacted_artifacts = Some(vec!["default/repo/lodash".into()]);
        d.infected_components = Some(vec!["no-scheme-here".into()]);
        assert!(transform_violation(&d, DETAIL_URL).is_err());
    }

    #[test]
    fn test_infected_component_with_nested_scheme() {
        let infected = parse_infected_component("npm://scope://pkg").unwrap();
        assert_eq!(infected.pkg_type, "npm");
        assert_eq!(infected.name, "pkg");
        assert_eq!(infected.path, "npm://scope://pkg");
    }

    #[test]
    fn test_deterministic_normalization() {
        let d = detail();
        let first = transform_violation(&d, DETAIL_URL).unwrap();
        let second = transform_violation(&d, DETAIL_URL).unwrap();
        assert_eq!(first, second);
    }
}
