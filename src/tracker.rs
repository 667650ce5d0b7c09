//! Issue-tracker data model and the pure parts of the discovery scan:
//! query construction, candidate selection, and pagination termination.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::TrackerConfig;

/// A single static-analysis finding as reported by the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub key: String,
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub line: Option<u64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default, rename = "type")]
    pub finding_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub effort: Option<String>,
}

impl Finding {
    /// Unowned findings are not auto-fixed; a finding without a non-blank
    /// author is never a candidate.
    pub fn has_owner(&self) -> bool {
        self.author
            .as_deref()
            .map(|a| !a.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Paging metadata as reported by the tracker. Servers are inconsistent about
/// numeric vs. string values and camelCase vs. snake_case keys, so this is
/// parsed leniently from the raw response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paging {
    pub total: Option<u64>,
    pub page_index: Option<u64>,
    pub page_size: Option<u64>,
}

fn lenient_u64(value: Option<&Value>) -> Option<u64> {
    match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn parse_paging(response: &Value) -> Paging {
    let paging = match response.get("paging") {
        Some(p) if p.is_object() => p,
        _ => return Paging::default(),
    };
    Paging {
        total: lenient_u64(paging.get("total")),
        page_index: lenient_u64(paging.get("pageIndex").or_else(|| paging.get("page_index"))),
        page_size: lenient_u64(paging.get("pageSize").or_else(|| paging.get("page_size"))),
    }
}

/// Extract the findings array from a raw tracker response. Entries that do
/// not deserialize (e.g. missing `key`) are skipped.
pub fn parse_findings(response: &Value) -> Vec<Finding> {
    response
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Fixed query filter; the finder overrides `page` on each fetch.
pub fn query_params(config: &TrackerConfig, page: u64) -> Value {
    json!({
        "project_key": config.project_key,
        "branch": config.branch,
        "severities": config.severities,
        "types": config.types,
        "s": "CREATION_DATE",
        "asc": false,
        "status": "OPEN",
        "page": page.to_string(),
        "page_size": config.page_size.to_string(),
    })
}

/// First finding in page order that is open, owned, and not already handled.
pub fn select_candidate<'a>(
    findings: &'a [Finding],
    processed: &HashSet<String>,
) -> Option<&'a Finding> {
    findings
        .iter()
        .find(|f| !processed.contains(&f.key) && f.status == "OPEN" && f.has_owner())
}

/// Whether the just-fetched page was the last one worth scanning.
///
/// With well-formed paging metadata the scan stops once the reported page
/// index reaches `ceil(total / page_size)`. Without metadata it stops after
/// the first page shorter than the requested page size.
pub fn is_last_page(paging: &Paging, page: u64, fetched: usize, requested_page_size: u32) -> bool {
    // An empty page always ends the scan, whatever the metadata claims.
    if fetched == 0 {
        return true;
    }

    let effective_size = paging.page_size.unwrap_or(requested_page_size as u64);
    if effective_size == 0 {
        return true;
    }

    if let Some(total) = paging.total {
        let max_page = total.div_ceil(effective_size);
        let page_index = paging.page_index.unwrap_or(page);
        return page_index >= max_page;
    }

    (fetched as u64) < effective_size
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(key: &str, status: &str, author: Option<&str>) -> Finding {
        Finding {
            key: key.to_string(),
            rule: "java:S1172".to_string(),
            component: "proj:src/Main.java".to_string(),
            line: Some(42),
            message: "Remove this unused parameter".to_string(),
            severity: "INFO".to_string(),
            finding_type: "CODE_SMELL".to_string(),
            status: status.to_string(),
            author: author.map(str::to_string),
            effort: Some("5min".to_string()),
        }
    }

    #[test]
    fn test_select_skips_processed_keys() {
        let findings = vec![
            finding("AB-1", "OPEN", Some("dev@example.com")),
            finding("AB-2", "OPEN", Some("dev@example.com")),
        ];
        let processed: HashSet<String> = ["AB-1".to_string()].into();
        let picked = select_candidate(&findings, &processed).unwrap();
        assert_eq!(picked.key, "AB-2");
    }

    #[test]
    fn test_select_skips_unowned_findings() {
        let findings = vec![
            finding("AB-1", "OPEN", None),
            finding("AB-2", "OPEN", Some("  ")),
            finding("AB-3", "OPEN", Some("dev@example.com")),
        ];
        let picked = select_candidate(&findings, &HashSet::new()).unwrap();
        assert_eq!(picked.key, "AB-3");
    }

    #[test]
    fn test_select_skips_non_open_status() {
        let findings = vec![
            finding("AB-1", "RESOLVED", Some("dev@example.com")),
            finding("AB-2", "OPEN", Some("dev@example.com")),
        ];
        let picked = select_candidate(&findings, &HashSet::new()).unwrap();
        assert_eq!(picked.key, "AB-2");
    }

    #[test]
    fn test_select_none_when_exhausted() {
        let findings = vec![finding("AB-1", "OPEN", None)];
        assert!(select_candidate(&findings, &HashSet::new()).is_none());
    }

    #[test]
    fn test_last_page_from_metadata() {
        let paging = Paging {
            total: Some(120),
            page_index: Some(3),
            page_size: Some(50),
        };
        // ceil(120 / 50) = 3, so page index 3 is the last
        assert!(is_last_page(&paging, 3, 20, 50));

        let paging = Paging {
            total: Some(120),
            page_index: Some(2),
            page_size: Some(50),
        };
        assert!(!is_last_page(&paging, 2, 50, 50));
    }

    #[test]
    fn test_empty_page_always_terminates() {
        let paging = Paging {
            total: Some(500),
            page_index: Some(1),
            page_size: Some(50),
        };
        assert!(is_last_page(&paging, 1, 0, 50));
    }

    #[test]
    fn test_last_page_heuristic_without_metadata() {
        // A full page with no metadata keeps the scan going
        assert!(!is_last_page(&Paging::default(), 1, 50, 50));
        // A short page is treated as the final one
        assert!(is_last_page(&Paging::default(), 1, 17, 50));
    }

    #[test]
    fn test_parse_paging_tolerates_string_values() {
        let response = serde_json::json!({
            "paging": { "total": "120", "pageIndex": 2, "pageSize": "50" }
        });
        let paging = parse_paging(&response);
        assert_eq!(paging.total, Some(120));
        assert_eq!(paging.page_index, Some(2));
        assert_eq!(paging.page_size, Some(50));
    }

    #[test]
    fn test_parse_findings_skips_malformed_entries() {
        let response = serde_json::json!({
            "issues": [
                { "key": "AB-1", "status": "OPEN", "author": "dev@example.com" },
                { "status": "OPEN" }
            ]
        });
        let findings = parse_findings(&response);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].key, "AB-1");
    }
}
