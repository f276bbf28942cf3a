use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::state::{ScanPhase, ScanState, ScanStatus};
use crate::core::Severity;
use crate::error::{ErrorKind, ScanError};
use crate::models::{ApiDescriptor, JsResource, MicroserviceInfo, SecurityIssue};
use crate::SinkRef;

/// A resource skipped during the scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceFailure {
    pub url: String,
    pub phase: ScanPhase,
    pub kind: ErrorKind,
    pub message: String,
}

/// Why a scan ended as `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub kind: ErrorKind,
    pub phase: Option<ScanPhase>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatistics {
    pub total_js_files: usize,
    pub total_apis: usize,
    pub total_microservices: usize,
    pub total_issues: usize,
    pub issues_by_severity: BTreeMap<Severity, usize>,
    pub failed_resources: usize,
    pub duration_ms: u64,
}

/// Everything one scan produced. Partially filled when the scan failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub target_url: String,
    pub status: ScanStatus,
    pub phase: Option<ScanPhase>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub js_resources: Vec<JsResource>,
    pub apis: Vec<ApiDescriptor>,
    pub microservices: Vec<MicroserviceInfo>,
    pub security_issues: Vec<SecurityIssue>,
    pub statistics: ScanStatistics,
    pub failures: Vec<ResourceFailure>,
    pub error: Option<ScanFailure>,
    pub error_message: Option<String>,
}

impl ScanResult {
    pub fn new(target_url: &str) -> Self {
        Self {
            target_url: target_url.to_string(),
            status: ScanStatus::Pending,
            phase: None,
            start_time: Utc::now(),
            end_time: None,
            js_resources: Vec::new(),
            apis: Vec::new(),
            microservices: Vec::new(),
            security_issues: Vec::new(),
            statistics: ScanStatistics::default(),
            failures: Vec::new(),
            error: None,
            error_message: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ScanStatus::Completed
    }

    pub fn record_failure(&mut self, url: &str, phase: ScanPhase, err: &ScanError) {
        self.failures.push(ResourceFailure {
            url: url.to_string(),
            phase,
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    pub fn sync_state(&mut self, state: &ScanState) {
        self.status = state.status();
        self.phase = state.phase();
    }

    pub fn set_error(&mut self, err: &ScanError) {
        let message = err.to_string();
        self.error = Some(ScanFailure {
            kind: err.kind(),
            phase: self.phase,
            message: message.clone(),
        });
        self.error_message = Some(message);
    }

    /// Stamps the end time and recomputes the statistics block.
    pub fn finalize(&mut self) {
        let end = Utc::now();
        self.end_time = Some(end);

        let mut by_severity = BTreeMap::new();
        for issue in &self.security_issues {
            *by_severity.entry(issue.severity).or_insert(0) += 1;
        }
        self.statistics = ScanStatistics {
            total_js_files: self.js_resources.len(),
            total_apis: self.apis.len(),
            total_microservices: self.microservices.len(),
            total_issues: self.security_issues.len(),
            issues_by_severity: by_severity,
            failed_resources: self.failures.len(),
            duration_ms: (end - self.start_time).num_milliseconds().max(0) as u64,
        };
    }
}

/// Scan-wide API deduplication by `full_url`, first discovery wins.
///
/// The collector only decides; accepted descriptors are stored by the caller
/// so they survive if the scan is cut short.
pub struct ApiCollector {
    seen: HashSet<String>,
    limit: usize,
}

impl ApiCollector {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            seen: HashSet::new(),
            limit,
        }
    }

    /// Returns whether `api` should be kept.
    pub fn admit(&mut self, api: &ApiDescriptor) -> bool {
        if self.is_full() || self.seen.contains(&api.full_url) {
            return false;
        }
        self.seen.insert(api.full_url.clone());
        true
    }

    pub fn is_full(&self) -> bool {
        self.seen.len() >= self.limit
    }
}

/// Reports and persists finished results.
pub struct ResultAggregator;

impl ResultAggregator {
    pub fn report_summary(result: &ScanResult, sink: &SinkRef) {
        let stats = &result.statistics;
        match result.status {
            ScanStatus::Completed => sink.on_log(
                "success",
                &format!("[+] Scan of {} completed in {}ms", result.target_url, stats.duration_ms),
            ),
            _ => sink.on_log(
                "error",
                &format!(
                    "[!] Scan of {} {}: {}",
                    result.target_url,
                    result.status,
                    result.error_message.as_deref().unwrap_or("unknown error")
                ),
            ),
        }

        sink.on_log(
            "info",
            &format!(
                "    JS files: {} | APIs: {} | Services: {} | Issues: {} | Skipped: {}",
                stats.total_js_files,
                stats.total_apis,
                stats.total_microservices,
                stats.total_issues,
                stats.failed_resources
            ),
        );

        if !stats.issues_by_severity.is_empty() {
            let breakdown: Vec<String> = stats
                .issues_by_severity
                .iter()
                .map(|(sev, n)| format!("{}: {}", sev, n))
                .collect();
            sink.on_log("warn", &format!("    Severity: {}", breakdown.join(", ")));
        }

        for service in &result.microservices {
            let marker = if service.has_vulnerabilities { " (!)" } else { "" };
            sink.on_log(
                "info",
                &format!(
                    "    - {} [{} endpoint(s)]{}",
                    service.service_full_path, service.total_endpoints, marker
                ),
            );
        }
    }

    /// Writes one result, or a list of them, as pretty JSON.
    pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(value).context("serializing scan result")?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::IssueType;
    use crate::error::FetchError;

    fn api(full_url: &str) -> ApiDescriptor {
        ApiDescriptor {
            base_url: "https://a.com".to_string(),
            base_api_path: String::new(),
            service_path: Some("/x".to_string()),
            api_path: "/x".to_string(),
            full_url: full_url.to_string(),
            http_method: "GET".to_string(),
            discovery_method: "regex".to_string(),
            source_js: "https://a.com/first.js".to_string(),
        }
    }

    #[test]
    fn test_collector_first_wins_and_caps() {
        let mut c = ApiCollector::with_limit(2);
        let mut kept = Vec::new();
        let mut dup = api("https://a.com/x");
        dup.source_js = "https://a.com/second.js".to_string();
        for candidate in [api("https://a.com/x"), dup, api("https://a.com/y"), api("https://a.com/z")] {
            if c.admit(&candidate) {
                kept.push(candidate);
            }
        }
        assert!(c.is_full());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].source_js, "https://a.com/first.js");
        assert_eq!(kept[1].full_url, "https://a.com/y");
    }

    #[test]
    fn test_finalize_computes_statistics() {
        let mut result = ScanResult::new("https://a.com");
        result.apis.push(api("https://a.com/x"));
        for severity in [Severity::High, Severity::Medium, Severity::Medium] {
            result.security_issues.push(SecurityIssue {
                title: format!("{}", severity),
                description: String::new(),
                issue_type: IssueType::Other,
                severity,
                target_url: "https://a.com".to_string(),
                target_api: None,
                evidence: String::new(),
                remediation: String::new(),
            });
        }
        result.record_failure(
            "https://a.com/slow.js",
            ScanPhase::FetchJs,
            &ScanError::Fetch(FetchError::Timeout("https://a.com/slow.js".to_string())),
        );
        result.finalize();

        let stats = &result.statistics;
        assert_eq!(stats.total_apis, 1);
        assert_eq!(stats.total_issues, 3);
        assert_eq!(stats.issues_by_severity.get(&Severity::Medium), Some(&2));
        assert_eq!(stats.failed_resources, 1);
        assert_eq!(result.failures[0].kind, ErrorKind::Fetch);
        assert!(result.end_time.is_some());
    }

    #[test]
    fn test_result_serializes_snake_case() {
        let mut state = ScanState::new();
        state.enter(ScanPhase::FetchSeed).unwrap();
        state.fail().unwrap();

        let mut result = ScanResult::new("https://a.com");
        result.sync_state(&state);
        result.set_error(&ScanError::Timeout(300));
        result.finalize();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["phase"], "fetch_seed");
        assert_eq!(json["error"]["kind"], "timeout");
        assert_eq!(json["error"]["phase"], "fetch_seed");
        assert!(json["error_message"].as_str().unwrap().contains("300"));
        assert!(json["statistics"]["issues_by_severity"].is_object());
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut result = ScanResult::new("https://a.com");
        result.finalize();
        ResultAggregator::write_json(&result, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"target_url\": \"https://a.com\""));
    }
}
