//! Heuristic security checks over the discovered JS and API surface.
//!
//! Findings are candidates only. Each check runs on its own; a failing check
//! is logged and the rest still run.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use log::{debug, warn};
use regex::Regex;
use semver::Version;

use crate::core::{IssueType, Severity};
use crate::error::ScanError;
use crate::http::{FetchedResponse, Fetcher};
use crate::models::{ApiDescriptor, JsResource, SecurityIssue};

const SENSITIVE_KEYWORDS: &[&str] = &["accesskey", "secretkey", "password", "token", "apikey"];

const SNIPPET_RADIUS: usize = 40;
const EXCERPT_LEN: usize = 200;

/// Body fragments that mean the endpoint did ask for credentials.
const AUTH_ERROR_MARKERS: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "not logged in",
    "login required",
    "please login",
    "please log in",
    "access denied",
    "forbidden",
    "invalid token",
    "token expired",
    "\"code\":401",
    "\"code\":403",
    "\"status\":401",
    "\"status\":403",
];

/// Inputs shared by all checks.
pub struct CheckContext<'a> {
    pub resources: &'a [JsResource],
    pub apis: &'a [ApiDescriptor],
}

#[async_trait]
pub trait IssueCheck: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<SecurityIssue>, ScanError>;
}

/// Runs a set of checks in order and concatenates their findings.
pub struct IssueDetector {
    checks: Vec<Box<dyn IssueCheck>>,
}

impl IssueDetector {
    pub fn new(checks: Vec<Box<dyn IssueCheck>>) -> Self {
        Self { checks }
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub async fn detect(&self, ctx: &CheckContext<'_>) -> Vec<SecurityIssue> {
        let mut seen = HashSet::new();
        let mut issues = Vec::new();
        for check in &self.checks {
            match check.run(ctx).await {
                Ok(found) => {
                    debug!("check '{}' produced {} issue(s)", check.name(), found.len());
                    issues.extend(found.into_iter().filter(|i| seen.insert(i.clone())));
                }
                Err(e) => warn!("check '{}' failed: {}", check.name(), e),
            }
        }
        issues
    }
}

/// Window of `text` around byte range `start..end`, widened to char boundaries.
fn snippet(text: &str, start: usize, end: usize, radius: usize) -> String {
    let mut from = start.saturating_sub(radius);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + radius).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }

    let mut out = String::new();
    if from > 0 {
        out.push_str("...");
    }
    out.push_str(&text[from..to]);
    if to < text.len() {
        out.push_str("...");
    }
    out.replace(['\n', '\r', '\t'], " ")
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Flags credential-like keywords shipped in client bundles.
pub struct SensitiveDataCheck;

#[async_trait]
impl IssueCheck for SensitiveDataCheck {
    fn name(&self) -> &'static str {
        "sensitive_data"
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<SecurityIssue>, ScanError> {
        let mut issues = Vec::new();
        for resource in ctx.resources {
            // ASCII lowering keeps byte offsets aligned with the original
            let lower = resource.content.to_ascii_lowercase();
            for keyword in SENSITIVE_KEYWORDS {
                let Some(pos) = lower.find(keyword) else {
                    continue;
                };
                issues.push(SecurityIssue {
                    title: format!("Sensitive keyword '{}' in JavaScript", keyword),
                    description: format!(
                        "{} contains the keyword '{}', which may indicate a hard-coded credential.",
                        resource.url, keyword
                    ),
                    issue_type: IssueType::SensitiveDataLeak,
                    severity: Severity::Medium,
                    target_url: resource.url.clone(),
                    target_api: None,
                    evidence: snippet(&resource.content, pos, pos + keyword.len(), SNIPPET_RADIUS),
                    remediation: "Remove secrets from client-side code and rotate any exposed credentials."
                        .to_string(),
                });
            }
        }
        Ok(issues)
    }
}

/// Calls candidate APIs anonymously and flags those that hand back data.
pub struct UnauthorizedAccessCheck {
    fetcher: Arc<dyn Fetcher>,
    max_probes: usize,
    concurrency: usize,
}

impl UnauthorizedAccessCheck {
    pub fn new(fetcher: Arc<dyn Fetcher>, max_probes: usize, concurrency: usize) -> Self {
        Self {
            fetcher,
            max_probes,
            concurrency: concurrency.max(1),
        }
    }
}

/// 2xx, JSON-shaped, and no sign of an auth challenge.
pub fn looks_unprotected(response: &FetchedResponse) -> bool {
    if !response.is_success() {
        return false;
    }
    let body = response.body.trim_start();
    let json_like = response.is_json() || body.starts_with('{') || body.starts_with('[');
    if !json_like || body.is_empty() {
        return false;
    }
    let lower = body.to_lowercase();
    let compact: String = lower.chars().filter(|c| !c.is_whitespace()).collect();
    !AUTH_ERROR_MARKERS
        .iter()
        .any(|marker| lower.contains(marker) || compact.contains(marker))
}

#[async_trait]
impl IssueCheck for UnauthorizedAccessCheck {
    fn name(&self) -> &'static str {
        "unauthorized_access"
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<SecurityIssue>, ScanError> {
        let targets: Vec<String> = ctx
            .apis
            .iter()
            .map(|a| a.full_url.clone())
            .take(self.max_probes)
            .collect();

        let mut issues: Vec<SecurityIssue> = stream::iter(targets)
            .map(|url| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    match fetcher.probe(&url).await {
                        Ok(response) if looks_unprotected(&response) => Some(unauthorized_issue(&url, &response)),
                        Ok(_) => None,
                        Err(e) => {
                            debug!("probe {} failed: {}", url, e);
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|issue| async move { issue })
            .collect()
            .await;

        // completion order is nondeterministic
        issues.sort_by(|a, b| a.target_url.cmp(&b.target_url));
        Ok(issues)
    }
}

fn unauthorized_issue(url: &str, response: &FetchedResponse) -> SecurityIssue {
    SecurityIssue {
        title: "Unauthenticated API access".to_string(),
        description: format!("{} returned data to a request carrying no credentials.", url),
        issue_type: IssueType::UnauthorizedAccess,
        severity: Severity::High,
        target_url: url.to_string(),
        target_api: Some(url.to_string()),
        evidence: format!(
            "GET {} -> {} ({})\n{}",
            url,
            response.status,
            response.content_type.as_deref().unwrap_or("unknown content type"),
            excerpt(&response.body)
        ),
        remediation: "Require authentication and authorization on this endpoint.".to_string(),
    }
}

/// Parses a version as it appears in a banner, with or without a leading `v`.
pub fn parse_version(raw: &str) -> Option<Version> {
    Version::parse(raw.trim().trim_start_matches('v')).ok()
}

struct Advisory {
    library: &'static str,
    /// Inclusive lower bound.
    introduced: Version,
    /// Exclusive upper bound.
    fixed: Version,
    cve: &'static str,
    severity: Severity,
    summary: &'static str,
}

static ADVISORIES: &[Advisory] = &[
    Advisory {
        library: "jQuery",
        introduced: Version::new(0, 0, 0),
        fixed: Version::new(3, 0, 0),
        cve: "CVE-2015-9251",
        severity: Severity::Medium,
        summary: "cross-domain ajax responses executed as script",
    },
    Advisory {
        library: "jQuery",
        introduced: Version::new(0, 0, 0),
        fixed: Version::new(3, 4, 0),
        cve: "CVE-2019-11358",
        severity: Severity::Medium,
        summary: "prototype pollution in jQuery.extend",
    },
    Advisory {
        library: "jQuery",
        introduced: Version::new(0, 0, 0),
        fixed: Version::new(3, 5, 0),
        cve: "CVE-2020-11022",
        severity: Severity::Medium,
        summary: "XSS through htmlPrefilter",
    },
    Advisory {
        library: "Lodash",
        introduced: Version::new(0, 0, 0),
        fixed: Version::new(4, 17, 12),
        cve: "CVE-2019-10744",
        severity: Severity::High,
        summary: "prototype pollution in defaultsDeep",
    },
    Advisory {
        library: "Lodash",
        introduced: Version::new(0, 0, 0),
        fixed: Version::new(4, 17, 21),
        cve: "CVE-2021-23337",
        severity: Severity::High,
        summary: "command injection through template",
    },
    Advisory {
        library: "AngularJS",
        introduced: Version::new(0, 0, 0),
        fixed: Version::new(1, 8, 0),
        cve: "CVE-2020-7676",
        severity: Severity::Medium,
        summary: "XSS through option elements in select",
    },
    Advisory {
        library: "Bootstrap",
        introduced: Version::new(0, 0, 0),
        fixed: Version::new(3, 4, 1),
        cve: "CVE-2019-8331",
        severity: Severity::Medium,
        summary: "XSS in tooltip and popover data-template",
    },
    Advisory {
        library: "Bootstrap",
        introduced: Version::new(4, 0, 0),
        fixed: Version::new(4, 3, 1),
        cve: "CVE-2019-8331",
        severity: Severity::Medium,
        summary: "XSS in tooltip and popover data-template",
    },
    Advisory {
        library: "Moment.js",
        introduced: Version::new(2, 18, 0),
        fixed: Version::new(2, 29, 4),
        cve: "CVE-2022-31129",
        severity: Severity::High,
        summary: "ReDoS in RFC 2822 date parsing",
    },
    Advisory {
        library: "Handlebars",
        introduced: Version::new(0, 0, 0),
        fixed: Version::new(4, 7, 7),
        cve: "CVE-2021-23369",
        severity: Severity::Critical,
        summary: "remote code execution when compiling untrusted templates",
    },
    Advisory {
        library: "axios",
        introduced: Version::new(0, 0, 0),
        fixed: Version::new(0, 21, 1),
        cve: "CVE-2020-28168",
        severity: Severity::Medium,
        summary: "SSRF through redirects to proxied hosts",
    },
    Advisory {
        library: "DOMPurify",
        introduced: Version::new(0, 0, 0),
        fixed: Version::new(2, 0, 17),
        cve: "CVE-2020-26870",
        severity: Severity::High,
        summary: "sanitizer bypass through nested math elements",
    },
];

const VERSION_SIGNATURES: &[(&str, &str)] = &[
    ("jQuery", r"jQuery\s+(?:JavaScript Library\s+)?v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"),
    ("jQuery", r#"jQuery\.fn\.jquery\s*=\s*["'](\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"#),
    ("Lodash", r"(?i)\blodash\s+(?:core\s+)?v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"),
    ("Lodash", r#"lodash["']?\s*:\s*["'](\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"#),
    ("AngularJS", r"AngularJS\s+v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"),
    ("AngularJS", r#"angular\.version\.full\s*=\s*["'](\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"#),
    ("Bootstrap", r"Bootstrap\s+v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"),
    ("Moment.js", r"(?i)\bmoment(?:\.js)?\s+v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"),
    ("Moment.js", r#"moment\.version\s*=\s*["'](\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"#),
    ("Handlebars", r"(?i)\bhandlebars(?:\.js)?\s+v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"),
    ("axios", r"\baxios\s+v(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"),
    ("DOMPurify", r"DOMPurify\s+(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)"),
];

/// Matches library banners and version assignments against known CVE ranges.
pub struct ComponentCheck {
    signatures: Vec<(&'static str, Regex)>,
}

impl ComponentCheck {
    pub fn new() -> Result<Self, regex::Error> {
        let mut signatures = Vec::with_capacity(VERSION_SIGNATURES.len());
        for (library, pattern) in VERSION_SIGNATURES {
            signatures.push((*library, Regex::new(pattern)?));
        }
        Ok(Self { signatures })
    }

    /// (library, version) pairs visible in `content`.
    pub fn detect_versions(&self, content: &str) -> Vec<(&'static str, Version)> {
        let mut found = Vec::new();
        for (library, re) in &self.signatures {
            for cap in re.captures_iter(content) {
                if let Some(version) = cap.get(1).and_then(|m| parse_version(m.as_str())) {
                    if !found.iter().any(|(l, v)| l == library && *v == version) {
                        found.push((*library, version));
                    }
                }
            }
        }
        found
    }
}

#[async_trait]
impl IssueCheck for ComponentCheck {
    fn name(&self) -> &'static str {
        "vulnerable_components"
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<SecurityIssue>, ScanError> {
        let mut reported = HashSet::new();
        let mut issues = Vec::new();

        for resource in ctx.resources {
            for (library, version) in self.detect_versions(&resource.content) {
                let affected = ADVISORIES
                    .iter()
                    .filter(|a| a.library == library && a.introduced <= version && version < a.fixed);
                for advisory in affected {
                    if !reported.insert((library, version.clone(), advisory.cve)) {
                        continue;
                    }
                    issues.push(SecurityIssue {
                        title: format!("{} {} affected by {}", library, version, advisory.cve),
                        description: format!("{} {}: {}.", library, version, advisory.summary),
                        issue_type: IssueType::ComponentVulnerability,
                        severity: advisory.severity,
                        target_url: resource.url.clone(),
                        target_api: None,
                        evidence: format!("{} {} referenced in {}", library, version, resource.url),
                        remediation: format!("Upgrade {} to {} or later.", library, advisory.fixed),
                    });
                }
            }
        }
        Ok(issues)
    }
}
