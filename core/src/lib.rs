pub mod core;
pub mod error;
pub mod http;
pub mod models;
pub mod modules;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use crate::core::engine::ScanEngine;
pub use crate::core::result_aggregator::{ResultAggregator, ScanResult, ScanStatistics};
pub use crate::core::state::{ScanPhase, ScanStatus};
pub use crate::core::{IssueType, Severity};
pub use crate::error::{ScanError, ValidationError};
pub use crate::http::{Fetcher, HttpClient, UrlValidator};
pub use crate::models::{ApiDescriptor, JsResource, MicroserviceInfo, SecurityIssue};
pub use crate::utils::read_targets;

/// Bounded configuration for one scan. Unknown keys in a config file are
/// ignored and missing ones take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub enable_js_extraction: bool,
    pub enable_api_discovery: bool,
    pub enable_microservice_detection: bool,
    pub enable_unauthorized_check: bool,
    pub enable_sensitive_info_check: bool,
    pub enable_component_check: bool,
    /// Runs the heuristic enrichment stage after the regex baseline.
    pub use_ai: bool,
    /// Overall scan budget in seconds; 0 disables it.
    pub timeout: u64,
    pub max_js_files: usize,
    pub max_apis: usize,
    /// Upper bound on anonymous probes sent by the unauthorized-access check.
    pub max_probes: usize,
    pub concurrency: usize,
    /// Per-request timeout in seconds.
    pub request_timeout: u64,
    pub max_body_bytes: usize,
    pub verify_tls: bool,
    pub user_agent: Option<String>,
    /// Lifts the private-address and port blocklists. Scheme checks still apply.
    pub allow_internal: bool,
    pub proxy: String,
    /// `Name: value` pairs separated by `;`.
    pub headers: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enable_js_extraction: true,
            enable_api_discovery: true,
            enable_microservice_detection: true,
            enable_unauthorized_check: true,
            enable_sensitive_info_check: true,
            enable_component_check: true,
            use_ai: false,
            timeout: 300,
            max_js_files: 100,
            max_apis: 1000,
            max_probes: 100,
            concurrency: 10,
            request_timeout: 10,
            max_body_bytes: 5 * 1024 * 1024,
            verify_tls: true,
            user_agent: None,
            allow_internal: false,
            proxy: String::new(),
            headers: String::new(),
        }
    }
}

impl ScanConfig {
    /// Reads a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn header_list(&self) -> Vec<String> {
        if self.headers.is_empty() {
            Vec::new()
        } else {
            self.headers
                .split(';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }
    }

    pub fn parsed_headers(&self) -> Vec<(String, String)> {
        parse_custom_headers(&self.header_list())
    }

    pub fn proxy_ref(&self) -> Option<&str> {
        if self.proxy.is_empty() { None } else { Some(&self.proxy) }
    }
}

pub fn parse_custom_headers(raw: &[String]) -> Vec<(String, String)> {
    raw.iter().filter_map(|h| {
        let mut parts = h.splitn(2, ':');
        let key = parts.next()?.trim().to_string();
        let val = parts.next().unwrap_or("").trim().to_string();
        if key.is_empty() { return None; }
        Some((key, val))
    }).collect()
}

/// Output abstraction for the scan pipeline.
/// The CLI renders these events; library callers may ignore them.
pub trait ScanEventSink: Send + Sync {
    fn on_log(&self, level: &str, message: &str);
    /// Advisory: `percent` is an estimate tied to the phase.
    fn on_progress(&self, phase: ScanPhase, percent: u8);
    fn on_issue(&self, issue: &SecurityIssue);
}

pub type SinkRef = Arc<dyn ScanEventSink>;

/// Discards every event.
pub struct NullSink;

impl NullSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self)
    }
}

impl ScanEventSink for NullSink {
    fn on_log(&self, _level: &str, _message: &str) {}
    fn on_progress(&self, _phase: ScanPhase, _percent: u8) {}
    fn on_issue(&self, _issue: &SecurityIssue) {}
}

/// Terminal output sink.
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self)
    }
}

impl ScanEventSink for ConsoleSink {
    fn on_log(&self, level: &str, message: &str) {
        use colored::*;
        let colored = match level {
            "success" => message.green().to_string(),
            "error"   => message.red().to_string(),
            "warn"    => message.yellow().to_string(),
            "phase"   => message.bright_cyan().bold().to_string(),
            _         => message.to_string(),
        };
        println!("{}", colored);
    }

    fn on_progress(&self, phase: ScanPhase, percent: u8) {
        use colored::*;
        println!("{}", format!("[*] {} ({}%)", phase, percent).bright_cyan());
    }

    fn on_issue(&self, issue: &SecurityIssue) {
        use colored::*;
        let severity = match issue.severity {
            Severity::Critical | Severity::High => issue.severity.as_str().red().bold(),
            Severity::Medium => issue.severity.as_str().yellow().bold(),
            _ => issue.severity.as_str().blue(),
        };
        println!("\n{} [{}] {}", "[+]".green().bold(), severity, issue.title.bold());
        println!("    Type:     {}", issue.issue_type);
        println!("    Target:   {}", issue.target_url.white());
        println!("    Evidence: {}", issue.evidence.dimmed());
    }
}

/// Scans `target_url` with a fresh [`HttpClient`] and no event output.
pub async fn scan(target_url: &str, config: &ScanConfig) -> ScanResult {
    scan_with_sink(target_url, config, NullSink::new_ref()).await
}

pub async fn scan_with_sink(target_url: &str, config: &ScanConfig, sink: SinkRef) -> ScanResult {
    match HttpClient::from_config(config) {
        Ok(client) => {
            ScanEngine::new(config.clone(), Arc::new(client), sink)
                .run(target_url)
                .await
        }
        Err(e) => ScanEngine::failed_before_start(
            target_url,
            &ScanError::Internal {
                phase: ScanPhase::FetchSeed,
                message: format!("could not build HTTP client: {}", e),
            },
        ),
    }
}
