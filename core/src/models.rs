//! Entities produced by a scan.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::core::{IssueType, Severity};

/// How a script URL was found in the seed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    StaticTag,
    FrameworkHint,
    ChunkManifest,
    BundleName,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ExtractionMethod::StaticTag => "static_tag",
            ExtractionMethod::FrameworkHint => "framework_hint",
            ExtractionMethod::ChunkManifest => "chunk_manifest",
            ExtractionMethod::BundleName => "bundle_name",
        };
        f.write_str(label)
    }
}

/// A fetched JavaScript file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsResource {
    pub url: String,
    /// scheme://host[:port] of `url`
    pub base_url: String,
    pub file_name: String,
    pub file_size: usize,
    /// Hex SHA-256 of the body
    pub content_hash: String,
    pub extraction_method: ExtractionMethod,
    /// Body text, only held while the scan runs. Shared with the extraction workers.
    #[serde(skip, default = "empty_content")]
    pub content: Arc<str>,
}

impl JsResource {
    pub fn new(url: &str, extraction_method: ExtractionMethod, content: String) -> Self {
        let parsed = Url::parse(url).ok();
        let base_url = parsed
            .as_ref()
            .map(origin_of)
            .unwrap_or_default();
        let file_name = parsed
            .as_ref()
            .and_then(|u| u.path_segments())
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "index.js".to_string());

        Self {
            url: url.to_string(),
            base_url,
            file_name,
            file_size: content.len(),
            content_hash: sha256_hex(content.as_bytes()),
            extraction_method,
            content: Arc::from(content),
        }
    }
}

fn empty_content() -> Arc<str> {
    Arc::from("")
}

/// One candidate backend endpoint.
///
/// `full_url` is always `base_url` + `base_api_path` + `api_path` joined with
/// single slashes; see [`crate::modules::api_extractor::build_full_url`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiDescriptor {
    pub base_url: String,
    pub base_api_path: String,
    pub service_path: Option<String>,
    pub api_path: String,
    pub full_url: String,
    pub http_method: String,
    pub discovery_method: String,
    pub source_js: String,
}

/// An inferred backend service: APIs sharing a first path segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroserviceInfo {
    pub base_url: String,
    pub service_name: String,
    pub service_full_path: String,
    pub total_endpoints: usize,
    pub unique_paths: Vec<String>,
    pub detected_technologies: Vec<String>,
    pub has_vulnerabilities: bool,
    pub vulnerability_details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityIssue {
    pub title: String,
    pub description: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub target_url: String,
    pub target_api: Option<String>,
    pub evidence: String,
    pub remediation: String,
}

/// scheme://host[:port] of a parsed URL, without a trailing slash.
pub fn origin_of(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}://{}:{}", url.scheme(), host, port),
        (Some(host), None) => format!("{}://{}", url.scheme(), host),
        _ => String::new(),
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
