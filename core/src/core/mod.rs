pub mod engine;
pub mod result_aggregator;
pub mod state;
pub mod target_manager;
pub mod throttle;

use serde::{Deserialize, Serialize};

/// Security issue classification used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    UnauthorizedAccess,
    SensitiveDataLeak,
    ComponentVulnerability,
    WeakAuthentication,
    Other,
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueType::UnauthorizedAccess => write!(f, "Unauthorized Access"),
            IssueType::SensitiveDataLeak => write!(f, "Sensitive Data Leak"),
            IssueType::ComponentVulnerability => write!(f, "Vulnerable Component"),
            IssueType::WeakAuthentication => write!(f, "Weak Authentication"),
            IssueType::Other => write!(f, "Other"),
        }
    }
}

/// Ordered from most to least severe so sorting puts critical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
