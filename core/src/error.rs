//! Error types for the discovery pipeline

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::state::ScanPhase;

/// Top-level error type for a scan.
///
/// Only `Fetch` and `Extraction` are recoverable: the engine records them
/// against the offending resource and keeps going. Everything else ends the
/// scan as `failed`.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid target: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Could not extract APIs from {url}: {reason}")]
    Extraction { url: String, reason: String },

    #[error("Scan exceeded its time budget of {0}s")]
    Timeout(u64),

    #[error("Internal error during {phase}: {message}")]
    Internal { phase: ScanPhase, message: String },
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::Validation(_) => ErrorKind::Validation,
            ScanError::Fetch(_) => ErrorKind::Fetch,
            ScanError::Extraction { .. } => ErrorKind::Extraction,
            ScanError::Timeout(_) => ErrorKind::Timeout,
            ScanError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the engine may skip the failing resource and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ScanError::Fetch(_) | ScanError::Extraction { .. })
    }
}

/// Serializable classification of a [`ScanError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Fetch,
    Extraction,
    Timeout,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// Reasons a URL is refused before any network traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed URL '{0}'")]
    Malformed(String),

    #[error("unsupported scheme '{0}', only http and https are allowed")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("host '{0}' is on the blocklist")]
    BlockedHost(String),

    #[error("address {0} is private, loopback or reserved")]
    BlockedAddress(IpAddr),

    #[error("port {0} belongs to an internal service")]
    BlockedPort(u16),

    #[error("could not resolve host '{0}'")]
    Unresolvable(String),
}

/// Failure to retrieve a single resource.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Refused to fetch {url}: {source}")]
    Blocked {
        url: String,
        #[source]
        source: ValidationError,
    },

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} exceeds the {limit} byte body limit")]
    Oversized { url: String, limit: usize },
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(url.to_string())
        } else if err.is_connect() {
            FetchError::Network {
                url: url.to_string(),
                reason: "failed to connect".to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}
