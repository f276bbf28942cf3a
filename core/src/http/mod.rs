pub mod client;
pub mod validator;

pub use client::HttpClient;
pub use validator::UrlValidator;

use async_trait::async_trait;

use crate::error::FetchError;

/// A successfully retrieved resource.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_lowercase().contains("json"))
            .unwrap_or(false)
    }
}

/// Outbound HTTP capability used by the engine and the issue probes.
///
/// Implementations must validate every URL before connecting and must be
/// safe to share across concurrent tasks.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GETs `url` and returns the body of a 2xx response.
    async fn fetch(&self, url: &str) -> Result<FetchedResponse, FetchError>;

    /// GETs `url` anonymously, without treating non-2xx statuses as errors.
    /// Configured credential headers are not sent.
    async fn probe(&self, url: &str) -> Result<FetchedResponse, FetchError>;
}
