use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use rand::prelude::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Proxy};

use super::validator::GuardedResolver;
use super::{FetchedResponse, Fetcher, UrlValidator};
use crate::error::{FetchError, ValidationError};
use crate::ScanConfig;

const MAX_REDIRECTS: usize = 5;

// Browser user agents; bundles served to unknown agents sometimes differ.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) \
     Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_0) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
];

/// Pooled `reqwest` client behind the SSRF validator.
pub struct HttpClient {
    inner: Client,
    validator: UrlValidator,
    user_agent: Option<String>,
    default_headers: HeaderMap,
    max_body_bytes: usize,
}

impl HttpClient {
    pub fn from_config(config: &ScanConfig) -> Result<Self, reqwest::Error> {
        let validator = UrlValidator::new(config.allow_internal);

        // Every redirect hop goes through the same validator as the first request.
        let redirect_validator = validator.clone();
        let policy = Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if let Err(e) = redirect_validator.check(attempt.url()) {
                attempt.error(e)
            } else {
                attempt.follow()
            }
        });

        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout))
            .connect_timeout(Duration::from_secs(config.request_timeout.min(10)))
            .danger_accept_invalid_certs(!config.verify_tls)
            .redirect(policy);
        if !config.allow_internal {
            builder = builder.dns_resolver(Arc::new(GuardedResolver));
        }
        if let Some(proxy) = config.proxy_ref() {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        let inner = builder.build()?;

        let mut default_headers = HeaderMap::new();
        for (key, val) in config.parsed_headers() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(&val),
            ) {
                default_headers.insert(name, value);
            }
        }

        Ok(Self {
            inner,
            validator,
            user_agent: config.user_agent.clone().filter(|ua| !ua.is_empty()),
            default_headers,
            max_body_bytes: config.max_body_bytes,
        })
    }

    fn user_agent(&self) -> &str {
        if let Some(ref ua) = self.user_agent {
            return ua;
        }
        let mut rng = rand::rng();
        USER_AGENTS.choose(&mut rng).copied().unwrap_or("Mozilla/5.0")
    }

    /// `with_headers` controls whether configured headers (cookies, tokens) are sent.
    async fn get(&self, url: &str, with_headers: bool) -> Result<FetchedResponse, FetchError> {
        // Static checks here; addresses are checked by the resolver at connect time.
        let blocked = |source| FetchError::Blocked {
            url: url.to_string(),
            source,
        };
        let parsed = url::Url::parse(url).map_err(|_| blocked(ValidationError::Malformed(url.to_string())))?;
        self.validator.check(&parsed).map_err(blocked)?;

        let mut request = self
            .inner
            .get(parsed)
            .header(reqwest::header::USER_AGENT, self.user_agent());
        if with_headers {
            for (name, value) in self.default_headers.iter() {
                request = request.header(name, value);
            }
        }

        let mut response = request.send().await.map_err(|e| match refusal_in(&e) {
            Some(source) => FetchError::Blocked {
                url: url.to_string(),
                source,
            },
            None => FetchError::from_reqwest(url, e),
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let declared_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_len.is_some_and(|len| len > self.max_body_bytes) {
            return Err(FetchError::Oversized {
                url: url.to_string(),
                limit: self.max_body_bytes,
            });
        }

        // Read chunk by chunk so a lying or absent Content-Length cannot blow the limit.
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::Oversized {
                    url: url.to_string(),
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!("GET {} -> {} ({} bytes)", url, status, body.len());

        Ok(FetchedResponse {
            url: final_url,
            status,
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// The validation error behind a refused connection or redirect, if any.
fn refusal_in(err: &reqwest::Error) -> Option<ValidationError> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(refusal) = cause.downcast_ref::<ValidationError>() {
            return Some(refusal.clone());
        }
        source = cause.source();
    }
    None
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let response = self.get(url, true).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response)
    }

    async fn probe(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        self.get(url, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local_config() -> ScanConfig {
        ScanConfig {
            allow_internal: true,
            request_timeout: 2,
            ..ScanConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app.js"))
            .and(header_exists("user-agent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("var a = '/api/users';", "application/javascript"),
            )
            .mount(&server)
            .await;

        let client = HttpClient::from_config(&local_config()).unwrap();
        let resp = client.fetch(&format!("{}/app.js", server.uri())).await.unwrap();
        assert_eq!(resp.status, 200);
        assert!(resp.body.contains("/api/users"));
        assert_eq!(resp.content_type.as_deref(), Some("application/javascript"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_error_status_but_probe_does_not() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.js"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::from_config(&local_config()).unwrap();
        let url = format!("{}/missing.js", server.uri());
        assert!(matches!(
            client.fetch(&url).await,
            Err(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(client.probe(&url).await.unwrap().status, 404);
    }

    #[tokio::test]
    async fn test_fetch_enforces_body_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/huge.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;

        let config = ScanConfig {
            max_body_bytes: 1024,
            ..local_config()
        };
        let client = HttpClient::from_config(&config).unwrap();
        let result = client.fetch(&format!("{}/huge.js", server.uri())).await;
        assert!(matches!(result, Err(FetchError::Oversized { limit: 1024, .. })));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = ScanConfig {
            request_timeout: 1,
            ..local_config()
        };
        let client = HttpClient::from_config(&config).unwrap();
        let result = client.fetch(&format!("{}/slow.js", server.uri())).await;
        assert!(matches!(result, Err(FetchError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_resolver_refuses_redirect_to_loopback_name() {
        let server = MockServer::start().await;
        let port = server.address().port();
        Mock::given(method("GET"))
            .and(path("/hop"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("http://localhost:{}/admin", port).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        // IP literals skip DNS, so only the redirect hop reaches the resolver.
        let client = ClientBuilder::new()
            .dns_resolver(Arc::new(GuardedResolver))
            .build()
            .unwrap();
        let err = client
            .get(format!("{}/hop", server.uri()))
            .send()
            .await
            .unwrap_err();
        assert!(matches!(refusal_in(&err), Some(ValidationError::BlockedAddress(_))));
    }

    #[tokio::test]
    async fn test_blocked_url_never_sent() {
        let client = HttpClient::from_config(&ScanConfig::default()).unwrap();
        let result = client.fetch("http://127.0.0.1:9/app.js").await;
        assert!(matches!(result, Err(FetchError::Blocked { .. })));
    }
}
