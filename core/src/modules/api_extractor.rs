//! Static API discovery over JavaScript source.
//!
//! Three signal classes are mined independently:
//!
//! - **base URLs**: the page origin, absolute `scheme://host` literals, and
//!   values assigned to `baseURL` / `BASE_URL` / `API_URL` style keys;
//! - **base API paths**: the empty prefix, literal `/api`, `/v1/...` style
//!   prefixes, and prefixes shared by a large share of the path literals;
//! - **API paths**: quoted absolute paths and the first argument of
//!   `fetch`, `axios.*`, `get/post/...` calls and `url:` fields.
//!
//! Every (base URL, base path, API path) triple becomes a candidate. This is
//! deliberately over-generating: probing downstream sorts out which guesses
//! are real.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use log::debug;
use regex::Regex;
use url::Url;

use crate::error::ScanError;
use crate::models::{origin_of, ApiDescriptor};
use crate::modules::matchers::{self, Matcher};

pub const API_KEYWORDS: &[&str] = &[
    "api", "v1", "v2", "v3", "rest", "service", "gateway", "backend", "server",
];

const STATIC_RESOURCE_EXTENSIONS: &[&str] = &[
    ".js", ".css", ".html", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".ttf", ".mp4",
];

const STATIC_DIRECTORIES: &[&str] = &["assets", "static", "public", "images", "css", "fonts", "vendor"];

/// XML/JSON-schema namespace hosts that show up in every bundle but never serve APIs.
const NAMESPACE_HOSTS: &[&str] = &[
    "www.w3.org",
    "w3.org",
    "schemas.xmlsoap.org",
    "schemas.microsoft.com",
    "schemas.openxmlformats.org",
    "json-schema.org",
    "purl.org",
    "ns.adobe.com",
];

/// Share of distinct path literals a prefix must appear in to count as a base path.
const COMMON_PREFIX_RATIO: f64 = 0.3;
const COMMON_PREFIX_MIN_COUNT: f64 = 2.0;

const API_PATH_RULES: &[(&str, &str, usize)] = &[
    // `$` excluded so template literals are left to the enricher
    ("quoted_path", r#"["'`](/[^"'`\s<>\\$]*)["'`]"#, 1),
    ("verb_call", r#"\b(?:get|post|put|delete|patch)\s*\(\s*["'`]([^"'`\s]+)["'`]"#, 1),
    (
        "axios_call",
        r#"\baxios\.(?:get|post|put|delete|patch|head|options|request)\s*\(\s*["'`]([^"'`\s]+)["'`]"#,
        1,
    ),
    ("fetch_call", r#"\bfetch\s*\(\s*["'`]([^"'`\s]+)["'`]"#, 1),
    ("url_field", r#"\burl\s*:\s*["'`]([^"'`\s]+)["'`]"#, 1),
];

/// Whether `path` may be an API route rather than a static asset.
pub fn is_valid_api_path(path: &str) -> bool {
    if !path.starts_with('/') || path.starts_with("//") {
        return false;
    }
    if !path.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }

    let lower = path.to_lowercase();
    if STATIC_RESOURCE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }

    let segments: Vec<&str> = lower.split('/').filter(|s| !s.is_empty()).collect();
    let in_static_dir = segments.iter().any(|s| STATIC_DIRECTORIES.contains(s));
    // `/static/api/...` is both; the API keyword wins
    !in_static_dir || has_api_keyword(&segments)
}

fn has_api_keyword(segments: &[&str]) -> bool {
    segments.iter().any(|s| API_KEYWORDS.contains(s))
}

/// First segment of an API path: `/user/info` → `/user`. `None` for `/`.
pub fn service_path_of(api_path: &str) -> Option<String> {
    api_path
        .split('/')
        .find(|s| !s.is_empty())
        .map(|s| format!("/{}", s))
}

/// Joins the three layers with exactly one slash between each.
pub fn build_full_url(base_url: &str, base_api_path: &str, api_path: &str) -> String {
    let mut joined = base_url.trim_end_matches('/').to_string();
    for part in [base_api_path.trim_matches('/'), api_path.trim_start_matches('/')] {
        if !part.is_empty() {
            joined.push('/');
            joined.push_str(part);
        }
    }
    collapse_slashes(&joined)
}

fn collapse_slashes(url: &str) -> String {
    let (prefix, rest) = match url.find("://") {
        Some(i) => url.split_at(i + 3),
        None => ("", url),
    };
    let mut out = String::with_capacity(url.len());
    out.push_str(prefix);
    let mut prev_slash = false;
    for c in rest.chars() {
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        out.push(c);
    }
    out
}

/// Strips query/fragment and reduces absolute URLs to their path.
/// Returns `None` for anything that is not a usable API path.
pub fn normalize_api_path(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let path = if raw.starts_with("http://") || raw.starts_with("https://") {
        Url::parse(raw).ok()?.path().to_string()
    } else {
        raw.split(['?', '#']).next().unwrap_or("").to_string()
    };
    if path.contains("${") {
        return None;
    }
    is_valid_api_path(&path).then_some(path)
}

/// Optional enrichment stage run after the regex baseline.
///
/// Implementations add candidates the baseline cannot see. They must never
/// fail: an enricher with nothing to say returns empty sets.
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    fn base_api_paths(&self, _source: &str) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn api_paths(&self, _source: &str) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Best-effort mining of string concatenation and template literals,
/// used when `use_ai` is enabled.
pub struct ConcatenationEnricher {
    concat: Regex,
    template: Regex,
    placeholder: Regex,
}

impl ConcatenationEnricher {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            concat: Regex::new(r#"\+\s*["'](/[^"'\s$]+)["']"#)?,
            template: Regex::new(r"`([^`]*\$\{[^`]*)`")?,
            placeholder: Regex::new(r"\$\{[^}]*\}")?,
        })
    }
}

impl Enricher for ConcatenationEnricher {
    fn name(&self) -> &'static str {
        "concatenation"
    }

    fn api_paths(&self, source: &str) -> BTreeSet<String> {
        let mut found: BTreeSet<String> = self
            .concat
            .captures_iter(source)
            .filter_map(|cap| normalize_api_path(&cap[1]))
            .collect();

        for cap in self.template.captures_iter(source) {
            let rewritten = self.placeholder.replace_all(&cap[1], "{param}");
            // `${API_BASE}/users` keeps only the path after the leading expression
            let path = rewritten.strip_prefix("{param}").unwrap_or(&rewritten);
            if let Some(p) = normalize_api_path(path) {
                found.insert(p);
            }
        }
        found
    }
}

/// The three mined layers for one source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiComponents {
    pub base_urls: Vec<String>,
    pub base_api_paths: Vec<String>,
    pub api_paths: Vec<String>,
}

pub struct ApiExtractor {
    absolute_url: Regex,
    config_assignment: Regex,
    keyword_prefix: Regex,
    path_literal: Regex,
    api_path_matchers: Vec<Box<dyn Matcher>>,
    enricher: Option<Arc<dyn Enricher>>,
    limit: usize,
}

impl ApiExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            absolute_url: Regex::new(r"\bhttps?://[A-Za-z0-9](?:[A-Za-z0-9.-]*[A-Za-z0-9])?(?::\d{1,5})?")?,
            config_assignment: Regex::new(
                r#"(?i)["']?\b(?:base_?url|api_?url)["']?\s*[:=]\s*["'`]([^"'`\s]+)["'`]"#,
            )?,
            keyword_prefix: Regex::new(
                r#"(?i)["'`](/(?:api|v1|v2|v3|rest|service|gateway|backend|server)(?:/[\w.-]+)?)/?["'`]"#,
            )?,
            path_literal: Regex::new(r#"["'`](/[\w\-./]+)["'`]"#)?,
            api_path_matchers: matchers::compile(API_PATH_RULES)?,
            enricher: None,
            limit: usize::MAX,
        })
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Upper bound on descriptors produced per call.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn discovery_method(&self) -> &'static str {
        if self.enricher.is_some() {
            "regex+ai"
        } else {
            "regex"
        }
    }

    /// Mines `source` and composes candidate descriptors, deduplicated by `full_url`.
    pub fn extract(
        &self,
        source: &str,
        default_base_url: &str,
        source_js: &str,
    ) -> Result<Vec<ApiDescriptor>, ScanError> {
        check_is_script(source, source_js)?;

        let components = self.components(source, default_base_url);
        let descriptors = self.compose(&components, source_js);
        debug!(
            "{}: {} base URL(s) x {} base path(s) x {} path(s) -> {} candidate(s)",
            source_js,
            components.base_urls.len(),
            components.base_api_paths.len(),
            components.api_paths.len(),
            descriptors.len()
        );
        Ok(descriptors)
    }

    pub fn components(&self, source: &str, default_base_url: &str) -> ApiComponents {
        let (base_urls, assigned_paths) = self.base_urls(source, default_base_url);

        let mut base_paths = self.base_api_paths(source);
        base_paths.extend(assigned_paths);
        if let Some(ref enricher) = self.enricher {
            base_paths.extend(enricher.base_api_paths(source));
        }
        let mut base_api_paths = vec![String::new()];
        base_api_paths.extend(base_paths.into_iter().filter(|p| !p.is_empty()));

        let mut api_paths: BTreeSet<String> = matchers::find_all(&self.api_path_matchers, source)
            .iter()
            .filter_map(|raw| normalize_api_path(raw))
            .collect();
        if let Some(ref enricher) = self.enricher {
            api_paths.extend(
                enricher
                    .api_paths(source)
                    .into_iter()
                    .filter(|p| is_valid_api_path(p)),
            );
        }

        ApiComponents {
            base_urls,
            base_api_paths,
            api_paths: api_paths.into_iter().collect(),
        }
    }

    /// Page origin first, then configured bases, then any other absolute literal.
    /// Relative values assigned to base-URL keys are returned as base paths.
    fn base_urls(&self, source: &str, default_base_url: &str) -> (Vec<String>, BTreeSet<String>) {
        let mut ordered = Vec::new();
        let mut push = |url: String| {
            if !url.is_empty() && !ordered.contains(&url) {
                ordered.push(url);
            }
        };
        push(default_base_url.trim_end_matches('/').to_string());

        let mut configured = BTreeSet::new();
        let mut assigned_paths = BTreeSet::new();
        for cap in self.config_assignment.captures_iter(source) {
            let value = &cap[1];
            if value.starts_with('/') && !value.starts_with("//") {
                assigned_paths.insert(value.split(['?', '#']).next().unwrap_or("").to_string());
            } else if let Some(origin) = reduce_to_origin(value) {
                configured.insert(origin);
            }
        }

        let literals: BTreeSet<String> = self
            .absolute_url
            .find_iter(source)
            .filter_map(|m| reduce_to_origin(m.as_str()))
            .collect();

        configured.into_iter().for_each(&mut push);
        literals.into_iter().for_each(&mut push);
        (ordered, assigned_paths)
    }

    fn base_api_paths(&self, source: &str) -> BTreeSet<String> {
        let mut paths: BTreeSet<String> = self
            .keyword_prefix
            .captures_iter(source)
            .map(|cap| cap[1].to_string())
            .collect();
        paths.extend(self.common_prefixes(source));
        paths
    }

    /// Prefixes shared by at least max(2, 30%) of the distinct path literals
    /// that also contain an API keyword segment.
    fn common_prefixes(&self, source: &str) -> BTreeSet<String> {
        let literals: BTreeSet<&str> = self
            .path_literal
            .captures_iter(source)
            .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
            .collect();
        if literals.is_empty() {
            return BTreeSet::new();
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for literal in &literals {
            let segments: Vec<&str> = literal.split('/').filter(|s| !s.is_empty()).collect();
            for len in 1..segments.len() {
                *counts.entry(format!("/{}", segments[..len].join("/"))).or_insert(0) += 1;
            }
        }

        let threshold = COMMON_PREFIX_MIN_COUNT.max(literals.len() as f64 * COMMON_PREFIX_RATIO);
        counts
            .into_iter()
            .filter(|(_, count)| *count as f64 >= threshold)
            .filter(|(prefix, _)| {
                let lower = prefix.to_lowercase();
                let segments: Vec<&str> = lower.split('/').filter(|s| !s.is_empty()).collect();
                has_api_keyword(&segments)
            })
            .map(|(prefix, _)| prefix)
            .collect()
    }

    fn compose(&self, components: &ApiComponents, source_js: &str) -> Vec<ApiDescriptor> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let method = self.discovery_method();

        // Path-major so a capped file still composes every base URL.
        'outer: for api_path in &components.api_paths {
            for base_url in &components.base_urls {
                for base_api_path in &components.base_api_paths {
                    if out.len() >= self.limit {
                        break 'outer;
                    }
                    let full_url = build_full_url(base_url, base_api_path, api_path);
                    if !seen.insert(full_url.clone()) {
                        continue;
                    }
                    out.push(ApiDescriptor {
                        base_url: base_url.clone(),
                        base_api_path: base_api_path.clone(),
                        service_path: service_path_of(api_path),
                        api_path: api_path.clone(),
                        full_url,
                        http_method: "GET".to_string(),
                        discovery_method: method.to_string(),
                        source_js: source_js.to_string(),
                    });
                }
            }
        }
        out
    }
}

fn reduce_to_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_lowercase();
    if NAMESPACE_HOSTS.contains(&host.as_str()) {
        return None;
    }
    Some(origin_of(&url))
}

/// SPA servers answer unknown paths with the index page; such bodies carry no APIs.
fn check_is_script(source: &str, source_js: &str) -> Result<(), ScanError> {
    let head: String = source.trim_start().chars().take(64).collect::<String>().to_lowercase();
    let reason = if head.is_empty() {
        "body is empty"
    } else if head.starts_with("<!doctype html") || head.starts_with("<html") {
        "body is an HTML document"
    } else {
        return Ok(());
    };
    Err(ScanError::Extraction {
        url: source_js.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://shop.example.com";
    const JS: &str = "https://shop.example.com/static/js/app.js";

    fn extractor() -> ApiExtractor {
        ApiExtractor::new().unwrap()
    }

    #[test]
    fn test_api_path_filter() {
        assert!(is_valid_api_path("/api/users"));
        assert!(is_valid_api_path("/static/api/users"));
        assert!(is_valid_api_path("/user/getInfo"));
        assert!(!is_valid_api_path("/style.css"));
        assert!(!is_valid_api_path("/static/logo.png"));
        assert!(!is_valid_api_path("/static/chunks/runtime"));
        assert!(!is_valid_api_path("/"));
        assert!(!is_valid_api_path("/123/456"));
        assert!(!is_valid_api_path("api/users"));
        assert!(!is_valid_api_path("//cdn.example.com/lib"));
    }

    #[test]
    fn test_service_path() {
        assert_eq!(service_path_of("/user/getInfo").as_deref(), Some("/user"));
        assert_eq!(service_path_of("/admin/users/list").as_deref(), Some("/admin"));
        assert_eq!(service_path_of("/"), None);
    }

    #[test]
    fn test_build_full_url_slash_handling() {
        let cases = [
            ("https://a.com", "", "/users", "https://a.com/users"),
            ("https://a.com/", "/api/", "/users", "https://a.com/api/users"),
            ("https://a.com", "api", "users", "https://a.com/api/users"),
            ("https://a.com//", "//api/v1//", "//users//list", "https://a.com/api/v1/users/list"),
            ("http://a.com:8080", "/gateway", "/order/", "http://a.com:8080/gateway/order/"),
        ];
        for (base, prefix, path, expected) in cases {
            let full = build_full_url(base, prefix, path);
            assert_eq!(full, expected);
            let after_scheme = &full[full.find("://").unwrap() + 3..];
            assert!(!after_scheme.contains("//"));
        }
    }

    #[test]
    fn test_normalize_api_path() {
        assert_eq!(normalize_api_path("/api/users?page=1").as_deref(), Some("/api/users"));
        assert_eq!(
            normalize_api_path("https://api.example.com/v2/orders#x").as_deref(),
            Some("/v2/orders")
        );
        assert_eq!(normalize_api_path("/api/users/${id}"), None);
        assert_eq!(normalize_api_path("/favicon.ico"), None);
    }

    #[test]
    fn test_base_urls() {
        let source = r#"
            const http = axios.create({ baseURL: 'https://api.example.com/v1' });
            var cfg = { API_URL: "https://gw.example.com:8443" };
            var ns = "http://www.w3.org/2000/svg";
            var cdn = "https://cdn.example.net/assets/x.png";
        "#;
        let c = extractor().components(source, PAGE);
        assert_eq!(
            c.base_urls,
            vec![
                "https://shop.example.com",
                "https://api.example.com",
                "https://gw.example.com:8443",
                "https://cdn.example.net",
            ]
        );
    }

    #[test]
    fn test_relative_base_url_becomes_base_path() {
        let source = r#"axios.defaults.baseURL = '/backend'; get('/orders/list')"#;
        let c = extractor().components(source, PAGE);
        assert!(c.base_api_paths.contains(&"/backend".to_string()));
        assert_eq!(c.base_urls, vec![PAGE.to_string()]);
    }

    #[test]
    fn test_keyword_base_paths() {
        let source = r#"const A = "/api"; const B = '/v2/mobile'; const C = "/apix"; const D = '/rest/';"#;
        let c = extractor().components(source, PAGE);
        assert_eq!(c.base_api_paths[0], "");
        assert!(c.base_api_paths.contains(&"/api".to_string()));
        assert!(c.base_api_paths.contains(&"/v2/mobile".to_string()));
        assert!(c.base_api_paths.contains(&"/rest".to_string()));
        assert!(!c.base_api_paths.contains(&"/apix".to_string()));
    }

    #[test]
    fn test_common_prefix_mining() {
        let source = r#"
            get("/gateway/user/info"); get("/gateway/user/list");
            post("/gateway/order/create"); get("/gateway/order/detail");
            get("/home/banner");
        "#;
        let c = extractor().components(source, PAGE);
        // 4 of 5 literals share /gateway; /gateway/user and /gateway/order only 2 each
        assert!(c.base_api_paths.contains(&"/gateway".to_string()));
        assert!(c.base_api_paths.contains(&"/gateway/user".to_string()));
        assert!(c.base_api_paths.contains(&"/gateway/order".to_string()));
        assert!(!c.base_api_paths.contains(&"/home".to_string()));
    }

    #[test]
    fn test_common_prefix_requires_threshold() {
        let source = r#"
            "/svc/api/a"; "/other/b"; "/third/c"; "/fourth/d"; "/fifth/e"; "/sixth/f"; "/seventh/g"
        "#;
        let c = extractor().components(source, PAGE);
        // "/svc/api" appears once: below max(2, 30% of 7)
        assert!(!c.base_api_paths.contains(&"/svc/api".to_string()));
    }

    #[test]
    fn test_api_path_anchors() {
        let source = r#"
            axios.get('/user/profile');
            this.$http.post("/order/submit", data);
            fetch('https://api.example.com/cart/items?limit=5');
            $.ajax({ url: '/message/unread', type: 'GET' });
            var logo = '/static/logo.png';
            var tpl = `/product/${id}`;
        "#;
        let c = extractor().components(source, PAGE);
        for expected in ["/user/profile", "/order/submit", "/cart/items", "/message/unread"] {
            assert!(c.api_paths.contains(&expected.to_string()), "missing {}", expected);
        }
        assert!(!c.api_paths.iter().any(|p| p.contains("logo")));
        assert!(!c.api_paths.iter().any(|p| p.contains("product")));
    }

    #[test]
    fn test_cross_product_composition() {
        let source = r#"
            axios.create({ baseURL: 'https://api.example.com' });
            const PREFIX = '/api';
            axios.get('/user/profile');
        "#;
        let apis = extractor().extract(source, PAGE, JS).unwrap();
        let urls: BTreeSet<&str> = apis.iter().map(|a| a.full_url.as_str()).collect();
        for expected in [
            "https://shop.example.com/user/profile",
            "https://shop.example.com/api/user/profile",
            "https://api.example.com/user/profile",
            "https://api.example.com/api/user/profile",
        ] {
            assert!(urls.contains(expected), "missing {}", expected);
        }

        let api = apis
            .iter()
            .find(|a| a.full_url == "https://api.example.com/user/profile")
            .unwrap();
        assert_eq!(api.base_url, "https://api.example.com");
        assert_eq!(api.base_api_path, "");
        assert_eq!(api.api_path, "/user/profile");
        assert_eq!(api.service_path.as_deref(), Some("/user"));
        assert_eq!(api.http_method, "GET");
        assert_eq!(api.discovery_method, "regex");
        assert_eq!(api.source_js, JS);

        for api in &apis {
            assert_eq!(
                api.full_url,
                build_full_url(&api.base_url, &api.base_api_path, &api.api_path)
            );
        }
    }

    #[test]
    fn test_extraction_is_idempotent_and_order_independent() {
        let a = r#"get('/user/a'); fetch("/order/b"); const base = 'https://x.example.com';"#;
        let b = r#"const base = 'https://x.example.com'; fetch("/order/b"); get('/user/a'); get('/user/a');"#;
        let ex = extractor();
        let set = |src: &str| -> BTreeSet<String> {
            ex.extract(src, PAGE, JS)
                .unwrap()
                .into_iter()
                .map(|d| d.full_url)
                .collect()
        };
        assert_eq!(set(a), set(a));
        assert_eq!(set(a), set(b));

        let apis = ex.extract(a, PAGE, JS).unwrap();
        let unique: BTreeSet<&str> = apis.iter().map(|d| d.full_url.as_str()).collect();
        assert_eq!(unique.len(), apis.len());
    }

    #[test]
    fn test_limit_caps_output() {
        let source: String = (0..50).map(|i| format!("get('/svc{}/item');", i)).collect();
        let apis = extractor().with_limit(10).extract(&source, PAGE, JS).unwrap();
        assert_eq!(apis.len(), 10);
    }

    #[test]
    fn test_limit_keeps_every_base_url() {
        let mut source = String::from("axios.create({ baseURL: 'https://api.example.com' });");
        for i in 0..1200 {
            source.push_str(&format!("axios.get('/svc{}/item');", i));
        }
        let apis = extractor().with_limit(1000).extract(&source, PAGE, JS).unwrap();
        assert_eq!(apis.len(), 1000);

        let on_api_host = apis
            .iter()
            .filter(|a| a.base_url == "https://api.example.com")
            .count();
        let on_page = apis.iter().filter(|a| a.base_url == PAGE).count();
        assert_eq!(on_api_host, 500);
        assert_eq!(on_page, 500);
    }

    #[test]
    fn test_html_body_is_extraction_error() {
        let err = extractor()
            .extract("<!DOCTYPE html><html><body>app</body></html>", PAGE, JS)
            .unwrap_err();
        assert!(matches!(err, ScanError::Extraction { .. }));
        assert!(extractor().extract("   ", PAGE, JS).is_err());
    }

    #[test]
    fn test_enricher_mines_concatenation_and_templates() {
        let source = r#"
            request(API_ROOT + '/account/settings');
            http.get(`${BASE}/user/${uid}/orders`);
        "#;
        let plain = extractor().components(source, PAGE);
        assert!(!plain.api_paths.iter().any(|p| p.contains("orders")));

        let enriched = extractor().with_enricher(Arc::new(ConcatenationEnricher::new().unwrap()));
        let c = enriched.components(source, PAGE);
        assert!(c.api_paths.contains(&"/account/settings".to_string()));
        assert!(c.api_paths.contains(&"/user/{param}/orders".to_string()));

        let apis = enriched.extract(source, PAGE, JS).unwrap();
        assert!(apis.iter().all(|a| a.discovery_method == "regex+ai"));
    }

    #[test]
    fn test_enricher_without_findings_degrades_to_baseline() {
        struct Silent;
        impl Enricher for Silent {
            fn name(&self) -> &'static str {
                "silent"
            }
        }
        let source = "get('/user/list')";
        let baseline = extractor().components(source, PAGE);
        let enriched = extractor().with_enricher(Arc::new(Silent)).components(source, PAGE);
        assert_eq!(baseline, enriched);
    }
}
