//! Groups discovered APIs into inferred backend services.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use regex::Regex;

use crate::models::{ApiDescriptor, JsResource, MicroserviceInfo, SecurityIssue};

/// Names the client-side technologies visible in a script body.
pub trait TechnologyFingerprinter: Send + Sync {
    fn fingerprint(&self, content: &str) -> BTreeSet<String>;
}

const SIGNATURES: &[(&str, &str)] = &[
    ("React", r"react-dom|__REACT_DEVTOOLS_GLOBAL_HOOK__|React\.createElement|data-reactroot"),
    ("Vue.js", r"__VUE__|Vue\.component|Vue\.use\(|data-v-[0-9a-f]{6,}"),
    ("Angular", r"@angular/core|ng-version|platformBrowserDynamic"),
    ("AngularJS", r"angular\.module\("),
    ("jQuery", r"\bjQuery\b"),
    ("axios", r"\baxios\b"),
    ("webpack", r"__webpack_require__|webpackChunk|webpackJsonp"),
    ("Vite", r"import\.meta\.env|/@vite/|__vite_"),
    ("Next.js", r"__NEXT_DATA__|_next/static"),
    ("Nuxt.js", r"__NUXT__|/_nuxt/"),
];

const PATH_HINTS: &[(&str, &str)] = &[
    ("/actuator", "Spring Boot"),
    ("/graphql", "GraphQL"),
    ("/swagger", "Swagger/OpenAPI"),
    ("api-docs", "Swagger/OpenAPI"),
];

/// Regex signature table for common frontend stacks.
pub struct SignatureFingerprinter {
    signatures: Vec<(&'static str, Regex)>,
}

impl SignatureFingerprinter {
    pub fn new() -> Result<Self, regex::Error> {
        let mut signatures = Vec::with_capacity(SIGNATURES.len());
        for (name, pattern) in SIGNATURES {
            signatures.push((*name, Regex::new(pattern)?));
        }
        Ok(Self { signatures })
    }
}

impl TechnologyFingerprinter for SignatureFingerprinter {
    fn fingerprint(&self, content: &str) -> BTreeSet<String> {
        self.signatures
            .iter()
            .filter(|(_, re)| re.is_match(content))
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

/// Backend technologies implied by well-known route names.
pub fn path_hints(api_path: &str) -> BTreeSet<String> {
    let lower = api_path.to_lowercase();
    PATH_HINTS
        .iter()
        .filter(|(needle, _)| lower.contains(needle))
        .map(|(_, tech)| tech.to_string())
        .collect()
}

pub struct MicroserviceAggregator {
    fingerprinter: Arc<dyn TechnologyFingerprinter>,
}

impl MicroserviceAggregator {
    pub fn new(fingerprinter: Arc<dyn TechnologyFingerprinter>) -> Self {
        Self { fingerprinter }
    }

    /// One record per distinct `service_path`, ordered by that path.
    /// Descriptors without a service path are left out.
    pub fn aggregate(&self, apis: &[ApiDescriptor], resources: &[JsResource]) -> Vec<MicroserviceInfo> {
        let mut groups: BTreeMap<&str, Vec<&ApiDescriptor>> = BTreeMap::new();
        for api in apis {
            if let Some(ref service_path) = api.service_path {
                groups.entry(service_path.as_str()).or_default().push(api);
            }
        }

        let content_by_url: HashMap<&str, &str> = resources
            .iter()
            .map(|r| (r.url.as_str(), &*r.content))
            .collect();
        let mut fingerprints: HashMap<&str, BTreeSet<String>> = HashMap::new();

        groups
            .into_iter()
            .map(|(service_path, members)| {
                let base_url = dominant_base_url(&members);

                let mut technologies = BTreeSet::new();
                for api in &members {
                    let source = api.source_js.as_str();
                    let found = fingerprints.entry(source).or_insert_with(|| {
                        content_by_url
                            .get(source)
                            .map(|content| self.fingerprinter.fingerprint(content))
                            .unwrap_or_default()
                    });
                    technologies.extend(found.iter().cloned());
                    technologies.extend(path_hints(&api.api_path));
                }

                let unique_paths: BTreeSet<&str> = members.iter().map(|a| a.api_path.as_str()).collect();

                MicroserviceInfo {
                    service_full_path: format!("{}{}", base_url, service_path),
                    base_url,
                    service_name: service_path.trim_start_matches('/').to_string(),
                    total_endpoints: members.len(),
                    unique_paths: unique_paths.into_iter().map(str::to_string).collect(),
                    detected_technologies: technologies.into_iter().collect(),
                    has_vulnerabilities: false,
                    vulnerability_details: Vec::new(),
                }
            })
            .collect()
    }
}

/// Most frequent base URL among the members; ties go to the smallest string.
fn dominant_base_url(members: &[&ApiDescriptor]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for api in members {
        *counts.entry(api.base_url.as_str()).or_insert(0) += 1;
    }
    // BTreeMap iterates ascending, so keep the first maximum
    let mut best: Option<(&str, usize)> = None;
    for (url, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((url, count));
        }
    }
    best.map(|(url, _)| url.to_string()).unwrap_or_default()
}

/// Links issues back to the services whose endpoints they target.
pub fn annotate_vulnerabilities(
    services: &mut [MicroserviceInfo],
    apis: &[ApiDescriptor],
    issues: &[SecurityIssue],
) {
    let service_of: HashMap<&str, &str> = apis
        .iter()
        .filter_map(|a| a.service_path.as_deref().map(|sp| (a.full_url.as_str(), sp)))
        .collect();

    let mut details: HashMap<String, BTreeSet<String>> = HashMap::new();
    for issue in issues {
        let Some(target) = issue.target_api.as_deref() else {
            continue;
        };
        if let Some(service_path) = service_of.get(target) {
            details
                .entry(service_path.trim_start_matches('/').to_string())
                .or_default()
                .insert(issue.title.clone());
        }
    }

    for service in services.iter_mut() {
        if let Some(titles) = details.remove(&service.service_name) {
            service.has_vulnerabilities = true;
            service.vulnerability_details = titles.into_iter().collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{IssueType, Severity};
    use crate::modules::api_extractor::{build_full_url, service_path_of};

    fn api(base: &str, path: &str, source: &str) -> ApiDescriptor {
        ApiDescriptor {
            base_url: base.to_string(),
            base_api_path: String::new(),
            service_path: service_path_of(path),
            api_path: path.to_string(),
            full_url: build_full_url(base, "", path),
            http_method: "GET".to_string(),
            discovery_method: "regex".to_string(),
            source_js: source.to_string(),
        }
    }

    fn aggregator() -> MicroserviceAggregator {
        MicroserviceAggregator::new(Arc::new(SignatureFingerprinter::new().unwrap()))
    }

    #[test]
    fn test_groups_by_service_path() {
        let apis = vec![
            api("https://a.com", "/user/info", "https://a.com/app.js"),
            api("https://a.com", "/user/list", "https://a.com/app.js"),
            api("https://b.com", "/user/info", "https://a.com/app.js"),
            api("https://a.com", "/order/create", "https://a.com/app.js"),
        ];
        let services = aggregator().aggregate(&apis, &[]);
        assert_eq!(services.len(), 2);

        let order = &services[0];
        assert_eq!(order.service_name, "order");
        assert_eq!(order.total_endpoints, 1);

        let user = &services[1];
        assert_eq!(user.service_name, "user");
        assert_eq!(user.base_url, "https://a.com");
        assert_eq!(user.service_full_path, "https://a.com/user");
        assert_eq!(user.total_endpoints, 3);
        assert_eq!(user.unique_paths, vec!["/user/info", "/user/list"]);
        assert!(!user.has_vulnerabilities);
    }

    #[test]
    fn test_base_url_tie_breaks_lexicographically() {
        let apis = vec![
            api("https://z.com", "/pay/a", "x.js"),
            api("https://m.com", "/pay/b", "x.js"),
        ];
        let services = aggregator().aggregate(&apis, &[]);
        assert_eq!(services[0].base_url, "https://m.com");
    }

    #[test]
    fn test_root_path_is_not_grouped() {
        let mut root = api("https://a.com", "/", "x.js");
        root.service_path = None;
        assert!(aggregator().aggregate(&[root], &[]).is_empty());
    }

    #[test]
    fn test_technologies_from_source_and_paths() {
        let js = JsResource::new(
            "https://a.com/app.js",
            crate::models::ExtractionMethod::StaticTag,
            "var x = __webpack_require__(1); axios.get('/manage/x'); ReactDOM; require('react-dom')".to_string(),
        );
        let apis = vec![
            api("https://a.com", "/manage/actuator/health", "https://a.com/app.js"),
            api("https://a.com", "/manage/graphql", "https://a.com/app.js"),
        ];
        let services = aggregator().aggregate(&apis, &[js]);
        assert_eq!(
            services[0].detected_technologies,
            vec!["GraphQL", "React", "Spring Boot", "axios", "webpack"]
        );
    }

    #[test]
    fn test_path_hints() {
        assert!(path_hints("/v2/api-docs").contains("Swagger/OpenAPI"));
        assert!(path_hints("/swagger-ui/index").contains("Swagger/OpenAPI"));
        assert!(path_hints("/user/info").is_empty());
    }

    #[test]
    fn test_annotate_vulnerabilities() {
        let apis = vec![
            api("https://a.com", "/user/info", "x.js"),
            api("https://a.com", "/order/list", "x.js"),
        ];
        let mut services = aggregator().aggregate(&apis, &[]);
        let issue = SecurityIssue {
            title: "Unauthenticated API access".to_string(),
            description: String::new(),
            issue_type: IssueType::UnauthorizedAccess,
            severity: Severity::High,
            target_url: "https://a.com/user/info".to_string(),
            target_api: Some("https://a.com/user/info".to_string()),
            evidence: String::new(),
            remediation: String::new(),
        };
        annotate_vulnerabilities(&mut services, &apis, &[issue]);

        let user = services.iter().find(|s| s.service_name == "user").unwrap();
        assert!(user.has_vulnerabilities);
        assert_eq!(user.vulnerability_details, vec!["Unauthenticated API access"]);
        let order = services.iter().find(|s| s.service_name == "order").unwrap();
        assert!(!order.has_vulnerabilities);
    }
}
