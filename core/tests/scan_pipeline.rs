use std::time::Duration;

use apiscope_core::error::ErrorKind;
use apiscope_core::{scan, IssueType, ScanConfig, ScanPhase, ScanStatus};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Local mock servers live on 127.0.0.1, and nothing here should reach the
/// real hosts that appear in script bodies.
fn local_config() -> ScanConfig {
    ScanConfig {
        allow_internal: true,
        enable_unauthorized_check: false,
        request_timeout: 2,
        timeout: 30,
        ..ScanConfig::default()
    }
}

async fn serve(server: &MockServer, route: &str, body: &str, content_type: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, content_type))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_end_to_end_discovers_configured_api() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        r#"<html><head><script src="/static/js/app.a1b2c3d4.js"></script></head></html>"#,
        "text/html",
    )
    .await;
    serve(
        &server,
        "/static/js/app.a1b2c3d4.js",
        "const http = axios.create({ baseURL: 'https://api.example.com' }); axios.get('/user/profile');",
        "application/javascript",
    )
    .await;

    let result = scan(&format!("{}/", server.uri()), &local_config()).await;

    assert_eq!(result.status, ScanStatus::Completed);
    assert_eq!(result.phase, Some(ScanPhase::Finalize));
    assert_eq!(result.statistics.total_js_files, 1);
    assert_eq!(result.js_resources[0].file_name, "app.a1b2c3d4.js");
    assert_eq!(result.js_resources[0].content_hash.len(), 64);

    let api = result
        .apis
        .iter()
        .find(|a| a.full_url == "https://api.example.com/user/profile")
        .expect("configured base URL should be composed with the axios path");
    assert_eq!(api.service_path.as_deref(), Some("/user"));
    assert!(api.source_js.ends_with("/static/js/app.a1b2c3d4.js"));

    assert!(result.apis.iter().any(|a| a.full_url == format!("{}/user/profile", server.uri())));
    assert!(result.microservices.iter().any(|s| s.service_name == "user"));
    assert!(result.end_time.is_some());
}

#[tokio::test]
async fn test_one_slow_script_is_skipped() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        r#"<script src="/js/a.js"></script><script src="/js/b.js"></script><script src="/js/c.js"></script>"#,
        "text/html",
    )
    .await;
    serve(&server, "/js/a.js", "get('/user/list')", "application/javascript").await;
    serve(&server, "/js/b.js", "get('/order/list')", "application/javascript").await;
    Mock::given(method("GET"))
        .and(path("/js/c.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("get('/slow/list')")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = ScanConfig {
        request_timeout: 1,
        ..local_config()
    };
    let result = scan(&format!("{}/", server.uri()), &config).await;

    assert_eq!(result.status, ScanStatus::Completed);
    assert_eq!(result.statistics.total_js_files, 2);
    assert_eq!(result.failures.len(), 1);
    assert!(result.failures[0].url.ends_with("/js/c.js"));
    assert_eq!(result.failures[0].kind, ErrorKind::Fetch);
    assert!(!result.apis.iter().any(|a| a.api_path == "/slow/list"));
}

#[tokio::test]
async fn test_overall_timeout_fails_scan() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let config = ScanConfig {
        timeout: 1,
        request_timeout: 60,
        ..local_config()
    };
    let result = scan(&format!("{}/", server.uri()), &config).await;

    assert_eq!(result.status, ScanStatus::Failed);
    let error = result.error.expect("timeout should be recorded");
    assert_eq!(error.kind, ErrorKind::Timeout);
    assert_eq!(error.phase, Some(ScanPhase::FetchSeed));
    assert!(result.error_message.is_some());
}

#[tokio::test]
async fn test_internal_target_is_rejected_without_traffic() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = ScanConfig {
        allow_internal: false,
        ..local_config()
    };
    let result = scan(&format!("{}/", server.uri()), &config).await;

    assert_eq!(result.status, ScanStatus::Failed);
    assert_eq!(result.phase, None);
    assert_eq!(result.error.unwrap().kind, ErrorKind::Validation);
    assert!(result.js_resources.is_empty());
    assert!(result.apis.is_empty());
}

#[tokio::test]
async fn test_script_cap_is_hard() {
    let server = MockServer::start().await;
    let html: String = (0..150)
        .map(|i| format!(r#"<script src="/js/file{}.js"></script>"#, i))
        .collect();
    serve(&server, "/", &html, "text/html").await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/js/file\d+\.js$"))
        .respond_with(ResponseTemplate::new(200).set_body_string("var x = 1;"))
        .mount(&server)
        .await;

    let result = scan(&format!("{}/", server.uri()), &local_config()).await;

    assert_eq!(result.status, ScanStatus::Completed);
    assert_eq!(result.statistics.total_js_files, 100);
    assert_eq!(server.received_requests().await.unwrap().len(), 101);
}

#[tokio::test]
async fn test_issues_are_detected_and_linked_to_services() {
    let server = MockServer::start().await;
    serve(&server, "/", r#"<script src="/static/js/main.js"></script>"#, "text/html").await;
    serve(
        &server,
        "/static/js/main.js",
        "var password = window.cfg; fetch('/api/users');",
        "application/javascript",
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 1, "name": "alice"}])))
        .mount(&server)
        .await;

    let config = ScanConfig {
        enable_unauthorized_check: true,
        ..local_config()
    };
    let result = scan(&format!("{}/", server.uri()), &config).await;
    assert_eq!(result.status, ScanStatus::Completed);

    let leak = result
        .security_issues
        .iter()
        .find(|i| i.issue_type == IssueType::SensitiveDataLeak)
        .expect("password keyword should be flagged");
    assert!(leak.evidence.contains("password"));

    let target = format!("{}/api/users", server.uri());
    let open = result
        .security_issues
        .iter()
        .find(|i| i.issue_type == IssueType::UnauthorizedAccess)
        .expect("anonymous JSON endpoint should be flagged");
    assert_eq!(open.target_api.as_deref(), Some(target.as_str()));

    let service = result.microservices.iter().find(|s| s.service_name == "api").unwrap();
    assert!(service.has_vulnerabilities);
    assert!(service
        .vulnerability_details
        .contains(&"Unauthenticated API access".to_string()));
}

#[tokio::test]
async fn test_protected_endpoints_do_not_slow_the_scan() {
    let server = MockServer::start().await;
    serve(&server, "/", r#"<script src="/static/js/main.js"></script>"#, "text/html").await;
    let calls: String = (0..20).map(|i| format!("fetch('/api/item{}');", i)).collect();
    serve(&server, "/static/js/main.js", &calls, "application/javascript").await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let config = ScanConfig {
        enable_unauthorized_check: true,
        concurrency: 1,
        timeout: 5,
        ..local_config()
    };
    let result = scan(&format!("{}/", server.uri()), &config).await;

    assert_eq!(result.status, ScanStatus::Completed);
    assert!(result.apis.len() >= 20);
    assert!(!result
        .security_issues
        .iter()
        .any(|i| i.issue_type == IssueType::UnauthorizedAccess));
}
