//! Upstream and GitLab CI backends against mock HTTP servers

mod common;

use common::{anonymous_request, basic_header, basic_request, with_client_addr};
use reauth::backends::{TokenProbe, UpstreamProbe};
use reauth::{Authenticator, ProviderError};
use serde_json::json;
use std::time::Duration;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

async fn upstream(config: serde_json::Value) -> UpstreamProbe {
    let probe: UpstreamProbe = serde_json::from_value(config).expect("valid upstream config");
    probe.validate().await.expect("upstream validates");
    probe
}

async fn gitlab(server: &MockServer) -> TokenProbe {
    let probe = TokenProbe::new(Url::parse(&format!("{}/", server.uri())).unwrap());
    probe.validate().await.expect("gitlab validates");
    probe
}

#[tokio::test]
async fn test_upstream_accepts_on_200() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth"))
        .and(header("authorization", basic_header("alice", "secret").as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let probe = upstream(json!({"url": format!("{}/auth", server.uri())})).await;
    let identity = probe
        .authenticate(&basic_request("alice", "secret"))
        .await
        .unwrap();

    assert_eq!(identity.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_upstream_rejection_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let probe = upstream(json!({"url": format!("{}/auth", server.uri())})).await;
    let identity = probe
        .authenticate(&basic_request("alice", "wrong"))
        .await
        .unwrap();

    assert_eq!(identity, None);
}

#[tokio::test]
async fn test_upstream_skipped_without_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let probe = upstream(json!({"url": format!("{}/auth", server.uri())})).await;
    assert_eq!(probe.authenticate(&anonymous_request()).await.unwrap(), None);
}

#[tokio::test]
async fn test_upstream_forwards_request_context() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth"))
        .and(header("x-auth-url", "/private/report?year=2024"))
        .and(header("x-auth-method", "GET"))
        .and(header("x-auth-ip", "10.0.0.7:51234"))
        .and(header("x-auth-header-x-request-id", "req-42"))
        .and(header("cookie", "session=abc123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let probe = upstream(json!({
        "url": format!("{}/auth", server.uri()),
        "pass_cookies": true,
        "forward": {
            "url": true,
            "method": true,
            "ip": true,
            "headers": ["X-Request-Id", "X-Not-Sent"]
        }
    }))
    .await;

    let mut parts = with_client_addr(basic_request("alice", "secret"), "10.0.0.7:51234");
    parts
        .headers
        .insert("x-request-id", http::HeaderValue::from_static("req-42"));
    parts
        .headers
        .insert(http::header::COOKIE, http::HeaderValue::from_static("session=abc123"));

    let identity = probe.authenticate(&parts).await.unwrap();
    assert_eq!(identity.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_upstream_does_not_follow_redirects_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", format!("{}/ok", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let probe = upstream(json!({"url": format!("{}/auth", server.uri())})).await;
    let identity = probe
        .authenticate(&basic_request("alice", "secret"))
        .await
        .unwrap();

    assert_eq!(identity, None);
}

#[tokio::test]
async fn test_upstream_match_vetoes_login_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/login", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let following = upstream(json!({
        "url": format!("{}/auth", server.uri()),
        "follow_redirects": true
    }))
    .await;
    assert_eq!(
        following
            .authenticate(&basic_request("alice", "secret"))
            .await
            .unwrap()
            .as_deref(),
        Some("alice")
    );

    let vetoing = upstream(json!({
        "url": format!("{}/auth", server.uri()),
        "follow_redirects": true,
        "match": "/login$"
    }))
    .await;
    assert_eq!(
        vetoing
            .authenticate(&basic_request("alice", "secret"))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_upstream_timeout_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let probe = upstream(json!({
        "url": format!("{}/auth", server.uri()),
        "timeout": "100ms"
    }))
    .await;

    let err = probe
        .authenticate(&basic_request("alice", "secret"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Http(_)), "{err:?}");
}

#[tokio::test]
async fn test_gitlab_token_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/group/project.git/info/refs"))
        .and(query_param("service", "git-upload-pack"))
        .and(header(
            "authorization",
            basic_header("gitlab-ci-token", "job-token").as_str(),
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let probe = gitlab(&server).await;
    let identity = probe
        .authenticate(&basic_request("group/project", "job-token"))
        .await
        .unwrap();

    assert_eq!(identity.as_deref(), Some("group/project"));
}

#[tokio::test]
async fn test_gitlab_denials_are_not_errors() {
    for status in [401, 403, 404] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let probe = gitlab(&server).await;
        let identity = probe
            .authenticate(&basic_request("group/project", "expired"))
            .await
            .unwrap();
        assert_eq!(identity, None, "status {status}");
    }
}

#[tokio::test]
async fn test_gitlab_unexpected_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let probe = gitlab(&server).await;
    let err = probe
        .authenticate(&basic_request("group/project", "job-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::UnexpectedStatus(500)), "{err:?}");
}

#[tokio::test]
async fn test_gitlab_never_follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/group/project.git/info/refs"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", format!("{}/elsewhere", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let probe = gitlab(&server).await;
    let err = probe
        .authenticate(&basic_request("group/project", "job-token"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::UnexpectedStatus(302)), "{err:?}");
}

#[tokio::test]
async fn test_gitlab_custom_username() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header(
            "authorization",
            basic_header("deploy-bot", "job-token").as_str(),
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut probe = TokenProbe::new(Url::parse(&format!("{}/", server.uri())).unwrap());
    probe.username = "deploy-bot".to_string();
    probe.validate().await.unwrap();

    let identity = probe
        .authenticate(&basic_request("group/project", "job-token"))
        .await
        .unwrap();
    assert_eq!(identity.as_deref(), Some("group/project"));
}
