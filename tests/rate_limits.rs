mod support;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use quire::infra::http::TierLimits;
use serde_json::json;

use support::{TestApp, TestOptions, read_json};

fn limited(auth: u32, strict: u32, api: u32) -> TestApp {
    TestApp::with_options(TestOptions {
        rate_limit: true,
        limits: TierLimits { auth, strict, api },
        cache: true,
    })
}

fn from_client(uri: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn login_attempts_are_limited_per_client() {
    let app = limited(2, 10, 100);
    app.register("ada@example.com", "ada").await;

    for _ in 0..2 {
        let response = app.login_raw("ada@example.com", "wrong password").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app.login_raw("ada@example.com", "wrong password").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("retry-after header");
    assert!((1..=60).contains(&retry_after));
}

#[tokio::test]
async fn allowance_is_reported_in_headers() {
    let app = limited(5, 10, 3);

    let response = app.send(from_client("/api/v1/categories", "198.51.100.7")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-ratelimit-limit")
            .and_then(|v| v.to_str().ok()),
        Some("3")
    );
    assert_eq!(
        response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok()),
        Some("2")
    );
}

#[tokio::test]
async fn clients_and_paths_have_separate_windows() {
    let app = limited(5, 10, 1);

    let first = app.send(from_client("/api/v1/categories", "198.51.100.7")).await;
    assert_eq!(first.status(), StatusCode::OK);
    let again = app.send(from_client("/api/v1/categories", "198.51.100.7")).await;
    assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);

    let other_client = app.send(from_client("/api/v1/categories", "198.51.100.8")).await;
    assert_eq!(other_client.status(), StatusCode::OK);
    let other_path = app.send(from_client("/api/v1/posts", "198.51.100.7")).await;
    assert_eq!(other_path.status(), StatusCode::OK);
}

#[tokio::test]
async fn password_reset_uses_the_strict_tier() {
    let app = limited(100, 1, 100);
    let body = json!({ "email": "ghost@example.com" });

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/auth/password/reset-request",
            None,
            Some(body.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/auth/password/reset-request",
            None,
            Some(body),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn health_is_not_rate_limited_and_reports_dependencies() {
    let app = limited(1, 1, 1);

    for _ in 0..3 {
        let response = app
            .send(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = read_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "healthy");
        assert_eq!(body["cache"], "healthy");
    }

    app.repos.set_database_down(true);
    let response = app
        .send(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "unhealthy");
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let app = TestApp::new();
    let response = app
        .send(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/v1/posts")
                .header(header::ORIGIN, "https://blog.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("https://blog.example.com")
    );
}
