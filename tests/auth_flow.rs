mod support;

use axum::http::{Method, StatusCode};
use quire_api_types::{TokenResponse, UserResponse};
use serde_json::json;

use support::{PASSWORD, TestApp, read_as, read_json};

fn reset_token_from(body: &str) -> String {
    let start = body.find("token=").expect("token in link") + "token=".len();
    body[start..]
        .split_whitespace()
        .next()
        .expect("token value")
        .to_string()
}

#[tokio::test]
async fn register_login_and_read_current_user() {
    let app = TestApp::new();

    let created = app.register("Ada@Example.com", "ada").await;
    assert_eq!(created["email"], "ada@example.com");
    assert_eq!(created["role"], "user");
    assert!(created.get("hashed_password").is_none());

    let response = app.login_raw("ada@example.com", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let tokens: TokenResponse = read_as(response).await;
    assert_eq!(tokens.token_type, "bearer");
    assert_eq!(tokens.expires_in, 30 * 60);
    assert_ne!(tokens.access_token, tokens.refresh_token);

    let (status, me) = app
        .json(Method::GET, "/api/v1/auth/me", Some(&tokens.access_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let me: UserResponse = serde_json::from_value(me).expect("user");
    assert_eq!(me.username, "ada");
    assert!(me.last_login.is_some());
}

#[tokio::test]
async fn registration_rejects_duplicates_and_bad_input() {
    let app = TestApp::new();
    app.register("ada@example.com", "ada").await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "email": "ADA@example.com",
                "username": "someone",
                "password": PASSWORD,
                "confirm_password": PASSWORD,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "User with the email already exists");

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "email": "grace@example.com",
                "username": "ada",
                "password": PASSWORD,
                "confirm_password": PASSWORD,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Username is already taken");

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "email": "not-an-email",
                "username": "grace",
                "password": "short",
                "confirm_password": "different",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
    let fields: Vec<&str> = body["error"]["errors"]
        .as_array()
        .expect("field errors")
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"password"));
    assert!(fields.contains(&"confirm_password"));
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let app = TestApp::new();
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/register")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{\"email\": "))
        .expect("request");
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn wrong_password_and_inactive_accounts_cannot_log_in() {
    let app = TestApp::new();
    let user = app.register("ada@example.com", "ada").await;

    let response = app.login_raw("ada@example.com", "wrong password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok()),
        Some("Bearer")
    );

    let response = app.login_raw("nobody@example.com", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.repos.deactivate(user["id"].as_i64().expect("id")).await;
    let response = app.login_raw("ada@example.com", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"]["message"], "Inactive user");
}

#[tokio::test]
async fn protected_routes_require_a_valid_bearer_token() {
    let app = TestApp::new();

    let (status, body) = app.json(Method::GET, "/api/v1/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _) = app
        .json(Method::GET, "/api/v1/auth/me", Some("not.a.jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.register("ada@example.com", "ada").await;
    let (_, refresh) = app.login("ada@example.com").await;
    let (status, _) = app
        .json(Method::GET, "/api/v1/auth/me", Some(&refresh), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "refresh tokens are not access tokens");
}

#[tokio::test]
async fn logout_revokes_the_access_token_and_refresh_token() {
    let app = TestApp::new();
    app.register("ada@example.com", "ada").await;
    let (access, refresh) = app.login("ada@example.com").await;

    let (status, body) = app
        .json(Method::POST, "/api/v1/auth/logout", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Successfully logged out");

    let (status, body) = app
        .json(Method::GET, "/api/v1/auth/me", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Token has been revoked");

    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/verify",
            None,
            Some(json!({ "token": access })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "Token has been revoked");
}

#[tokio::test]
async fn refresh_rotates_the_stored_token() {
    let app = TestApp::new();
    app.register("ada@example.com", "ada").await;
    let (_, first_refresh) = app.login("ada@example.com").await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": first_refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let rotated: TokenResponse = serde_json::from_value(body).expect("tokens");

    let (status, _) = app
        .json(Method::GET, "/api/v1/auth/me", Some(&rotated.access_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": first_refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid refresh token");

    // Replaying the old token also retires the one it was exchanged for.
    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": rotated.refresh_token })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn concurrent_refreshes_with_one_token_yield_one_pair() {
    let app = TestApp::new();
    app.register("ada@example.com", "ada").await;
    let (_, refresh) = app.login("ada@example.com").await;
    let body = json!({ "refresh_token": refresh });

    let (first, second) = tokio::join!(
        app.json(Method::POST, "/api/v1/auth/refresh", None, Some(body.clone())),
        app.json(Method::POST, "/api/v1/auth/refresh", None, Some(body.clone())),
    );
    let mut statuses = [first.0, second.0];
    statuses.sort_by_key(|status| status.as_u16());
    assert_eq!(statuses, [StatusCode::OK, StatusCode::UNAUTHORIZED]);
}

#[tokio::test]
async fn verify_reports_claims_for_live_tokens() {
    let app = TestApp::new();
    app.register("ada@example.com", "ada").await;
    let (access, _) = app.login("ada@example.com").await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/verify",
            None,
            Some(json!({ "token": access })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["payload"]["sub"], "ada@example.com");
    assert_eq!(body["payload"]["type"], "access");

    let (_, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/verify",
            None,
            Some(json!({ "token": "garbage" })),
        )
        .await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn update_me_changes_profile_fields() {
    let app = TestApp::new();
    let (_, access) = app.signed_in("ada@example.com", "ada").await;

    let (status, body) = app
        .json(
            Method::PATCH,
            "/api/v1/auth/me",
            Some(&access),
            Some(json!({
                "full_name": "Ada Lovelace",
                "website": "https://ada.example.com",
                "company": "Analytical Engines",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["full_name"], "Ada Lovelace");
    assert_eq!(body["profile"]["company"], "Analytical Engines");

    let (status, body) = app
        .json(
            Method::PATCH,
            "/api/v1/auth/me",
            Some(&access),
            Some(json!({ "website": "ftp://nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["errors"][0]["field"], "website");
}

#[tokio::test]
async fn password_reset_flow_invalidates_old_sessions() {
    let app = TestApp::new();
    app.register("ada@example.com", "ada").await;
    let (old_access, _) = app.login("ada@example.com").await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/password/reset-request",
            None,
            Some(json!({ "email": "ada@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "If the email exists, a password reset link has been sent"
    );
    assert!(body.get("token").is_none());

    let sent = app.mailer.sent().await;
    let reset = sent
        .iter()
        .find(|m| m.subject.contains("Reset"))
        .expect("reset email");
    assert_eq!(reset.to, "ada@example.com");
    let token = reset_token_from(&reset.body);

    let new_password = "an entirely new secret";
    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/password/reset",
            None,
            Some(json!({
                "token": token,
                "new_password": new_password,
                "confirm_password": "not the same secret",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["errors"][0]["field"], "confirm_password");

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/password/reset",
            None,
            Some(json!({
                "token": token,
                "new_password": new_password,
                "confirm_password": new_password,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Password has been reset successfully");

    let (status, _) = app
        .json(Method::GET, "/api/v1/auth/me", Some(&old_access), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = app.login_raw("ada@example.com", PASSWORD).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.login_raw("ada@example.com", new_password).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/password/reset",
            None,
            Some(json!({
                "token": token,
                "new_password": new_password,
                "confirm_password": new_password,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "reset tokens are single use");
    assert_eq!(body["error"]["message"], "Invalid or expired reset token");
}

#[tokio::test]
async fn reset_request_for_unknown_email_looks_identical() {
    let app = TestApp::new();

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/auth/password/reset-request",
            None,
            Some(json!({ "email": "ghost@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "If the email exists, a password reset link has been sent"
    );
    assert!(app.mailer.sent().await.is_empty());
}
