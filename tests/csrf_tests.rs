//! Anti-forgery checks on state-changing routes.

mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use common::*;
use tollgate::csrf::{CSRF_HEADER, XSRF_HEADER};
use tower::ServiceExt;

const PROFILE: &str = "/api/v1/user/profile";
const LOGOUT: &str = "/api/v1/user/logout";
const SYNC_TOKEN: &str = "/api/v1/user/sync-token";

fn logout_request(cookie: &str, header: Option<(&str, &str)>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(LOGOUT)
        .header("cookie", cookie);
    if let Some((name, value)) = header {
        builder = builder.header(name, value);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_missing_sync_token_is_rejected() {
    let app = create_test_app().await;
    create_user(&app, "alice", "alice@example.com").await;
    let session = login(&app, "alice@example.com").await;

    let response = app
        .app
        .clone()
        .oneshot(logout_request(&session.cookie_header(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(extract_set_cookies(&response).is_empty());
    assert_eq!(body_json(response).await["code"], "csrf_missing");
}

#[tokio::test]
async fn test_wrong_sync_token_is_rejected() {
    let app = create_test_app().await;
    create_user(&app, "alice", "alice@example.com").await;
    let session = login(&app, "alice@example.com").await;

    // Valid token, but for a different anti-forgery session
    let foreign = app.sync.issue("some-other-session");

    let response = app
        .app
        .clone()
        .oneshot(logout_request(
            &session.cookie_header(),
            Some((CSRF_HEADER, foreign.as_str())),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "csrf_mismatch");
}

#[tokio::test]
async fn test_token_without_csrf_cookie_is_rejected() {
    let app = create_test_app().await;
    create_user(&app, "alice", "alice@example.com").await;
    let session = login(&app, "alice@example.com").await;

    let cookie = format!(
        "access_token={}; refresh_token={}",
        session.access, session.refresh
    );
    let response = app
        .app
        .clone()
        .oneshot(logout_request(&cookie, Some((CSRF_HEADER, session.sync_token.as_str()))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "csrf_mismatch");
}

#[tokio::test]
async fn test_alternate_header_name_is_accepted() {
    let app = create_test_app().await;
    create_user(&app, "alice", "alice@example.com").await;
    let session = login(&app, "alice@example.com").await;

    let response = app
        .app
        .clone()
        .oneshot(logout_request(
            &session.cookie_header(),
            Some((XSRF_HEADER, session.sync_token.as_str())),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_sync_token_checked_before_bearer() {
    let app = create_test_app().await;
    let uuid = create_user(&app, "alice", "alice@example.com").await;
    let session = login(&app, "alice@example.com").await;
    let stale = session.with_access(&expired_bearer(&app, &uuid));

    let request = json_request(
        "PUT",
        PROFILE,
        Some(&stale.cookie_header()),
        serde_json::json!({ "name": "alicia" }),
    );
    let response = app.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "csrf_missing");
}

#[tokio::test]
async fn test_safe_methods_skip_check() {
    let app = create_test_app().await;
    create_user(&app, "alice", "alice@example.com").await;
    let session = login(&app, "alice@example.com").await;

    let response = app
        .app
        .clone()
        .oneshot(empty_request("GET", PROFILE, Some(&session.cookie_header())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_is_exempt() {
    let app = create_test_app().await;
    create_user(&app, "alice", "alice@example.com").await;
    let session = login(&app, "alice@example.com").await;

    let response = app
        .app
        .clone()
        .oneshot(empty_request(
            "POST",
            "/api/v1/user/refresh",
            Some(&session.cookie_header()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_sync_token_starts_session_when_absent() {
    let app = create_test_app().await;

    let response = app
        .app
        .clone()
        .oneshot(empty_request("GET", SYNC_TOKEN, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    let csrf_session = set_cookie_value(&cookies, "csrf_session").unwrap();
    assert!(!cookies[0].contains("Max-Age"), "Anti-forgery cookie lives for the browser session");

    let body = body_json(response).await;
    let token = body["syncToken"].as_str().unwrap();
    assert!(app.sync.validate(Some(&csrf_session), Some(token)).is_ok());
}

#[tokio::test]
async fn test_sync_token_reuses_existing_session() {
    let app = create_test_app().await;
    create_user(&app, "alice", "alice@example.com").await;
    let session = login(&app, "alice@example.com").await;

    let response = app
        .app
        .clone()
        .oneshot(empty_request(
            "GET",
            SYNC_TOKEN,
            Some(&format!("csrf_session={}", session.csrf_session)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(extract_set_cookies(&response).is_empty());

    let body = body_json(response).await;
    let token = body["syncToken"].as_str().unwrap().to_string();
    assert_ne!(token, session.sync_token);

    // Either token works for the session
    let response = app
        .app
        .clone()
        .oneshot(logout_request(
            &session.cookie_header(),
            Some((CSRF_HEADER, token.as_str())),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_starts_new_csrf_session() {
    let app = create_test_app().await;
    create_user(&app, "alice", "alice@example.com").await;

    let first = login(&app, "alice@example.com").await;
    let second = login(&app, "alice@example.com").await;
    assert_ne!(first.csrf_session, second.csrf_session);

    // Sync token from the first login does not fit the second session
    let mixed = LoggedIn {
        sync_token: first.sync_token.clone(),
        ..second.clone()
    };
    let response = app
        .app
        .clone()
        .oneshot(session_request("POST", LOGOUT, &mixed, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
