#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use serde_json::Value;
use tollgate::{
    ServerConfig, create_app,
    csrf::{CSRF_HEADER, Synchronizer},
    db::Database,
    hasher::{HashCost, SecretHasher},
    jwt::JwtConfig,
};
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough!!";
pub const PASSWORD: &str = "correct horse battery";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub jwt: JwtConfig,
    pub sync: Synchronizer,
    pub hasher: SecretHasher,
}

pub fn test_hasher() -> SecretHasher {
    SecretHasher::new(HashCost::minimal()).unwrap()
}

pub fn test_config(db: Database, bearer_ttl_secs: u64, rate_limit: bool) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: JWT_SECRET.to_vec(),
        bearer_ttl_secs,
        refresh_ttl_secs: 7 * 24 * 60 * 60,
        hasher: test_hasher(),
        secure_cookies: false,
        rate_limit,
        trust_forwarded_for: true,
    }
}

pub async fn create_test_app() -> TestApp {
    build_test_app(false).await
}

pub async fn create_rate_limited_app() -> TestApp {
    build_test_app(true).await
}

async fn build_test_app(rate_limit: bool) -> TestApp {
    let db = Database::open(":memory:").await.unwrap();
    let config = test_config(db.clone(), 300, rate_limit);
    let app = create_app(&config);

    TestApp {
        app,
        db,
        jwt: JwtConfig::new(JWT_SECRET).with_bearer_duration(300),
        sync: Synchronizer::from_jwt_secret(JWT_SECRET),
        hasher: config.hasher,
    }
}

/// Insert a user directly, bypassing registration. Returns the uuid.
pub async fn create_user(app: &TestApp, name: &str, email: &str) -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    let hash = app.hasher.hash(PASSWORD).unwrap();
    app.db
        .users()
        .create(&uuid, name, email, &hash)
        .await
        .unwrap();
    uuid
}

/// Cookies and sync token handed out by one login.
#[derive(Debug, Clone)]
pub struct LoggedIn {
    pub access: String,
    pub refresh: String,
    pub csrf_session: String,
    pub sync_token: String,
}

impl LoggedIn {
    pub fn cookie_header(&self) -> String {
        format!(
            "access_token={}; refresh_token={}; csrf_session={}",
            self.access, self.refresh, self.csrf_session
        )
    }

    /// Same session, different bearer.
    pub fn with_access(&self, access: &str) -> Self {
        Self {
            access: access.to_string(),
            ..self.clone()
        }
    }

    /// Apply the cookies set by a refresh response.
    pub fn rotated(&self, set_cookies: &[String]) -> Self {
        Self {
            access: set_cookie_value(set_cookies, "access_token").unwrap(),
            refresh: set_cookie_value(set_cookies, "refresh_token").unwrap(),
            ..self.clone()
        }
    }
}

pub async fn login(app: &TestApp, email: &str) -> LoggedIn {
    let response = app
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/user/login",
            None,
            serde_json::json!({ "email": email, "password": PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200, "login failed");

    let cookies = extract_set_cookies(&response);
    let body = body_json(response).await;

    LoggedIn {
        access: set_cookie_value(&cookies, "access_token").unwrap(),
        refresh: set_cookie_value(&cookies, "refresh_token").unwrap(),
        csrf_session: set_cookie_value(&cookies, "csrf_session").unwrap(),
        sync_token: body["syncToken"].as_str().unwrap().to_string(),
    }
}

pub fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Request carrying the session's cookies and, for state-changing methods,
/// its sync token.
pub fn session_request(method: &str, uri: &str, session: &LoggedIn, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("cookie", session.cookie_header())
        .header(CSRF_HEADER, &session.sync_token);

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => {
            builder = builder.header("content-length", "0");
            builder.body(Body::empty()).unwrap()
        }
    }
}

pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(String::from)
        .collect()
}

/// Value of a cookie being set (not cleared) by a response.
pub fn set_cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .filter(|c| c.starts_with(&prefix) && !c.contains("Max-Age=0"))
        .find_map(|c| {
            c[prefix.len()..]
                .split(';')
                .next()
                .filter(|v| !v.is_empty())
                .map(String::from)
        })
}

pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .any(|c| c.starts_with(&prefix) && c.contains("Max-Age=0"))
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A bearer for `principal` that expired well before now.
pub fn expired_bearer(app: &TestApp, principal: &str) -> String {
    let now = tollgate::jwt::now_secs().unwrap();
    app.jwt
        .issue_bearer_at(principal, now - app.jwt.bearer_duration() - 100)
        .unwrap()
        .token
}
