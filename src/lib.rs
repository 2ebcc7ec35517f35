pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod client;
pub mod csrf;
pub mod db;
pub mod hasher;
pub mod jwt;
pub mod rate_limit;
pub mod server_config;
pub mod session;

use api::create_api_router;
use axum::{Router, routing::get};
use csrf::Synchronizer;
use db::Database;
use hasher::SecretHasher;
use jwt::JwtConfig;
use rate_limit::RateLimitConfig;
use session::Sessions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Prefix for every API route.
pub const API_PREFIX: &str = "/api/v1";

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing bearer tokens; the anti-forgery key is derived from it
    pub jwt_secret: Vec<u8>,
    /// Bearer token lifetime in seconds
    pub bearer_ttl_secs: u64,
    /// Refresh credential lifetime in seconds
    pub refresh_ttl_secs: u64,
    /// Argon2 hasher for passwords and refresh secrets
    pub hasher: SecretHasher,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Whether to rate limit login and registration per client IP
    pub rate_limit: bool,
    /// Take the client IP from X-Forwarded-For (requires running behind a proxy)
    pub trust_forwarded_for: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    server_config::init(config.secure_cookies);

    let jwt = Arc::new(
        JwtConfig::new(&config.jwt_secret).with_bearer_duration(config.bearer_ttl_secs),
    );
    let sessions = Sessions::new(
        jwt,
        config.db.clone(),
        config.hasher.clone(),
        config.refresh_ttl_secs,
    );
    let sync = Synchronizer::from_jwt_secret(&config.jwt_secret);

    let rate_limit_config = config
        .rate_limit
        .then(|| Arc::new(RateLimitConfig::new(config.trust_forwarded_for)));

    let api_router = create_api_router(
        config.db.clone(),
        sessions,
        config.hasher.clone(),
        sync,
        config.secure_cookies,
        rate_limit_config,
    );

    Router::new()
        .route("/healthcheck", get(healthcheck))
        .nest(API_PREFIX, api_router)
}

async fn healthcheck() -> &'static str {
    "Server is healthy"
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    // Run cleanup tasks on startup
    init_cleanup(&config.db).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
