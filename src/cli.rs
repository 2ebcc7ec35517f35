//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::hasher::{HashCost, SecretHasher};
use crate::jwt::BEARER_TOKEN_DURATION_SECS;
use crate::session::REFRESH_CREDENTIAL_DURATION_SECS;
use clap::Parser;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Upper bound for token lifetimes: ten years.
const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tollgate",
    about = "Session and credential lifecycle server"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5000")]
    pub port: u16,

    /// Path to SQLite database file (":memory:" for an in-memory database)
    #[arg(short, long, env = "DATABASE", default_value = "tollgate.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Bearer token lifetime in seconds
    #[arg(long, env = "BEARER_TTL_SECS", default_value_t = BEARER_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS as u64))]
    pub bearer_ttl_secs: u64,

    /// Refresh credential lifetime in seconds
    #[arg(long, env = "REFRESH_TTL_SECS", default_value_t = REFRESH_CREDENTIAL_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS as u64))]
    pub refresh_ttl_secs: u64,

    /// Set the Secure flag on cookies (enable when served over HTTPS)
    #[arg(long, env = "SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// Take the client IP from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long, env = "TRUST_FORWARDED_FOR")]
    pub trust_forwarded_for: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    validate_jwt_secret(secret)
}

fn validate_jwt_secret(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Build ServerConfig from validated arguments.
/// Returns None and logs an error if the hasher cannot be built.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> Option<ServerConfig> {
    let hasher = match SecretHasher::new(HashCost::default()) {
        Ok(hasher) => hasher,
        Err(e) => {
            error!(error = %e, "Invalid hash parameters");
            return None;
        }
    };

    Some(ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        bearer_ttl_secs: args.bearer_ttl_secs,
        refresh_ttl_secs: args.refresh_ttl_secs,
        hasher,
        secure_cookies: args.secure_cookies,
        rate_limit: true,
        trust_forwarded_for: args.trust_forwarded_for,
    })
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
