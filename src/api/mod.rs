mod error;
mod tokens;
mod users;

use axum::{Router, middleware};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::csrf::{Synchronizer, require_sync_token};
use crate::db::Database;
use crate::hasher::SecretHasher;
use crate::rate_limit::RateLimitConfig;
use crate::session::Sessions;

pub use error::{ApiError, ResultExt};
pub use tokens::TokensState;
pub use users::UsersState;

/// Create the API router, mounted under `/user`.
///
/// Login, register, refresh and sync-token are reachable without an
/// anti-forgery token; everything else requires one on state-changing methods.
pub fn create_api_router(
    db: Database,
    sessions: Sessions,
    hasher: SecretHasher,
    sync: Synchronizer,
    secure_cookies: bool,
    rate_limit_config: Option<Arc<RateLimitConfig>>,
) -> Router {
    let users_state = users::UsersState {
        db,
        sessions: sessions.clone(),
        hasher,
        sync: sync.clone(),
        secure_cookies,
        rate_limit_config,
        dummy_hash: Arc::new(OnceCell::new()),
    };

    let tokens_state = tokens::TokensState {
        sessions,
        sync: sync.clone(),
        secure_cookies,
    };

    let guarded = Router::new()
        .merge(users::guarded_router(users_state.clone()))
        .merge(tokens::guarded_router(tokens_state.clone()))
        .layer(middleware::from_fn_with_state(sync, require_sync_token));

    let public = Router::new()
        .merge(users::public_router(users_state))
        .merge(tokens::public_router(tokens_state));

    Router::new().nest("/user", public.merge(guarded))
}
