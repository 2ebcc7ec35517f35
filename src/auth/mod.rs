//! HTTP-side authentication: cookies, the bearer guard, and error responses.
//!
//! The guard only verifies the bearer token. Expired bearers are refreshed by
//! the client through the refresh endpoint, never implicitly here.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, CSRF_COOKIE_NAME, REFRESH_COOKIE_NAME, build_cookie,
    cleared_token_cookies, get_cookie, token_cookies,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::Auth;
pub use ip::extract_client_ip;
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
