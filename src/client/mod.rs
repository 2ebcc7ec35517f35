//! Client for the session API.
//!
//! State (cookies, the recorded user, the sync token) belongs to one
//! [`ReauthClient`] and its clones; nothing is process-global.

mod error;
mod interceptor;
mod session;

pub use error::ClientError;
pub use interceptor::{DEFAULT_TIMEOUT, ReauthClient};
pub use session::ClientSession;
