//! Global server configuration initialized once at startup.
//!
//! Read by error responses, which are built far from any handler state.
//! The first initialization wins; later calls are ignored.

use std::sync::OnceLock;

static SECURE_COOKIES: OnceLock<bool> = OnceLock::new();

pub fn init(secure_cookies: bool) {
    SECURE_COOKIES.get_or_init(|| secure_cookies);
}

/// Whether to set the Secure flag on cookies. False until initialized.
pub fn secure_cookies() -> bool {
    SECURE_COOKIES.get().copied().unwrap_or(false)
}
