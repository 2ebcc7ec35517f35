//! Cookie parsing and building for authentication.

use axum::http::header;

use crate::session::IssuedTokens;

/// Cookie name for the bearer token.
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh secret.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Cookie name for the anti-forgery session id.
pub const CSRF_COOKIE_NAME: &str = "csrf_session";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

fn secure_suffix(secure: bool) -> &'static str {
    if secure { "; Secure" } else { "" }
}

/// Build an HttpOnly cookie. `max_age` of `None` makes a browser-session cookie.
pub fn build_cookie(name: &str, value: &str, max_age: Option<u64>, secure: bool) -> String {
    match max_age {
        Some(age) => format!(
            "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
            name,
            value,
            age,
            secure_suffix(secure)
        ),
        None => format!(
            "{}={}; HttpOnly; SameSite=Strict; Path=/{}",
            name,
            value,
            secure_suffix(secure)
        ),
    }
}

/// Build a cookie that removes `name` from the browser.
pub fn clear_cookie(name: &str, secure: bool) -> String {
    build_cookie(name, "", Some(0), secure)
}

/// Cookies carrying a freshly issued token pair.
///
/// The bearer cookie outlives the bearer token itself: an expired bearer is
/// still needed to name the principal when refreshing.
pub fn token_cookies(tokens: &IssuedTokens, secure: bool) -> [String; 2] {
    [
        build_cookie(
            ACCESS_COOKIE_NAME,
            &tokens.bearer.token,
            Some(tokens.refresh_duration),
            secure,
        ),
        build_cookie(
            REFRESH_COOKIE_NAME,
            &tokens.refresh_secret,
            Some(tokens.refresh_duration),
            secure,
        ),
    ]
}

/// Cookies clearing both tokens.
pub fn cleared_token_cookies(secure: bool) -> [String; 2] {
    [
        clear_cookie(ACCESS_COOKIE_NAME, secure),
        clear_cookie(REFRESH_COOKIE_NAME, secure),
    ]
}
