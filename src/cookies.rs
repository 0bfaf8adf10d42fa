//! Secure cookie handling for the session id / refresh token pair.
//!
//! Both cookies are `HttpOnly` and `SameSite=Strict`. The refresh cookie
//! is scoped to `/api/auth` so it only travels with auth requests.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::Utc;

use crate::session::IssuedSession;

pub const SESSION_COOKIE: &str = "sc_session";
pub const REFRESH_COOKIE: &str = "sc_refresh";
const REFRESH_COOKIE_PATH: &str = "/api/auth";
const MAX_COOKIE_VALUE_LEN: usize = 128;

/// Values read from the request's `Cookie` headers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CookiePair {
    pub session_id: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SecureCookieManager {
    secure: bool,
}

impl SecureCookieManager {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    /// `Set-Cookie` values carrying a freshly issued session.
    pub fn session_cookies(&self, issued: &IssuedSession) -> Vec<HeaderValue> {
        let now = Utc::now();
        let session_max_age = issued.session.remaining_secs(now);
        let refresh_max_age = (issued.refresh_expires_at - now).num_seconds().max(0);

        [
            self.build(SESSION_COOKIE, &issued.session.session_id, "/", session_max_age),
            self.build(
                REFRESH_COOKIE,
                &issued.refresh_token,
                REFRESH_COOKIE_PATH,
                refresh_max_age,
            ),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// `Set-Cookie` value that removes only the session cookie. The refresh
    /// cookie is left for `/api/auth/refresh`.
    pub fn clear_session_cookie(&self) -> Vec<HeaderValue> {
        self.build(SESSION_COOKIE, "", "/", 0).into_iter().collect()
    }

    /// `Set-Cookie` values that remove both cookies.
    pub fn clear_cookies(&self) -> Vec<HeaderValue> {
        [
            self.build(SESSION_COOKIE, "", "/", 0),
            self.build(REFRESH_COOKIE, "", REFRESH_COOKIE_PATH, 0),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Append cookies to a response header map.
    pub fn apply(headers: &mut HeaderMap, cookies: Vec<HeaderValue>) {
        for cookie in cookies {
            headers.append(SET_COOKIE, cookie);
        }
    }

    fn build(&self, name: &str, value: &str, path: &str, max_age: i64) -> Option<HeaderValue> {
        let mut cookie = format!(
            "{name}={value}; Path={path}; Max-Age={max_age}; HttpOnly; SameSite=Strict"
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        match HeaderValue::from_str(&cookie) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!(cookie = name, "Unencodable cookie value: {e}");
                None
            }
        }
    }

    /// Read the session cookie pair from all `Cookie` headers.
    /// Malformed pairs and values outside the token alphabet are ignored.
    pub fn read(headers: &HeaderMap) -> CookiePair {
        let mut pair = CookiePair::default();

        for header in headers.get_all(COOKIE) {
            let Ok(raw) = header.to_str() else { continue };
            for part in raw.split(';') {
                let Some((name, value)) = part.split_once('=') else { continue };
                let value = value.trim();
                if !is_token_value(value) {
                    continue;
                }
                match name.trim() {
                    SESSION_COOKIE => pair.session_id = Some(value.to_string()),
                    REFRESH_COOKIE => pair.refresh_token = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        pair
    }
}

/// URL-safe base64 alphabet, bounded length.
fn is_token_value(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_COOKIE_VALUE_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
