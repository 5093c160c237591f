//! Session cookie helpers.

use super::{AuthError, ResponseWriter};
use crate::config::AuthConfig;
use crate::session::UserToken;
use axum::http::{
    header::{InvalidHeaderValue, SET_COOKIE},
    HeaderValue,
};
use secrecy::ExposeSecret;
use tracing::warn;

/// Write the session cookie for a freshly issued or rotated token.
///
/// Tokens without a raw value are ignored: there is nothing to hand to the
/// client.
pub fn write_session_cookie(w: &ResponseWriter, cfg: &AuthConfig, token: &UserToken) {
    let Some(raw) = token.unhashed_token.as_ref() else {
        return;
    };
    let max_age = cfg.login_max_lifetime().as_secs();
    match session_cookie(cfg, &query_escape(raw.expose_secret()), max_age) {
        Ok(cookie) => {
            if !w.append_header(SET_COOKIE, cookie) {
                warn!("response already written, session cookie dropped");
            }
        }
        Err(err) => warn!("Failed to build session cookie: {err}"),
    }
}

/// Expire the session cookie on the client.
pub fn delete_session_cookie(w: &ResponseWriter, cfg: &AuthConfig) {
    match session_cookie(cfg, "", 0) {
        Ok(cookie) => {
            w.append_header(SET_COOKIE, cookie);
        }
        Err(err) => warn!("Failed to build session cookie: {err}"),
    }
}

pub(crate) fn session_cookie(
    cfg: &AuthConfig,
    value: &str,
    max_age: u64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}={value}; Path={}; Max-Age={max_age}; HttpOnly",
        cfg.login_cookie_name(),
        cfg.cookie_path()
    );
    if let Some(same_site) = cfg.cookie_same_site().as_attribute() {
        cookie.push_str("; SameSite=");
        cookie.push_str(same_site);
    }
    if cfg.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Form-style escaping: space becomes `+`.
#[must_use]
pub fn query_escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Inverse of `query_escape`. Broken `%` escapes are rejected instead of being
/// passed through.
///
/// # Errors
/// Returns `MalformedCredential` on an invalid escape or non UTF-8 output.
pub fn query_unescape(value: &str) -> Result<String, AuthError> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(AuthError::MalformedCredential("invalid cookie escape"));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(&value.replace('+', " "))
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| AuthError::MalformedCredential("cookie is not valid utf-8"))
}
