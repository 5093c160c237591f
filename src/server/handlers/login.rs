//! Start of the authorization-code flow.
//!
//! The hashed state and the PKCE verifier are handed to the browser in short
//! lived cookies; the callback side compares them.

use crate::authn::{AuthError, Request, KEY_OAUTH_PKCE, KEY_OAUTH_STATE};
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
};
use tracing::error;

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_PKCE_COOKIE: &str = "oauth_code_verifier";
const OAUTH_COOKIE_MAX_AGE: u64 = 600;

#[utoipa::path(
    get,
    path = "/login/{provider}",
    params(
        ("provider" = String, Path, description = "OAuth provider name")
    ),
    responses(
        (status = 302, description = "Redirect to the provider"),
        (status = 404, description = "Unknown provider"),
        (status = 500, description = "Failed to build the redirect")
    ),
    tag = "authn"
)]
pub async fn login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let r = Request::new(headers);
    let redirect = match state.authn.redirect_url(&provider, &r) {
        Ok(redirect) => redirect,
        Err(AuthError::NotApplicable) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!(provider, "Failed to build redirect: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    let Ok(location) = HeaderValue::from_str(&redirect.url) else {
        error!(provider, "Redirect URL is not a valid header value");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    response_headers.insert(LOCATION, location);

    let cookies = [
        (OAUTH_STATE_COOKIE, redirect.extra.get(KEY_OAUTH_STATE)),
        (OAUTH_PKCE_COOKIE, redirect.extra.get(KEY_OAUTH_PKCE)),
    ];
    for (name, value) in cookies {
        let Some(value) = value else {
            continue;
        };
        match flow_cookie(&state, name, value) {
            Ok(cookie) => {
                response_headers.append(SET_COOKIE, cookie);
            }
            Err(err) => {
                error!("Failed to build {name} cookie: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    (StatusCode::FOUND, response_headers).into_response()
}

fn flow_cookie(
    state: &AppState,
    name: &str,
    value: &str,
) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    let mut cookie = format!(
        "{name}={value}; Path={}; Max-Age={OAUTH_COOKIE_MAX_AGE}; HttpOnly; SameSite=Lax",
        state.cfg.cookie_path()
    );
    if state.cfg.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}
