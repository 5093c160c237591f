//! Session token maintenance driven by the client.
//!
//! Both routes sit outside the authentication middleware: a stale session must
//! still be able to rotate, and logout works for sessions that no longer
//! resolve.

use crate::authn::{
    cookie::{delete_session_cookie, query_unescape, write_session_cookie},
    Request, ResponseWriter,
};
use crate::server::AppState;
use crate::session::UserToken;
use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::net::SocketAddr;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct RotateResponse {
    pub rotated: bool,
}

fn auth_request(headers: HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> Request {
    let r = Request::new(headers);
    match peer {
        Some(ConnectInfo(addr)) => r.with_remote_addr(addr),
        None => r,
    }
}

async fn current_token(state: &AppState, r: &Request) -> Option<UserToken> {
    let cookie = r.cookie(state.cfg.login_cookie_name())?;
    let raw = query_unescape(cookie).ok()?;
    match state.sessions.lookup_token(&raw).await {
        Ok(token) => Some(token),
        Err(err) => {
            debug!("session cookie does not resolve: {err}");
            None
        }
    }
}

fn with_cookies(status: StatusCode, w: &ResponseWriter, body: Option<RotateResponse>) -> Response {
    let mut response = match body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    };
    for (name, value) in w.take_headers() {
        response.headers_mut().append(name, value);
    }
    response
}

#[utoipa::path(
    post,
    path = "/api/user/auth-tokens/rotate",
    responses(
        (status = 200, description = "Session checked, rotated when due", body = RotateResponse),
        (status = 401, description = "No valid session, cookie cleared"),
        (status = 500, description = "Session store failure")
    ),
    tag = "authn"
)]
pub async fn rotate_token(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let r = auth_request(headers, peer);
    let w = ResponseWriter::default();

    let Some(token) = current_token(&state, &r).await else {
        delete_session_cookie(&w, &state.cfg);
        return with_cookies(StatusCode::UNAUTHORIZED, &w, None);
    };

    match state
        .sessions
        .try_rotate_token(&token, r.client_ip(), r.user_agent())
        .await
    {
        Ok(Some(rotated)) => {
            debug!(token_id = %rotated.id, "session token rotated on request");
            write_session_cookie(&w, &state.cfg, &rotated);
            with_cookies(StatusCode::OK, &w, Some(RotateResponse { rotated: true }))
        }
        Ok(None) => with_cookies(StatusCode::OK, &w, Some(RotateResponse { rotated: false })),
        Err(err) => {
            error!(user_id = token.user_id, "Failed to rotate token: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 204, description = "Session revoked and cookie cleared"),
        (status = 500, description = "Session store failure")
    ),
    tag = "authn"
)]
pub async fn logout(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let r = auth_request(headers, peer);
    let w = ResponseWriter::default();

    if let Some(token) = current_token(&state, &r).await {
        if let Err(err) = state.sessions.revoke_token(&token).await {
            error!(user_id = token.user_id, "Failed to revoke token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        debug!(token_id = %token.id, "session revoked");
    }

    delete_session_cookie(&w, &state.cfg);
    with_cookies(StatusCode::NO_CONTENT, &w, None)
}
