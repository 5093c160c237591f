//! Request authentication for every route.
//!
//! The identity, when any, is stored in the request extensions. A session
//! cookie that no longer resolves is cleared and the request continues
//! anonymously. Pre-send callbacks registered by client hooks run after the
//! handler; the headers they queue are merged into the response before it
//! leaves the middleware.

use super::AppState;
use crate::authn::{self, cookie::delete_session_cookie, AuthError};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const TOKEN_ROTATION_HEADER: &str = "x-token-rotation";

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Cancels in-flight authentication and rotation if the connection goes away.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let resp = authn::Response::new();
    let mut r = authn::Request::new(request.headers().clone())
        .with_cancellation(cancel)
        .with_response(resp.clone());
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        r = r.with_remote_addr(*addr);
    }

    match state.authn.authenticate(&r).await {
        Ok(identity) => {
            debug!(auth_module = %identity.auth_module, "request authenticated");
            request.extensions_mut().insert(identity);
        }
        Err(AuthError::NotApplicable) => {}
        Err(err @ AuthError::SessionLookup { .. }) => {
            debug!("dropping session cookie: {err}");
            delete_session_cookie(resp.writer(), &state.cfg);
        }
        Err(AuthError::TokenNeedsRotation) => {
            guard.disarm();
            return rotation_required();
        }
        Err(err) => {
            debug!(kind = err.kind(), "rejecting request");
            guard.disarm();
            return unauthorized();
        }
    }

    let mut response = next.run(request).await;

    resp.run_before().await;
    let writer = resp.writer();
    for (name, value) in writer.take_headers() {
        response.headers_mut().append(name, value);
    }
    writer.mark_written();
    guard.disarm();

    response
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Unauthorized" })),
    )
        .into_response()
}

fn rotation_required() -> Response {
    let mut response = unauthorized();
    response.headers_mut().insert(
        HeaderName::from_static(TOKEN_ROTATION_HEADER),
        HeaderValue::from_static("required"),
    );
    response
}
