use crate::authn::Service;
use crate::config::AuthConfig;
use crate::session::UserTokenService;
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod handlers;
pub mod middleware;
mod openapi;

pub use openapi::{openapi, ApiDoc};

/// Shared state of the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub authn: Arc<Service>,
    pub cfg: Arc<AuthConfig>,
    pub sessions: Arc<dyn UserTokenService>,
}

impl AppState {
    #[must_use]
    pub fn new(
        authn: Arc<Service>,
        cfg: Arc<AuthConfig>,
        sessions: Arc<dyn UserTokenService>,
    ) -> Self {
        Self {
            authn,
            cfg,
            sessions,
        }
    }
}

pub const ROTATE_TOKEN_PATH: &str = "/api/user/auth-tokens/rotate";

/// Build the router. Session maintenance routes are mounted after the
/// authentication layer so stale sessions can still reach them.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(handlers::health).options(handlers::health),
        )
        .route("/api/user", get(handlers::current_user))
        .route("/api/openapi.json", get(openapi::openapi_json))
        .route("/login/:provider", get(handlers::login))
        .layer(from_fn_with_state(state.clone(), middleware::authenticate))
        .route(ROTATE_TOKEN_PATH, post(handlers::rotate_token))
        .route("/logout", post(handlers::logout))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
        .with_state(state)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: AppState) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            info!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
