use async_trait::async_trait;
use authgate::{
    authn::{
        clients::{OAuth2Client, SessionClient},
        Service,
    },
    config::{AuthConfig, FeatureToggles, FLAG_CLIENT_TOKEN_ROTATION},
    server::{router, AppState},
    session::{MemoryTokenService, TokenError, UserToken, UserTokenService},
    social::{
        AuthCodeOption, BasicUserInfo, OAuthInfo, OAuthToken, SocialConnector, SocialError,
        TokenTransport,
    },
};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use chrono::{TimeDelta, Utc};
use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tower::ServiceExt;
use uuid::Uuid;

const COOKIE: &str = "authgate_session";

struct StaticConnector;

#[async_trait]
impl SocialConnector for StaticConnector {
    async fn user_info(
        &self,
        _transport: &TokenTransport,
        token: &OAuthToken,
    ) -> Result<BasicUserInfo, SocialError> {
        if token.access_token.expose_secret() != "good-token" {
            return Err(SocialError::InvalidToken);
        }
        Ok(BasicUserInfo {
            id: "42".to_string(),
            name: "Alice".to_string(),
            login: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: "Editor".to_string(),
            is_server_admin: None,
            groups: vec!["staff".to_string()],
        })
    }

    fn is_email_allowed(&self, _email: &str) -> bool {
        true
    }

    fn is_signup_allowed(&self) -> bool {
        true
    }

    fn auth_code_url(&self, state: &str, _opts: &[AuthCodeOption]) -> String {
        format!("https://idp.example.com/authorize?state={state}")
    }
}

/// Session store keyed by raw token whose rotations always succeed, so a
/// token can start out stale without waiting for the clock.
#[derive(Default)]
struct ScriptedSessions {
    tokens: Mutex<HashMap<String, UserToken>>,
}

impl ScriptedSessions {
    fn with_stale(raw: &str, user_id: i64) -> Self {
        let rotated_at = Utc::now() - TimeDelta::hours(1);
        let token = UserToken {
            id: Uuid::new_v4(),
            user_id,
            auth_token: format!("hash-{raw}"),
            prev_auth_token: String::new(),
            unhashed_token: None,
            auth_token_seen: true,
            seen_at: Some(rotated_at),
            rotated_at,
            created_at: rotated_at,
            client_ip: None,
            user_agent: String::new(),
        };
        let sessions = Self::default();
        if let Ok(mut tokens) = sessions.tokens.lock() {
            tokens.insert(raw.to_string(), token);
        }
        sessions
    }
}

#[async_trait]
impl UserTokenService for ScriptedSessions {
    async fn create_token(
        &self,
        _user_id: i64,
        _client_ip: Option<IpAddr>,
        _user_agent: &str,
    ) -> Result<UserToken, TokenError> {
        Err(TokenError::Store("not supported".to_string()))
    }

    async fn lookup_token(&self, unhashed_token: &str) -> Result<UserToken, TokenError> {
        let tokens = self.tokens.lock().map_err(|_| TokenError::NotFound)?;
        tokens.get(unhashed_token).cloned().ok_or(TokenError::NotFound)
    }

    async fn try_rotate_token(
        &self,
        token: &UserToken,
        client_ip: Option<IpAddr>,
        user_agent: &str,
    ) -> Result<Option<UserToken>, TokenError> {
        let mut tokens = self.tokens.lock().map_err(|_| TokenError::NotFound)?;
        let Some(old_raw) = tokens
            .iter()
            .find(|(_, stored)| stored.id == token.id)
            .map(|(raw, _)| raw.clone())
        else {
            return Err(TokenError::NotFound);
        };
        tokens.remove(&old_raw);

        let raw = format!("{old_raw}-rotated");
        let rotated = UserToken {
            auth_token: format!("hash-{raw}"),
            prev_auth_token: token.auth_token.clone(),
            rotated_at: Utc::now(),
            client_ip,
            user_agent: user_agent.to_string(),
            ..token.clone()
        };
        tokens.insert(raw.clone(), rotated.clone());

        Ok(Some(UserToken {
            unhashed_token: Some(SecretString::from(raw)),
            ..rotated
        }))
    }

    async fn revoke_token(&self, token: &UserToken) -> Result<(), TokenError> {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.retain(|_, stored| stored.id != token.id);
        }
        Ok(())
    }
}

struct Harness {
    app: Router,
    sessions: Arc<MemoryTokenService>,
}

fn config(rotation_minutes: u64) -> Arc<AuthConfig> {
    Arc::new(
        AuthConfig::new(SecretString::from("server-secret".to_string()))
            .with_token_rotation_interval_minutes(rotation_minutes),
    )
}

fn harness(rotation_minutes: u64, features: FeatureToggles) -> Harness {
    let cfg = config(rotation_minutes);
    let sessions = Arc::new(MemoryTokenService::new(
        cfg.token_rotation_interval(),
        Duration::from_secs(24 * 60 * 60),
    ));

    Harness {
        app: app(cfg, features, sessions.clone()),
        sessions,
    }
}

fn app(
    cfg: Arc<AuthConfig>,
    features: FeatureToggles,
    sessions: Arc<dyn UserTokenService>,
) -> Router {
    let info = OAuthInfo::new(
        "corp",
        "client-id",
        SecretString::from("client-secret".to_string()),
    );
    let oauth = Arc::new(OAuth2Client::new(
        "auth.client.corp",
        cfg.clone(),
        Arc::new(info),
        Arc::new(StaticConnector),
        reqwest::Client::new(),
    ));

    let mut authn = Service::new();
    authn.register(oauth.clone());
    authn.register_redirect("corp", oauth);
    authn.register(Arc::new(SessionClient::new(
        cfg.clone(),
        Arc::new(features),
        sessions.clone(),
    )));

    router(AppState::new(Arc::new(authn), cfg, sessions))
}

async fn session(sessions: &MemoryTokenService) -> String {
    let token: UserToken = match sessions.create_token(7, None, "test-agent").await {
        Ok(token) => token,
        Err(err) => panic!("create token: {err}"),
    };
    token
        .unhashed_token
        .map(|raw| raw.expose_secret().to_string())
        .unwrap_or_default()
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().uri(uri)
}

fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("POST").uri(uri)
}

fn set_cookies(response: &axum::response::Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(ToString::to_string)
        .collect()
}

fn clears_session(cookies: &[String]) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{COOKIE}=;")) && c.contains("Max-Age=0"))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = match response.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => panic!("read body: {err}"),
    };
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

async fn send(app: Router, request: Request<Body>) -> axum::response::Response {
    match app.oneshot(request).await {
        Ok(response) => response,
        Err(err) => match err {},
    }
}

#[tokio::test]
async fn health_is_public() {
    let h = harness(10, FeatureToggles::default());
    let response = send(h.app, get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn anonymous_user_is_unauthorized() {
    let h = harness(10, FeatureToggles::default());
    let response = send(h.app, get("/api/user").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_token_resolves_identity() {
    let h = harness(10, FeatureToggles::default());
    let request = get("/api/user")
        .header(header::AUTHORIZATION, "Bearer good-token")
        .body(Body::empty())
        .unwrap();
    let response = send(h.app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["auth_module"], "oauth_corp");
    assert_eq!(body["auth_id"], "42");
    assert_eq!(body["org_roles"]["1"], "Editor");
    assert_eq!(body["session_backed"], false);
}

#[tokio::test]
async fn rejected_bearer_token_is_unauthorized() {
    let h = harness(10, FeatureToggles::default());
    let request = get("/api/user")
        .header(header::AUTHORIZATION, "Bearer bad-token")
        .body(Body::empty())
        .unwrap();
    let response = send(h.app, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Unauthorized");
}

#[tokio::test]
async fn session_cookie_resolves_identity() {
    let h = harness(10, FeatureToggles::default());
    let raw = session(&h.sessions).await;
    let request = get("/api/user")
        .header(header::COOKIE, format!("{COOKIE}={raw}"))
        .body(Body::empty())
        .unwrap();
    let response = send(h.app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let body = json_body(response).await;
    assert_eq!(body["id"], "user:7");
    assert_eq!(body["session_backed"], true);
}

#[tokio::test]
async fn unknown_session_cookie_is_unauthorized() {
    let h = harness(10, FeatureToggles::default());
    let request = get("/api/user")
        .header(header::COOKIE, format!("{COOKIE}=unknown"))
        .body(Body::empty())
        .unwrap();
    let response = send(h.app, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(clears_session(&set_cookies(&response)));
}

#[tokio::test]
async fn unknown_session_cookie_does_not_block_login() {
    let h = harness(10, FeatureToggles::default());
    let request = get("/login/corp")
        .header(header::COOKIE, format!("{COOKIE}=expired-or-revoked"))
        .body(Body::empty())
        .unwrap();
    let response = send(h.app.clone(), request).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let cookies = set_cookies(&response);
    assert!(clears_session(&cookies));
    assert!(cookies.iter().any(|c| c.starts_with("oauth_state=")));

    let request = get("/health")
        .header(header::COOKIE, format!("{COOKIE}=expired-or-revoked"))
        .body(Body::empty())
        .unwrap();
    let response = send(h.app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn stale_session_rotates_in_pre_send_hook() {
    let h = harness(0, FeatureToggles::default());
    let raw = session(&h.sessions).await;
    let request = get("/api/user")
        .header(header::COOKIE, format!("{COOKIE}={raw}"))
        .body(Body::empty())
        .unwrap();
    let response = send(h.app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
        .unwrap_or_default();
    assert!(set_cookie.starts_with(&format!("{COOKIE}=")));
    assert!(!set_cookie.contains(&raw));
    assert!(set_cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn stale_session_with_client_rotation_requires_rotation() {
    let h = harness(
        0,
        FeatureToggles::default().with_flag(FLAG_CLIENT_TOKEN_ROTATION),
    );
    let raw = session(&h.sessions).await;
    let request = get("/api/user")
        .header(header::COOKIE, format!("{COOKIE}={raw}"))
        .body(Body::empty())
        .unwrap();
    let response = send(h.app, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response
            .headers()
            .get("x-token-rotation")
            .and_then(|value| value.to_str().ok()),
        Some("required")
    );
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn login_unknown_provider_is_not_found() {
    let h = harness(10, FeatureToggles::default());
    let response = send(h.app, get("/login/unknown").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_redirects_with_state_cookie() {
    let h = harness(10, FeatureToggles::default());
    let response = send(h.app, get("/login/corp").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(location.starts_with("https://idp.example.com/authorize?state="));

    let cookies: Vec<&str> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("oauth_state="));
    assert!(cookies[0].contains("Max-Age=600"));
}

#[tokio::test]
async fn client_rotation_round_trip() {
    let sessions = Arc::new(ScriptedSessions::with_stale("stale", 9));
    let router = app(
        config(10),
        FeatureToggles::default().with_flag(FLAG_CLIENT_TOKEN_ROTATION),
        sessions,
    );

    let request = get("/api/user")
        .header(header::COOKIE, format!("{COOKIE}=stale"))
        .body(Body::empty())
        .unwrap();
    let response = send(router.clone(), request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("x-token-rotation"));

    let request = post("/api/user/auth-tokens/rotate")
        .header(header::COOKIE, format!("{COOKIE}=stale"))
        .body(Body::empty())
        .unwrap();
    let response = send(router.clone(), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert!(cookies
        .iter()
        .any(|c| c.starts_with(&format!("{COOKIE}=stale-rotated;"))));
    assert_eq!(json_body(response).await["rotated"], true);

    let request = get("/api/user")
        .header(header::COOKIE, format!("{COOKIE}=stale-rotated"))
        .body(Body::empty())
        .unwrap();
    let response = send(router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["id"], "user:9");
}

#[tokio::test]
async fn rotate_without_session_clears_cookie() {
    let h = harness(10, FeatureToggles::default());
    let request = post("/api/user/auth-tokens/rotate")
        .header(header::COOKIE, format!("{COOKIE}=unknown"))
        .body(Body::empty())
        .unwrap();
    let response = send(h.app, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(clears_session(&set_cookies(&response)));
}

#[tokio::test]
async fn logout_revokes_session() {
    let h = harness(10, FeatureToggles::default());
    let raw = session(&h.sessions).await;

    let request = post("/logout")
        .header(header::COOKIE, format!("{COOKIE}={raw}"))
        .body(Body::empty())
        .unwrap();
    let response = send(h.app.clone(), request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(clears_session(&set_cookies(&response)));

    let request = get("/api/user")
        .header(header::COOKIE, format!("{COOKIE}={raw}"))
        .body(Body::empty())
        .unwrap();
    let response = send(h.app, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
