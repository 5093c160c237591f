use crate::{
    authn::{
        clients::{OAuth2Client, SessionClient},
        Service,
    },
    cli::{
        commands::{auth, oauth},
        telemetry,
    },
    config::FLAG_CLIENT_TOKEN_ROTATION,
    server::{self, AppState},
    session::{MemoryTokenService, UserTokenService},
    social::{GenericOAuth, SocialConnector},
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub auth: auth::Options,
    pub oauth: Option<oauth::Options>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the provider settings are invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let cfg = Arc::new(args.auth.auth_config());
    let features = Arc::new(args.auth.feature_toggles.clone());
    let sessions: Arc<dyn UserTokenService> = Arc::new(MemoryTokenService::new(
        cfg.token_rotation_interval(),
        cfg.login_max_lifetime(),
    ));

    let http = reqwest::Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .build()?;

    let mut authn = Service::new();
    let mut session_client = SessionClient::new(cfg.clone(), features, sessions.clone())
        .with_fallback_policy(args.auth.fallback_policy);

    if let Some(provider) = args.oauth {
        let name = provider.info.name.clone();
        let connector: Arc<dyn SocialConnector> = Arc::new(
            GenericOAuth::new(provider.info.clone())
                .with_context(|| format!("invalid authorization URL for provider {name}"))?,
        );

        let client = Arc::new(OAuth2Client::new(
            &format!("auth.client.{name}"),
            cfg.clone(),
            Arc::new(provider.info),
            connector.clone(),
            http.clone(),
        ));
        authn.register(client.clone());
        authn.register_redirect(&name, client);

        if provider.session_fallback {
            session_client = session_client.with_oauth_fallback(connector, http);
        }
    }

    authn.register(Arc::new(session_client));

    info!(clients = ?authn.client_names(), "authentication clients registered");

    let state = AppState::new(Arc::new(authn), cfg, sessions);
    let result = server::new(args.port, state).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let provider = args
        .oauth
        .as_ref()
        .map_or_else(|| "none".to_string(), |p| p.info.name.clone());
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("login_cookie_name", args.auth.login_cookie_name.clone()),
        ("cookie_secure", args.auth.cookie_secure.to_string()),
        (
            "client_token_rotation",
            args.auth
                .feature_toggles
                .is_enabled(FLAG_CLIENT_TOKEN_ROTATION)
                .to_string(),
        ),
        ("oauth_provider", provider),
        (
            "oauth_session_fallback",
            args.oauth
                .as_ref()
                .is_some_and(|p| p.session_fallback)
                .to_string(),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("authgate {}\n\nStartup configuration:", env!("CARGO_PKG_VERSION"));
    for (key, value) in &entries {
        message.push_str(&format!("\n  {key:<max_key_len$}  {value}"));
    }
    info!("{message}");
}
