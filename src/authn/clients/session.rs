use super::{exchange_user_info, module_name, PRIORITY_SESSION};
use crate::authn::cookie::{query_unescape, write_session_cookie};
use crate::authn::{
    AuthError, Client, ClientParams, Identity, NamespacedId, Request, SessionTokenSlot,
};
use crate::config::{AuthConfig, FeatureToggles, FLAG_CLIENT_TOKEN_ROTATION};
use crate::session::UserTokenService;
use crate::social::{OAuthToken, SocialConnector};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, instrument};

const FALLBACK_PROVIDER: &str = "generic_auth";

/// What a successful cookie-as-bearer fallback grants.
///
/// Defaults grant both, matching deployments that relied on the fallback to
/// provision administrators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FallbackPolicy {
    pub grant_admin: bool,
    pub allow_sign_up: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            grant_admin: true,
            allow_sign_up: true,
        }
    }
}

struct OAuthFallback {
    connector: Arc<dyn SocialConnector>,
    http: reqwest::Client,
}

/// Authenticates requests carrying the login cookie.
pub struct SessionClient {
    cfg: Arc<AuthConfig>,
    features: Arc<FeatureToggles>,
    sessions: Arc<dyn UserTokenService>,
    fallback: Option<OAuthFallback>,
    fallback_policy: FallbackPolicy,
}

impl SessionClient {
    #[must_use]
    pub fn new(
        cfg: Arc<AuthConfig>,
        features: Arc<FeatureToggles>,
        sessions: Arc<dyn UserTokenService>,
    ) -> Self {
        Self {
            cfg,
            features,
            sessions,
            fallback: None,
            fallback_policy: FallbackPolicy::default(),
        }
    }

    /// Try the cookie value as an OAuth bearer token when no session matches.
    #[must_use]
    pub fn with_oauth_fallback(
        mut self,
        connector: Arc<dyn SocialConnector>,
        http: reqwest::Client,
    ) -> Self {
        self.fallback = Some(OAuthFallback { connector, http });
        self
    }

    #[must_use]
    pub fn with_fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.fallback_policy = policy;
        self
    }

    fn client_rotation_enabled(&self) -> bool {
        self.features.is_enabled(FLAG_CLIENT_TOKEN_ROTATION)
    }

    async fn authenticate_fallback(
        &self,
        fallback: &OAuthFallback,
        raw: &str,
    ) -> Result<Identity, AuthError> {
        let token = OAuthToken::bearer(raw);
        let info = exchange_user_info(fallback.connector.as_ref(), &fallback.http, &token).await?;

        Ok(Identity {
            login: info.login,
            name: info.name,
            email: info.email,
            is_server_admin: Some(self.fallback_policy.grant_admin),
            auth_module: module_name(FALLBACK_PROVIDER),
            auth_id: info.id,
            groups: info.groups,
            oauth_token: Some(token),
            client_params: ClientParams {
                sync_user: true,
                sync_teams: true,
                fetch_synced_user: true,
                sync_permissions: true,
                allow_sign_up: self.fallback_policy.allow_sign_up,
                ..ClientParams::default()
            },
            ..Identity::default()
        })
    }
}

#[async_trait]
impl Client for SessionClient {
    fn name(&self) -> &str {
        "auth.client.session"
    }

    fn priority(&self) -> u32 {
        PRIORITY_SESSION
    }

    fn test(&self, r: &Request) -> bool {
        let name = self.cfg.login_cookie_name();
        !name.is_empty() && r.cookie(name).is_some()
    }

    #[instrument(skip_all)]
    async fn authenticate(&self, r: &Request) -> Result<Identity, AuthError> {
        let cookie = r
            .cookie(self.cfg.login_cookie_name())
            .ok_or(AuthError::MalformedCredential("missing session cookie"))?;
        let raw = query_unescape(cookie)?;

        let session_err = match self.sessions.lookup_token(&raw).await {
            Ok(token) => {
                if self.client_rotation_enabled()
                    && token.needs_rotation(self.cfg.token_rotation_interval())
                {
                    debug!(token_id = %token.id, "session token due for rotation");
                    return Err(AuthError::TokenNeedsRotation);
                }

                return Ok(Identity {
                    id: Some(NamespacedId::user(token.user_id)),
                    session_token: Some(SessionTokenSlot::new(token)),
                    client_params: ClientParams {
                        fetch_synced_user: true,
                        sync_permissions: true,
                        ..ClientParams::default()
                    },
                    ..Identity::default()
                });
            }
            Err(err) => err,
        };

        let Some(fallback) = &self.fallback else {
            return Err(AuthError::SessionLookup {
                session: session_err,
                fallback: None,
            });
        };

        debug!(error = %session_err, "session lookup failed, trying oauth fallback");
        match self.authenticate_fallback(fallback, &raw).await {
            Ok(identity) => Ok(identity),
            Err(fallback_err) => Err(AuthError::SessionLookup {
                session: session_err,
                fallback: Some(Box::new(fallback_err)),
            }),
        }
    }

    fn hook(&self, identity: &Identity, r: &Request) -> Result<(), AuthError> {
        let Some(slot) = identity.session_token.clone() else {
            return Ok(());
        };
        if self.client_rotation_enabled() {
            return Ok(());
        }

        let cfg = self.cfg.clone();
        let sessions = self.sessions.clone();
        let cancel = r.cancellation().clone();
        let client_ip = r.client_ip();
        let user_agent = r.user_agent().to_string();

        r.response().before(move |w| async move {
            if w.written() || cancel.is_cancelled() {
                return;
            }

            let current = slot.get();
            let rotated = tokio::select! {
                () = cancel.cancelled() => return,
                rotated = sessions.try_rotate_token(&current, client_ip, &user_agent) => rotated,
            };

            match rotated {
                Ok(Some(token)) => {
                    debug!(token_id = %token.id, "session token rotated");
                    write_session_cookie(&w, &cfg, &token);
                    slot.replace(token);
                }
                Ok(None) => {}
                Err(err) => {
                    error!(user_id = current.user_id, "Failed to rotate token: {err}");
                }
            }
        });

        Ok(())
    }
}
