use super::{
    exchange_user_info, extract_bearer_token, module_name, resolve_org_roles, PRIORITY_OAUTH2,
};
use crate::authn::crypto::{self, CODE_CHALLENGE_METHOD};
use crate::authn::{
    AuthError, Client, ClientParams, Identity, Redirect, RedirectClient, Request,
    UserLookupParams, KEY_OAUTH_PKCE, KEY_OAUTH_STATE, META_KEY_AUTH_MODULE,
};
use crate::config::AuthConfig;
use crate::social::{AuthCodeOption, OAuthInfo, OAuthToken, SocialConnector};
use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Authenticates `Authorization: Bearer` requests against an OAuth provider.
pub struct OAuth2Client {
    name: String,
    module_name: String,
    cfg: Arc<AuthConfig>,
    info: Arc<OAuthInfo>,
    connector: Arc<dyn SocialConnector>,
    http: reqwest::Client,
}

impl OAuth2Client {
    #[must_use]
    pub fn new(
        name: &str,
        cfg: Arc<AuthConfig>,
        info: Arc<OAuthInfo>,
        connector: Arc<dyn SocialConnector>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            name: name.to_string(),
            module_name: module_name(name),
            cfg,
            info,
            connector,
            http,
        }
    }

    fn bearer_token<'r>(r: &'r Request) -> Option<&'r str> {
        r.headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(extract_bearer_token)
    }
}

#[async_trait]
impl Client for OAuth2Client {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        PRIORITY_OAUTH2
    }

    fn test(&self, r: &Request) -> bool {
        Self::bearer_token(r).is_some()
    }

    #[instrument(skip_all, fields(client = %self.name))]
    async fn authenticate(&self, r: &Request) -> Result<Identity, AuthError> {
        r.set_meta(META_KEY_AUTH_MODULE, &self.module_name);

        let token = Self::bearer_token(r)
            .ok_or(AuthError::MalformedCredential("invalid authorization header"))?;
        let token = OAuthToken::bearer(token);

        let info = exchange_user_info(self.connector.as_ref(), &self.http, &token).await?;
        let (org_roles, is_server_admin) = resolve_org_roles(&self.cfg, &info);

        let lookup_params = UserLookupParams {
            email: self
                .cfg
                .oauth_allow_insecure_email_lookup()
                .then(|| info.email.clone()),
        };

        debug!(auth_id = %info.id, "bearer token resolved");

        Ok(Identity {
            id: None,
            login: info.login,
            name: info.name,
            email: info.email,
            is_server_admin,
            auth_module: self.module_name.clone(),
            auth_id: info.id,
            groups: info.groups,
            client_params: ClientParams {
                sync_user: true,
                sync_teams: true,
                fetch_synced_user: true,
                sync_permissions: true,
                sync_org_roles: !org_roles.is_empty(),
                allow_sign_up: self.connector.is_signup_allowed(),
                lookup_params,
            },
            org_roles,
            oauth_token: Some(token),
            session_token: None,
        })
    }
}

impl RedirectClient for OAuth2Client {
    fn redirect_url(&self, _r: &Request) -> Result<Redirect, AuthError> {
        let mut opts = Vec::new();
        let mut extra = HashMap::new();

        if !self.info.hosted_domain.is_empty() {
            opts.push(AuthCodeOption::param("hd", &self.info.hosted_domain));
        }

        if self.info.use_pkce {
            let pkce = crypto::gen_pkce_code().map_err(AuthError::PkceGeneration)?;
            opts.push(AuthCodeOption::param("code_challenge", &pkce.challenge));
            opts.push(AuthCodeOption::param(
                "code_challenge_method",
                CODE_CHALLENGE_METHOD,
            ));
            extra.insert(KEY_OAUTH_PKCE.to_string(), pkce.verifier);
        }

        let state = crypto::gen_oauth_state(self.cfg.secret_key(), &self.info.client_secret)
            .map_err(AuthError::StateGeneration)?;
        extra.insert(KEY_OAUTH_STATE.to_string(), state.hashed);

        Ok(Redirect {
            url: self.connector.auth_code_url(&state.plain, &opts),
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authn::clients::testing::{user_info, FakeConnector};
    use crate::authn::crypto::{pkce_challenge, verify_oauth_state};
    use crate::authn::OrgRole;
    use crate::social::SocialError;
    use axum::http::{HeaderMap, HeaderValue};
    use secrecy::{ExposeSecret, SecretString};

    fn cfg() -> AuthConfig {
        AuthConfig::new(SecretString::from("server-secret".to_string()))
    }

    fn info() -> OAuthInfo {
        OAuthInfo::new(
            "generic_oauth",
            "client-id",
            SecretString::from("client-secret".to_string()),
        )
    }

    fn client(cfg: AuthConfig, info: OAuthInfo, connector: Arc<FakeConnector>) -> OAuth2Client {
        OAuth2Client::new(
            "auth.client.generic_oauth",
            Arc::new(cfg),
            Arc::new(info),
            connector,
            reqwest::Client::new(),
        )
    }

    fn bearer_request(value: &'static str) -> Request {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        Request::new(headers)
    }

    fn query_param(url: &str, key: &str) -> Option<String> {
        url::Url::parse(url).ok().and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        })
    }

    #[test]
    fn test_requires_bearer_shape() {
        let connector = Arc::new(FakeConnector::returning(Ok(user_info("a@b.com"))));
        let client = client(cfg(), info(), connector);
        assert!(client.test(&bearer_request("Bearer abc")));
        assert!(client.test(&bearer_request("BEARER abc")));
        assert!(!client.test(&bearer_request("Bearer")));
        assert!(!client.test(&bearer_request("Token abc")));
        assert!(!client.test(&bearer_request("Bearer abc def")));
        assert!(!client.test(&Request::new(HeaderMap::new())));
        assert_eq!(client.priority(), 10);
    }

    #[tokio::test]
    async fn authenticate_builds_identity() {
        let mut connector = FakeConnector::returning(Ok(user_info("alice@example.com")));
        connector.signup_allowed = true;
        let connector = Arc::new(connector);
        let client = client(cfg(), info(), connector.clone());
        let r = bearer_request("Bearer tok-123");

        let Ok(identity) = client.authenticate(&r).await else {
            panic!("authentication should succeed");
        };

        assert_eq!(connector.seen_tokens(), vec!["tok-123".to_string()]);
        assert_eq!(identity.auth_module, "oauth_generic_oauth");
        assert_eq!(identity.auth_id, "ext-1");
        assert_eq!(identity.login, "alice");
        assert_eq!(identity.email, "alice@example.com");
        assert_eq!(identity.groups, vec!["team-a", "team-b"]);
        assert_eq!(identity.org_roles.get(&1), Some(&OrgRole::Editor));
        assert_eq!(identity.is_server_admin, Some(false));
        assert!(identity.session_token.is_none());
        assert_eq!(
            identity
                .oauth_token
                .as_ref()
                .map(|t| t.access_token.expose_secret().to_string()),
            Some("tok-123".to_string())
        );
        let params = &identity.client_params;
        assert!(params.sync_user && params.sync_teams);
        assert!(params.fetch_synced_user && params.sync_permissions);
        assert!(params.sync_org_roles);
        assert!(params.allow_sign_up);
        assert_eq!(params.lookup_params.email, None);
        assert_eq!(
            r.meta(META_KEY_AUTH_MODULE).as_deref(),
            Some("oauth_generic_oauth")
        );
    }

    #[tokio::test]
    async fn authenticate_skip_role_sync() {
        let connector = Arc::new(FakeConnector::returning(Ok(user_info("a@b.com"))));
        let cfg = cfg().with_oauth_skip_org_role_update_sync(true);
        let client = client(cfg, info(), connector);

        let identity = client.authenticate(&bearer_request("Bearer t")).await;
        assert!(matches!(
            identity,
            Ok(ref id) if id.org_roles.is_empty()
                && !id.client_params.sync_org_roles
                && id.is_server_admin.is_none()
        ));
    }

    #[tokio::test]
    async fn authenticate_insecure_email_lookup() {
        let connector = Arc::new(FakeConnector::returning(Ok(user_info("a@b.com"))));
        let cfg = cfg().with_oauth_allow_insecure_email_lookup(true);
        let client = client(cfg, info(), connector);

        let identity = client.authenticate(&bearer_request("Bearer t")).await;
        assert_eq!(
            identity.ok().and_then(|id| id.client_params.lookup_params.email),
            Some("a@b.com".to_string())
        );
    }

    #[tokio::test]
    async fn authenticate_missing_email() {
        let connector = Arc::new(FakeConnector::returning(Ok(user_info(""))));
        let client = client(cfg(), info(), connector);
        assert!(matches!(
            client.authenticate(&bearer_request("Bearer t")).await,
            Err(AuthError::MissingRequiredEmail)
        ));
    }

    #[tokio::test]
    async fn authenticate_email_not_allowed() {
        let mut connector = FakeConnector::returning(Ok(user_info("a@b.com")));
        connector.allowed_email = false;
        let client = client(cfg(), info(), Arc::new(connector));
        assert!(matches!(
            client.authenticate(&bearer_request("Bearer t")).await,
            Err(AuthError::EmailNotAllowed)
        ));
    }

    #[tokio::test]
    async fn authenticate_provider_failure() {
        let connector = Arc::new(FakeConnector::returning(Err(SocialError::Status {
            status: 500,
        })));
        let client = client(cfg(), info(), connector);
        assert!(matches!(
            client.authenticate(&bearer_request("Bearer t")).await,
            Err(AuthError::ProviderUserInfo(SocialError::Status { status: 500 }))
        ));
    }

    #[tokio::test]
    async fn authenticate_rejects_malformed_header() {
        let connector = Arc::new(FakeConnector::returning(Ok(user_info("a@b.com"))));
        let client = client(cfg(), info(), connector.clone());
        assert!(matches!(
            client.authenticate(&bearer_request("Basic abc")).await,
            Err(AuthError::MalformedCredential(_))
        ));
        assert!(connector.seen_tokens().is_empty());
    }

    #[test]
    fn redirect_url_with_pkce_and_hosted_domain() {
        let mut info = info();
        info.use_pkce = true;
        info.hosted_domain = "example.com".to_string();
        let connector = Arc::new(FakeConnector::returning(Ok(user_info("a@b.com"))));
        let client = client(cfg(), info, connector);

        let Ok(redirect) = client.redirect_url(&Request::new(HeaderMap::new())) else {
            panic!("redirect should build");
        };

        let verifier = redirect.extra.get(KEY_OAUTH_PKCE).cloned().unwrap_or_default();
        let hashed = redirect.extra.get(KEY_OAUTH_STATE).cloned().unwrap_or_default();
        let state = query_param(&redirect.url, "state").unwrap_or_default();

        assert_eq!(query_param(&redirect.url, "hd").as_deref(), Some("example.com"));
        assert_eq!(
            query_param(&redirect.url, "code_challenge"),
            Some(pkce_challenge(&verifier))
        );
        assert_eq!(
            query_param(&redirect.url, "code_challenge_method").as_deref(),
            Some("S256")
        );
        assert!(!redirect.url.contains(&verifier));
        assert!(verify_oauth_state(
            &state,
            &hashed,
            &SecretString::from("server-secret".to_string()),
            &SecretString::from("client-secret".to_string()),
        ));
    }

    #[test]
    fn redirect_url_without_pkce() {
        let connector = Arc::new(FakeConnector::returning(Ok(user_info("a@b.com"))));
        let client = client(cfg(), info(), connector);

        let Ok(redirect) = client.redirect_url(&Request::new(HeaderMap::new())) else {
            panic!("redirect should build");
        };
        assert!(!redirect.extra.contains_key(KEY_OAUTH_PKCE));
        assert!(redirect.extra.contains_key(KEY_OAUTH_STATE));
        assert_eq!(query_param(&redirect.url, "code_challenge"), None);
        assert_eq!(query_param(&redirect.url, "hd"), None);
    }
}
