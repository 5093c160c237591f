//! OAuth provider contract.
//!
//! A `SocialConnector` performs the user-info exchange for a bearer token and
//! owns the provider's sign-up and email policies. Errors are a closed set so
//! callers translate them with an exhaustive match.

mod generic;

pub use generic::GenericOAuth;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Provider settings shared by the connector and the bearer client.
#[derive(Clone, Debug)]
pub struct OAuthInfo {
    pub name: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub auth_url: String,
    pub api_url: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub hosted_domain: String,
    pub use_pkce: bool,
    pub allow_sign_up: bool,
    pub allowed_domains: Vec<String>,
    pub allowed_groups: Vec<String>,
}

impl OAuthInfo {
    #[must_use]
    pub fn new(name: &str, client_id: &str, client_secret: SecretString) -> Self {
        Self {
            name: name.to_string(),
            client_id: client_id.to_string(),
            client_secret,
            auth_url: String::new(),
            api_url: String::new(),
            redirect_url: String::new(),
            scopes: Vec::new(),
            hosted_domain: String::new(),
            use_pkce: false,
            allow_sign_up: true,
            allowed_domains: Vec::new(),
            allowed_groups: Vec::new(),
        }
    }
}

/// OAuth2 access token as presented by the client.
#[derive(Clone, Debug)]
pub struct OAuthToken {
    pub token_type: String,
    pub access_token: SecretString,
}

impl OAuthToken {
    #[must_use]
    pub fn bearer(access_token: &str) -> Self {
        Self {
            token_type: "Bearer".to_string(),
            access_token: SecretString::from(access_token.to_string()),
        }
    }
}

/// HTTP transport scoped to one token: every request carries it.
#[derive(Clone, Debug)]
pub struct TokenTransport {
    http: reqwest::Client,
    token: OAuthToken,
}

impl TokenTransport {
    #[must_use]
    pub fn new(http: reqwest::Client, token: OAuthToken) -> Self {
        Self { http, token }
    }

    #[must_use]
    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(self.token.access_token.expose_secret())
    }

    #[must_use]
    pub fn token(&self) -> &OAuthToken {
        &self.token
    }
}

/// Extra parameter appended to the authorization URL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthCodeOption {
    pub key: String,
    pub value: String,
}

impl AuthCodeOption {
    #[must_use]
    pub fn param(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Normalized user info returned by a provider.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BasicUserInfo {
    pub id: String,
    pub name: String,
    pub login: String,
    pub email: String,
    pub role: String,
    pub is_server_admin: Option<bool>,
    pub groups: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SocialError {
    #[error("user not a member of one of the required groups")]
    MissingGroupMembership,
    #[error("access token rejected by provider")]
    InvalidToken,
    #[error("user info request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("user info endpoint returned status {status}")]
    Status { status: u16 },
    #[error("invalid user info payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait SocialConnector: Send + Sync {
    /// Build the transport used for the user-info call.
    fn client(&self, http: &reqwest::Client, token: &OAuthToken) -> TokenTransport {
        TokenTransport::new(http.clone(), token.clone())
    }

    /// Fetch user info for `token`.
    ///
    /// # Errors
    /// Returns a structured `SocialError` when the provider denies the user, or
    /// a transport/decoding error otherwise.
    async fn user_info(
        &self,
        transport: &TokenTransport,
        token: &OAuthToken,
    ) -> Result<BasicUserInfo, SocialError>;

    fn is_email_allowed(&self, email: &str) -> bool;

    fn is_signup_allowed(&self) -> bool;

    fn auth_code_url(&self, state: &str, opts: &[AuthCodeOption]) -> String;
}

/// Email domain policy: empty `allowed_domains` allows everything.
pub(crate) fn is_email_allowed(email: &str, allowed_domains: &[String]) -> bool {
    if allowed_domains.is_empty() {
        return true;
    }
    let email = email.to_lowercase();
    allowed_domains
        .iter()
        .any(|domain| email.ends_with(&format!("@{}", domain.to_lowercase())))
}
