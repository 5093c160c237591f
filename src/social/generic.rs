//! Generic OAuth2 connector backed by a JSON user-info endpoint.

use super::{
    is_email_allowed, AuthCodeOption, BasicUserInfo, OAuthInfo, OAuthToken, SocialConnector,
    SocialError, TokenTransport,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

/// Claims read from the user-info payload. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserInfoClaims {
    sub: Option<String>,
    id: Option<Value>,
    login: Option<String>,
    preferred_username: Option<String>,
    name: Option<String>,
    display_name: Option<String>,
    email: Option<String>,
    role: Option<String>,
    #[serde(alias = "grafana_admin")]
    server_admin: Option<bool>,
    groups: Vec<String>,
}

pub struct GenericOAuth {
    info: OAuthInfo,
    auth_url: Url,
}

impl GenericOAuth {
    /// # Errors
    /// Returns an error if the configured authorization URL does not parse.
    pub fn new(info: OAuthInfo) -> Result<Self, url::ParseError> {
        let auth_url = Url::parse(&info.auth_url)?;
        Ok(Self { info, auth_url })
    }

    #[must_use]
    pub fn info(&self) -> &OAuthInfo {
        &self.info
    }

    fn is_group_member(&self, groups: &[String]) -> bool {
        self.info.allowed_groups.is_empty()
            || groups
                .iter()
                .any(|group| self.info.allowed_groups.contains(group))
    }
}

fn map_claims(claims: UserInfoClaims) -> BasicUserInfo {
    let id = claims
        .sub
        .or_else(|| {
            claims.id.map(|id| match id {
                Value::String(s) => s,
                other => other.to_string(),
            })
        })
        .unwrap_or_default();
    let email = claims.email.unwrap_or_default();
    let login = claims
        .login
        .or(claims.preferred_username)
        .unwrap_or_else(|| email.clone());
    let name = claims
        .name
        .or(claims.display_name)
        .unwrap_or_else(|| login.clone());

    BasicUserInfo {
        id,
        name,
        login,
        email,
        role: claims.role.unwrap_or_default(),
        is_server_admin: claims.server_admin,
        groups: claims.groups,
    }
}

#[async_trait]
impl SocialConnector for GenericOAuth {
    #[instrument(skip_all, fields(provider = %self.info.name))]
    async fn user_info(
        &self,
        transport: &TokenTransport,
        _token: &OAuthToken,
    ) -> Result<BasicUserInfo, SocialError> {
        let response = transport.get(&self.info.api_url).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SocialError::InvalidToken);
        }
        if !status.is_success() {
            return Err(SocialError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let claims: UserInfoClaims = serde_json::from_slice(&body)?;
        let info = map_claims(claims);

        if !self.is_group_member(&info.groups) {
            debug!(groups = ?info.groups, "user is not in any allowed group");
            return Err(SocialError::MissingGroupMembership);
        }

        Ok(info)
    }

    fn is_email_allowed(&self, email: &str) -> bool {
        is_email_allowed(email, &self.info.allowed_domains)
    }

    fn is_signup_allowed(&self) -> bool {
        self.info.allow_sign_up
    }

    fn auth_code_url(&self, state: &str, opts: &[AuthCodeOption]) -> String {
        let mut url = self.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.info.client_id)
                .append_pair("response_type", "code");
            if !self.info.redirect_url.is_empty() {
                query.append_pair("redirect_uri", &self.info.redirect_url);
            }
            if !self.info.scopes.is_empty() {
                query.append_pair("scope", &self.info.scopes.join(" "));
            }
            query.append_pair("state", state);
            for opt in opts {
                query.append_pair(&opt.key, &opt.value);
            }
        }
        url.into()
    }
}
