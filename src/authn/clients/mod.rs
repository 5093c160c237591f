//! Built-in authentication clients.

mod oauth2;
mod session;

pub use oauth2::OAuth2Client;
pub use session::{FallbackPolicy, SessionClient};

use super::{AuthError, OrgRole};
use crate::config::AuthConfig;
use crate::social::{BasicUserInfo, OAuthToken, SocialConnector};
use std::collections::BTreeMap;
use tracing::debug;

pub const PRIORITY_OAUTH2: u32 = 10;
pub const PRIORITY_SESSION: u32 = 60;

const CLIENT_PREFIX: &str = "auth.client.";

/// Module tag for a provider: `oauth_<provider>`.
#[must_use]
pub fn module_name(provider: &str) -> String {
    format!(
        "oauth_{}",
        provider.strip_prefix(CLIENT_PREFIX).unwrap_or(provider)
    )
}

/// Token of an `Authorization` header of the exact form `Bearer <token>`.
pub(crate) fn extract_bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    scheme.eq_ignore_ascii_case("bearer").then_some(token)
}

/// Exchange `token` for user info and apply the email checks.
pub(crate) async fn exchange_user_info(
    connector: &dyn SocialConnector,
    http: &reqwest::Client,
    token: &OAuthToken,
) -> Result<BasicUserInfo, AuthError> {
    let transport = connector.client(http, token);
    let info = connector
        .user_info(&transport, token)
        .await
        .map_err(AuthError::from)?;

    if info.email.is_empty() {
        return Err(AuthError::MissingRequiredEmail);
    }

    if !connector.is_email_allowed(&info.email) {
        debug!("email domain rejected by provider policy");
        return Err(AuthError::EmailNotAllowed);
    }

    Ok(info)
}

/// Roles granted by the provider, or nothing when role sync is skipped or the
/// provider sent no usable role.
pub(crate) fn resolve_org_roles(
    cfg: &AuthConfig,
    info: &BasicUserInfo,
) -> (BTreeMap<i64, OrgRole>, Option<bool>) {
    if cfg.oauth_skip_org_role_update_sync() {
        return (BTreeMap::new(), None);
    }
    match OrgRole::parse(&info.role) {
        Some(role) => (
            BTreeMap::from([(cfg.auto_assign_org_id(), role)]),
            info.is_server_admin,
        ),
        None => (BTreeMap::new(), None),
    }
}
