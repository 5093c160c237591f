//! Authentication settings and feature toggles.
//!
//! Both are built once at startup and handed to every client; nothing in the
//! authentication path reads global state.

use secrecy::SecretString;
use std::collections::HashSet;
use std::time::Duration;

const DEFAULT_LOGIN_COOKIE_NAME: &str = "authgate_session";
const DEFAULT_LOGIN_MAX_LIFETIME: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const DEFAULT_TOKEN_ROTATION_INTERVAL_MINUTES: u64 = 10;
const DEFAULT_AUTO_ASSIGN_ORG_ID: i64 = 1;

/// Rotate session tokens on every request from the client side instead of the
/// server-side pre-send hook.
pub const FLAG_CLIENT_TOKEN_ROTATION: &str = "clientTokenRotation";

/// `SameSite` attribute written on the session cookie.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
    /// Do not emit the attribute at all.
    Disabled,
}

impl SameSite {
    /// Parse the CLI representation (`lax`, `strict`, `none`, `disabled`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "lax" => Some(Self::Lax),
            "strict" => Some(Self::Strict),
            "none" => Some(Self::None),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_attribute(self) -> Option<&'static str> {
        match self {
            Self::Lax => Some("Lax"),
            Self::Strict => Some("Strict"),
            Self::None => Some("None"),
            Self::Disabled => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    login_cookie_name: String,
    login_max_lifetime: Duration,
    cookie_path: String,
    cookie_secure: bool,
    cookie_same_site: SameSite,
    secret_key: SecretString,
    token_rotation_interval_minutes: u64,
    oauth_skip_org_role_update_sync: bool,
    oauth_allow_insecure_email_lookup: bool,
    auto_assign_org_id: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            login_cookie_name: DEFAULT_LOGIN_COOKIE_NAME.to_string(),
            login_max_lifetime: DEFAULT_LOGIN_MAX_LIFETIME,
            cookie_path: "/".to_string(),
            cookie_secure: false,
            cookie_same_site: SameSite::default(),
            secret_key,
            token_rotation_interval_minutes: DEFAULT_TOKEN_ROTATION_INTERVAL_MINUTES,
            oauth_skip_org_role_update_sync: false,
            oauth_allow_insecure_email_lookup: false,
            auto_assign_org_id: DEFAULT_AUTO_ASSIGN_ORG_ID,
        }
    }

    #[must_use]
    pub fn with_login_cookie_name(mut self, name: String) -> Self {
        self.login_cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_login_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.login_max_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_cookie_path(mut self, path: String) -> Self {
        self.cookie_path = path;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_token_rotation_interval_minutes(mut self, minutes: u64) -> Self {
        self.token_rotation_interval_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_oauth_skip_org_role_update_sync(mut self, skip: bool) -> Self {
        self.oauth_skip_org_role_update_sync = skip;
        self
    }

    #[must_use]
    pub fn with_oauth_allow_insecure_email_lookup(mut self, allow: bool) -> Self {
        self.oauth_allow_insecure_email_lookup = allow;
        self
    }

    #[must_use]
    pub fn with_auto_assign_org_id(mut self, org_id: i64) -> Self {
        self.auto_assign_org_id = org_id;
        self
    }

    /// Name of the session cookie. Empty disables the session client.
    #[must_use]
    pub fn login_cookie_name(&self) -> &str {
        &self.login_cookie_name
    }

    #[must_use]
    pub fn login_max_lifetime(&self) -> Duration {
        self.login_max_lifetime
    }

    #[must_use]
    pub fn cookie_path(&self) -> &str {
        &self.cookie_path
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn cookie_same_site(&self) -> SameSite {
        self.cookie_same_site
    }

    #[must_use]
    pub fn secret_key(&self) -> &SecretString {
        &self.secret_key
    }

    #[must_use]
    pub fn token_rotation_interval(&self) -> Duration {
        Duration::from_secs(self.token_rotation_interval_minutes.saturating_mul(60))
    }

    #[must_use]
    pub fn oauth_skip_org_role_update_sync(&self) -> bool {
        self.oauth_skip_org_role_update_sync
    }

    #[must_use]
    pub fn oauth_allow_insecure_email_lookup(&self) -> bool {
        self.oauth_allow_insecure_email_lookup
    }

    #[must_use]
    pub fn auto_assign_org_id(&self) -> i64 {
        self.auto_assign_org_id
    }
}

/// Snapshot of enabled feature flags, taken at startup.
#[derive(Clone, Debug, Default)]
pub struct FeatureToggles {
    enabled: HashSet<String>,
}

impl FeatureToggles {
    /// Parse a comma separated list such as `clientTokenRotation,other`.
    #[must_use]
    pub fn from_list(list: &str) -> Self {
        let enabled = list
            .split(',')
            .map(str::trim)
            .filter(|flag| !flag.is_empty())
            .map(ToString::to_string)
            .collect();
        Self { enabled }
    }

    #[must_use]
    pub fn with_flag(mut self, flag: &str) -> Self {
        self.enabled.insert(flag.to_string());
        self
    }

    #[must_use]
    pub fn is_enabled(&self, flag: &str) -> bool {
        self.enabled.contains(flag)
    }
}
