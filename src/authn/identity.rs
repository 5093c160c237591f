use crate::session::UserToken;
use crate::social::OAuthToken;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

pub const NAMESPACE_USER: &str = "user";

/// Subject id scoped by namespace, rendered as `<namespace>:<id>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NamespacedId {
    namespace: &'static str,
    id: String,
}

impl NamespacedId {
    #[must_use]
    pub fn user(id: i64) -> Self {
        Self {
            namespace: NAMESPACE_USER,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.namespace
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for NamespacedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrgRole {
    None,
    Viewer,
    Editor,
    Admin,
}

impl OrgRole {
    /// Parse a provider role. Only the canonical spellings are accepted.
    #[must_use]
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "None" => Some(Self::None),
            "Viewer" => Some(Self::Viewer),
            "Editor" => Some(Self::Editor),
            "Admin" => Some(Self::Admin),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Viewer => "Viewer",
            Self::Editor => "Editor",
            Self::Admin => "Admin",
        }
    }
}

/// Keys used to find an existing user during provisioning.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserLookupParams {
    pub email: Option<String>,
}

/// Provisioning policy for an identity.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClientParams {
    pub sync_user: bool,
    pub sync_teams: bool,
    pub fetch_synced_user: bool,
    pub sync_permissions: bool,
    pub sync_org_roles: bool,
    pub allow_sign_up: bool,
    pub lookup_params: UserLookupParams,
}

/// Shared handle to the session token of an identity.
///
/// Cloned identities share the slot, so a rotation is visible to every holder
/// for the rest of the request.
#[derive(Clone, Debug)]
pub struct SessionTokenSlot(Arc<RwLock<UserToken>>);

impl SessionTokenSlot {
    #[must_use]
    pub fn new(token: UserToken) -> Self {
        Self(Arc::new(RwLock::new(token)))
    }

    #[must_use]
    pub fn get(&self) -> UserToken {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, token: UserToken) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

/// Result of a successful authentication.
#[derive(Clone, Debug, Default)]
pub struct Identity {
    pub id: Option<NamespacedId>,
    pub login: String,
    pub name: String,
    pub email: String,
    pub is_server_admin: Option<bool>,
    pub auth_module: String,
    pub auth_id: String,
    pub groups: Vec<String>,
    pub org_roles: BTreeMap<i64, OrgRole>,
    pub oauth_token: Option<OAuthToken>,
    pub session_token: Option<SessionTokenSlot>,
    pub client_params: ClientParams,
}
