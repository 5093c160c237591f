//! Identity of the current request.

use crate::authn::Identity;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityView {
    pub id: Option<String>,
    pub login: String,
    pub name: String,
    pub email: String,
    pub is_server_admin: Option<bool>,
    pub auth_module: String,
    pub auth_id: String,
    pub groups: Vec<String>,
    /// Organization id to role.
    pub org_roles: BTreeMap<String, String>,
    pub allow_sign_up: bool,
    pub session_backed: bool,
}

impl From<&Identity> for IdentityView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.as_ref().map(ToString::to_string),
            login: identity.login.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            is_server_admin: identity.is_server_admin,
            auth_module: identity.auth_module.clone(),
            auth_id: identity.auth_id.clone(),
            groups: identity.groups.clone(),
            org_roles: identity
                .org_roles
                .iter()
                .map(|(org, role)| (org.to_string(), role.as_str().to_string()))
                .collect(),
            allow_sign_up: identity.client_params.allow_sign_up,
            session_backed: identity.session_token.is_some(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/user",
    responses(
        (status = 200, description = "Authenticated identity", body = IdentityView),
        (status = 401, description = "Request is not authenticated")
    ),
    tag = "authn"
)]
pub async fn current_user(identity: Option<Extension<Identity>>) -> impl IntoResponse {
    match identity {
        Some(Extension(identity)) => {
            (StatusCode::OK, Json(IdentityView::from(&identity))).into_response()
        }
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}
