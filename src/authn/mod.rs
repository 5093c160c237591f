//! Authentication dispatch.
//!
//! Clients implement the `Client` contract and are registered into a
//! `Service`, which picks at most one of them per request.

pub mod clients;
pub mod cookie;
pub mod crypto;
mod error;
mod identity;
mod request;
mod service;

pub use error::AuthError;
pub use identity::{
    ClientParams, Identity, NamespacedId, OrgRole, SessionTokenSlot, UserLookupParams,
    NAMESPACE_USER,
};
pub use request::{Request, Response, ResponseWriter};
pub use service::Service;

use async_trait::async_trait;
use std::collections::HashMap;

/// Request metadata key holding the module that handled authentication.
pub const META_KEY_AUTH_MODULE: &str = "authn.authModule";

/// Keys of `Redirect::extra`.
pub const KEY_OAUTH_STATE: &str = "state";
pub const KEY_OAUTH_PKCE: &str = "pkce";

/// An authentication mechanism.
///
/// `test` must be cheap and free of side effects; `authenticate` is called at
/// most once per request and only after `test` returned true.
#[async_trait]
pub trait Client: Send + Sync {
    fn name(&self) -> &str;

    /// Lower values are tried first.
    fn priority(&self) -> u32;

    fn test(&self, r: &Request) -> bool;

    /// # Errors
    /// Returns an `AuthError` when the credential is rejected or a collaborator
    /// failed. Control signals are also reported through this channel.
    async fn authenticate(&self, r: &Request) -> Result<Identity, AuthError>;

    /// Runs after a successful authentication, before the handler. Used to
    /// register pre-send callbacks on the response.
    ///
    /// # Errors
    /// Returns an error if the hook could not be installed.
    fn hook(&self, _identity: &Identity, _r: &Request) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Target of an authorization-code flow.
#[derive(Clone, Debug, Default)]
pub struct Redirect {
    pub url: String,
    /// Values the caller stashes until the callback (`state`, `pkce`).
    pub extra: HashMap<String, String>,
}

/// Clients that can start an authorization-code flow.
pub trait RedirectClient: Send + Sync {
    /// # Errors
    /// Returns `PkceGeneration` or `StateGeneration` when random material could
    /// not be produced.
    fn redirect_url(&self, r: &Request) -> Result<Redirect, AuthError>;
}
