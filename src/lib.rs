//! # Authgate
//!
//! `authgate` resolves the identity behind an inbound HTTP request. Several
//! authentication clients compete for each request; the one with the lowest
//! priority whose `test` matches is asked to `authenticate`, and every client
//! may then register pre-send hooks on the response.
//!
//! ## Clients
//!
//! - **Bearer (`OAuth2Client`)**: `Authorization: Bearer <token>` is exchanged
//!   with the OAuth provider for user info. Priority `10`.
//! - **Session (`SessionClient`)**: the login cookie is resolved against the
//!   session store. When the lookup fails and an OAuth connector is attached,
//!   the cookie value is tried as a bearer token. Priority `60`.
//!
//! ## Session Rotation
//!
//! Session tokens are rotated from a pre-send hook: after the handler ran and
//! before the response is handed to the transport. Rotation is skipped when the
//! response already started or the request was canceled, and a failed rotation
//! never fails the request.

pub mod authn;
pub mod cli;
pub mod config;
pub mod server;
pub mod session;
pub mod social;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
