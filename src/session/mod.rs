//! Session token persistence contract.
//!
//! The store owns token creation, storage, and rotation. Raw tokens only exist
//! in the cookie and in the value returned right after issue or rotation; the
//! store keeps SHA-256 hashes.

mod memory;

pub use memory::MemoryTokenService;

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeDelta, Utc};
use rand::{rngs::OsRng, RngCore};
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Tokens that were never presented back by a client rotate after this much
/// time regardless of the configured interval.
pub const URGENT_ROTATE_TIME: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("user token not found")]
    NotFound,
    #[error("user token expired")]
    Expired { user_id: i64 },
    #[error("failed to generate session token")]
    Random(#[from] rand::Error),
    #[error("session store error: {0}")]
    Store(String),
}

/// A persisted session token.
#[derive(Clone, Debug)]
pub struct UserToken {
    pub id: Uuid,
    pub user_id: i64,
    /// Hash of the current token.
    pub auth_token: String,
    /// Hash of the token that was replaced by the last rotation.
    pub prev_auth_token: String,
    /// Raw token, only present right after issue or rotation.
    pub unhashed_token: Option<SecretString>,
    pub auth_token_seen: bool,
    pub seen_at: Option<DateTime<Utc>>,
    pub rotated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub client_ip: Option<IpAddr>,
    pub user_agent: String,
}

impl UserToken {
    /// Whether the token is due for rotation given `interval`.
    #[must_use]
    pub fn needs_rotation(&self, interval: Duration) -> bool {
        self.needs_rotation_at(interval, Utc::now())
    }

    #[must_use]
    pub fn needs_rotation_at(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        let interval = if self.auth_token_seen {
            interval
        } else {
            URGENT_ROTATE_TIME
        };
        let Ok(delta) = TimeDelta::from_std(interval) else {
            return false;
        };
        now.checked_sub_signed(delta)
            .is_some_and(|threshold| self.rotated_at < threshold)
    }
}

/// Session persistence service.
///
/// `try_rotate_token` must be atomic per session: when two requests race to
/// rotate the same token only one may produce a new token, the other gets
/// `Ok(None)`.
#[async_trait]
pub trait UserTokenService: Send + Sync {
    /// Issue a fresh token for `user_id`.
    ///
    /// # Errors
    /// Returns an error if the random source fails or the store rejects the write.
    async fn create_token(
        &self,
        user_id: i64,
        client_ip: Option<IpAddr>,
        user_agent: &str,
    ) -> Result<UserToken, TokenError>;

    /// Resolve a raw token from a cookie.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown tokens and `Expired` past the max lifetime.
    async fn lookup_token(&self, unhashed_token: &str) -> Result<UserToken, TokenError>;

    /// Rotate `token` if it is due. Returns the new token when this call
    /// performed the rotation.
    ///
    /// # Errors
    /// Returns an error if the token vanished or the store failed.
    async fn try_rotate_token(
        &self,
        token: &UserToken,
        client_ip: Option<IpAddr>,
        user_agent: &str,
    ) -> Result<Option<UserToken>, TokenError>;

    /// Revoke a token so later lookups fail.
    ///
    /// # Errors
    /// Returns an error if the store failed.
    async fn revoke_token(&self, token: &UserToken) -> Result<(), TokenError>;
}

/// Create a new raw session token for the session cookie.
pub(crate) fn generate_session_token() -> Result<String, TokenError> {
    let mut bytes = [0u8; 32];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a session token so raw values never reach the store.
pub(crate) fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
