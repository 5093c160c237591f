//! In-process session store.
//!
//! Rotation is a compare-and-swap on the current token hash under one lock, so
//! concurrent rotations of the same session produce a single new token.

use super::{
    generate_session_token, hash_session_token, TokenError, UserToken, UserTokenService,
};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use secrecy::SecretString;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub struct MemoryTokenService {
    tokens: Mutex<HashMap<Uuid, UserToken>>,
    rotation_interval: Duration,
    max_lifetime: Duration,
}

impl MemoryTokenService {
    #[must_use]
    pub fn new(rotation_interval: Duration, max_lifetime: Duration) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            rotation_interval,
            max_lifetime,
        }
    }

    fn is_expired(&self, token: &UserToken) -> bool {
        let Ok(lifetime) = TimeDelta::from_std(self.max_lifetime) else {
            return false;
        };
        token
            .created_at
            .checked_add_signed(lifetime)
            .is_some_and(|expires_at| expires_at < Utc::now())
    }
}

#[async_trait]
impl UserTokenService for MemoryTokenService {
    async fn create_token(
        &self,
        user_id: i64,
        client_ip: Option<IpAddr>,
        user_agent: &str,
    ) -> Result<UserToken, TokenError> {
        let raw = generate_session_token()?;
        let now = Utc::now();
        let token = UserToken {
            id: Uuid::new_v4(),
            user_id,
            auth_token: hash_session_token(&raw),
            prev_auth_token: String::new(),
            unhashed_token: None,
            auth_token_seen: false,
            seen_at: None,
            rotated_at: now,
            created_at: now,
            client_ip,
            user_agent: user_agent.to_string(),
        };

        self.tokens.lock().await.insert(token.id, token.clone());
        debug!(user_id, token_id = %token.id, "issued session token");

        Ok(UserToken {
            unhashed_token: Some(SecretString::from(raw)),
            ..token
        })
    }

    async fn lookup_token(&self, unhashed_token: &str) -> Result<UserToken, TokenError> {
        let hashed = hash_session_token(unhashed_token);
        let mut tokens = self.tokens.lock().await;

        let token = tokens
            .values_mut()
            .find(|t| t.auth_token == hashed || t.prev_auth_token == hashed)
            .ok_or(TokenError::NotFound)?;

        if self.is_expired(token) {
            return Err(TokenError::Expired {
                user_id: token.user_id,
            });
        }

        // Only the current token counts as seen; the previous one is a grace
        // window for requests that were in flight during rotation.
        if token.auth_token == hashed && !token.auth_token_seen {
            token.auth_token_seen = true;
            token.seen_at = Some(Utc::now());
        }

        Ok(token.clone())
    }

    async fn try_rotate_token(
        &self,
        token: &UserToken,
        client_ip: Option<IpAddr>,
        user_agent: &str,
    ) -> Result<Option<UserToken>, TokenError> {
        let mut tokens = self.tokens.lock().await;
        let stored = tokens.get_mut(&token.id).ok_or(TokenError::NotFound)?;

        if stored.auth_token != token.auth_token {
            debug!(token_id = %token.id, "token already rotated by another request");
            return Ok(None);
        }

        if !stored.needs_rotation(self.rotation_interval) {
            return Ok(None);
        }

        let raw = generate_session_token()?;
        stored.prev_auth_token =
            std::mem::replace(&mut stored.auth_token, hash_session_token(&raw));
        stored.auth_token_seen = false;
        stored.seen_at = None;
        stored.rotated_at = Utc::now();
        stored.client_ip = client_ip;
        stored.user_agent = user_agent.to_string();

        Ok(Some(UserToken {
            unhashed_token: Some(SecretString::from(raw)),
            ..stored.clone()
        }))
    }

    async fn revoke_token(&self, token: &UserToken) -> Result<(), TokenError> {
        self.tokens.lock().await.remove(&token.id);
        Ok(())
    }
}
