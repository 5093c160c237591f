//! PKCE and OAuth state material.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const CODE_CHALLENGE_METHOD: &str = "S256";

// 96 bytes encode to the 128 character maximum verifier length.
const PKCE_VERIFIER_BYTES: usize = 96;
const STATE_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("random source failed: {0}")]
    Random(#[from] rand::Error),
    #[error("invalid hmac key")]
    InvalidKey,
}

#[derive(Debug)]
pub struct PkceCode {
    pub verifier: String,
    pub challenge: String,
}

#[derive(Debug)]
pub struct OAuthState {
    /// Goes into the redirect URL.
    pub plain: String,
    /// Stored until the callback.
    pub hashed: String,
}

/// # Errors
/// Returns an error if the OS random source fails.
pub fn gen_pkce_code() -> Result<PkceCode, CryptoError> {
    let mut bytes = [0u8; PKCE_VERIFIER_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    let verifier = Base64UrlUnpadded::encode_string(&bytes);
    let challenge = pkce_challenge(&verifier);
    Ok(PkceCode {
        verifier,
        challenge,
    })
}

/// `BASE64URL(SHA256(verifier))` without padding.
#[must_use]
pub fn pkce_challenge(verifier: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(verifier.as_bytes()))
}

/// Create a state value bound to the server secret and the provider's client
/// secret.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn gen_oauth_state(
    secret_key: &SecretString,
    client_secret: &SecretString,
) -> Result<OAuthState, CryptoError> {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    let plain = Base64UrlUnpadded::encode_string(&bytes);
    let hashed = hash_oauth_state(&plain, secret_key, client_secret)?;
    Ok(OAuthState { plain, hashed })
}

/// # Errors
/// Returns `InvalidKey` if the HMAC rejects the key.
pub fn hash_oauth_state(
    state: &str,
    secret_key: &SecretString,
    client_secret: &SecretString,
) -> Result<String, CryptoError> {
    let mac = state_mac(state, secret_key, client_secret)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant time check of a callback state against its stored hash.
#[must_use]
pub fn verify_oauth_state(
    state: &str,
    hashed: &str,
    secret_key: &SecretString,
    client_secret: &SecretString,
) -> bool {
    let Ok(expected) = hex::decode(hashed) else {
        return false;
    };
    state_mac(state, secret_key, client_secret)
        .is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
}

fn state_mac(
    state: &str,
    secret_key: &SecretString,
    client_secret: &SecretString,
) -> Result<HmacSha256, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(secret_key.expose_secret().as_bytes())
        .map_err(|_| CryptoError::InvalidKey)?;
    mac.update(state.as_bytes());
    mac.update(&[0]);
    mac.update(client_secret.expose_secret().as_bytes());
    Ok(mac)
}
