use super::crypto::CryptoError;
use crate::session::TokenError;
use crate::social::SocialError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no authentication client applies to this request")]
    NotApplicable,
    #[error("malformed credential: {0}")]
    MalformedCredential(&'static str),
    #[error("failed to get user info: {0}")]
    ProviderUserInfo(#[source] SocialError),
    #[error("provider denied user: {0}")]
    ProviderDenied(#[source] SocialError),
    #[error("required email missing from user info")]
    MissingRequiredEmail,
    #[error("email not allowed")]
    EmailNotAllowed,
    #[error("token needs to be rotated")]
    TokenNeedsRotation,
    #[error("failed to generate pkce code: {0}")]
    PkceGeneration(#[source] CryptoError),
    #[error("failed to generate oauth state: {0}")]
    StateGeneration(#[source] CryptoError),
    #[error("failed to lookup session: {session}")]
    SessionLookup {
        #[source]
        session: TokenError,
        fallback: Option<Box<AuthError>>,
    },
    #[error("authentication canceled")]
    Canceled,
}

impl AuthError {
    /// Signals the caller must route on rather than report as a failure.
    #[must_use]
    pub fn is_control_signal(&self) -> bool {
        matches!(self, Self::NotApplicable | Self::TokenNeedsRotation)
    }

    /// Short label used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotApplicable => "not_applicable",
            Self::MalformedCredential(_) => "malformed_credential",
            Self::ProviderUserInfo(_) => "provider_user_info",
            Self::ProviderDenied(_) => "provider_denied",
            Self::MissingRequiredEmail => "missing_required_email",
            Self::EmailNotAllowed => "email_not_allowed",
            Self::TokenNeedsRotation => "token_needs_rotation",
            Self::PkceGeneration(_) => "pkce_generation",
            Self::StateGeneration(_) => "state_generation",
            Self::SessionLookup { .. } => "session_lookup",
            Self::Canceled => "canceled",
        }
    }
}

impl From<SocialError> for AuthError {
    fn from(err: SocialError) -> Self {
        match err {
            SocialError::MissingGroupMembership | SocialError::InvalidToken => {
                Self::ProviderDenied(err)
            }
            SocialError::Http(_) | SocialError::Status { .. } | SocialError::Decode(_) => {
                Self::ProviderUserInfo(err)
            }
        }
    }
}
