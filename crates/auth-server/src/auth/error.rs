//! Error kinds of the authentication core.

use thiserror::Error;

use crate::store::{StoreError, UniqueField};

/// Why a token could not be issued or verified.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Not a parseable `header.claims.signature` structure
    #[error("malformed token")]
    Malformed,

    /// Signature does not match the server key
    #[error("invalid token signature")]
    InvalidSignature,

    /// Signature is valid but the expiry has passed
    #[error("token expired")]
    Expired,

    /// Issue time plus lifetime does not fit in a timestamp
    #[error("token expiry out of range")]
    ExpiryOutOfRange,

    /// Encoding the token failed
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Failures surfaced by login, registration and federated reconciliation.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("account not found")]
    AccountNotFound,

    #[error("bad credentials")]
    BadCredentials,

    #[error("an account with this email already exists")]
    EmailAlreadyExists,

    /// The external identity is already attached to a different account
    #[error("{0} is already linked to another account")]
    IdentityConflict(UniqueField),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("user store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(UniqueField::Email) => AuthError::EmailAlreadyExists,
            StoreError::Conflict(field) => AuthError::IdentityConflict(field),
            StoreError::Unavailable(e) => AuthError::StoreUnavailable(e),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
