//! Unified error handling for the HTTP API.
//!
//! Handlers return [`ApiError`], which implements `IntoResponse`, so domain
//! errors convert with `?` into a status code and a JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::error::{AuthError, TokenError};

/// Message for every failed password login. Unknown account and wrong
/// password must look identical to the caller.
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unexpected failure; details are logged, not returned
    #[error("{0}")]
    Internal(#[from] anyhow::Error),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Authentication required but not provided or invalid
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Write rejected by a uniqueness rule
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A dependency such as the user store is down
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The identity provider failed or rejected the exchange
    #[error("Upstream error: {0}")]
    BadGateway(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AccountNotFound | AuthError::BadCredentials => {
                ApiError::Unauthorized(INVALID_CREDENTIALS.to_string())
            }
            AuthError::EmailAlreadyExists => {
                ApiError::Conflict("An account with this email already exists".to_string())
            }
            AuthError::IdentityConflict(field) => {
                ApiError::Conflict(format!("This {} is linked to another account", field))
            }
            AuthError::InvalidInput(msg) => ApiError::BadRequest(msg),
            AuthError::Hashing(e) => ApiError::Internal(anyhow::Error::new(e)),
            AuthError::StoreUnavailable(e) => {
                tracing::error!("User store error: {:?}", e);
                ApiError::ServiceUnavailable("User store unavailable".to_string())
            }
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::BadGateway(msg) => {
                tracing::warn!("Upstream error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Identity provider error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details: None,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UniqueField;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn login_failures_are_indistinguishable() {
        let not_found = ApiError::from(AuthError::AccountNotFound);
        let bad_password = ApiError::from(AuthError::BadCredentials);

        assert_eq!(not_found.to_string(), bad_password.to_string());
        assert_eq!(status_of(AuthError::AccountNotFound), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::BadCredentials), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn auth_errors_map_to_statuses() {
        assert_eq!(status_of(AuthError::EmailAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(
            status_of(AuthError::IdentityConflict(UniqueField::ExternalProviderId)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AuthError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AuthError::StoreUnavailable(anyhow::anyhow!("down"))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(TokenError::Malformed),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
