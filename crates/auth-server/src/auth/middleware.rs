//! Bearer-token authentication middleware.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::ApiError;

use super::context::SecurityContext;
use super::error::{AuthError, AuthResult};
use super::jwt::TokenCodec;
use super::provider::AuthenticationProvider;
use super::types::Principal;

const BEARER_PREFIX: &str = "Bearer ";

/// Establishes the identity of a request from its bearer token.
///
/// It never denies access on its own: a missing, foreign-scheme, malformed,
/// forged or expired token leaves the request anonymous, and the
/// authorization gate on protected routes decides what anonymous may do.
pub struct RequestAuthenticator {
    codec: Arc<TokenCodec>,
    provider: Arc<AuthenticationProvider>,
}

impl RequestAuthenticator {
    pub fn new(codec: Arc<TokenCodec>, provider: Arc<AuthenticationProvider>) -> Self {
        Self { codec, provider }
    }

    /// Authenticate one request, populating `context` on success.
    ///
    /// Returns an error only when a valid token names an account that no
    /// longer exists. Other lookup failures leave the request anonymous.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        context: &mut SecurityContext,
    ) -> AuthResult<()> {
        // Authenticated once per request.
        if context.is_authenticated() {
            return Ok(());
        }

        let Some(token) = extract_bearer_token(headers) else {
            return Ok(());
        };

        let subject = match self.codec.verify(token) {
            Ok(subject) => subject,
            Err(e) => {
                debug!(error = %e, "ignoring unusable bearer token");
                return Ok(());
            }
        };

        let principal = match self.provider.load_principal(&subject).await {
            Ok(principal) => principal,
            Err(AuthError::AccountNotFound) => return Err(AuthError::AccountNotFound),
            Err(e) => {
                warn!(error = %e, "could not resolve bearer token subject, continuing anonymously");
                return Ok(());
            }
        };

        if self.still_valid(token, &principal) {
            context.set_principal(principal);
        }

        Ok(())
    }

    /// Second check against the resolved account: the subject must be the
    /// account's email and the token must not have expired since `verify`.
    fn still_valid(&self, token: &str, principal: &Principal) -> bool {
        match self.codec.verify_claims(token) {
            Ok(claims) => claims.sub == principal.email && !claims.is_expired_at(Utc::now()),
            Err(_) => false,
        }
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware function that authenticates every request.
///
/// Use with `axum::middleware::from_fn_with_state`. The request always
/// continues to the next layer unless the token references a vanished
/// account.
pub async fn authenticate_request(
    State(authenticator): State<Arc<RequestAuthenticator>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let mut context = request
        .extensions_mut()
        .remove::<SecurityContext>()
        .unwrap_or_else(SecurityContext::anonymous);

    if let Err(err) = authenticator
        .authenticate(request.headers(), &mut context)
        .await
    {
        if matches!(err, AuthError::AccountNotFound) {
            warn!(
                path = %request.uri().path(),
                "bearer token references an account that no longer exists"
            );
        }
        return Err(ApiError::from(err));
    }

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
