//! Per-request security context.
//!
//! A [`SecurityContext`] lives in the request's extensions. It is created by
//! the authentication middleware for every request, read by handlers and the
//! authorization gate, and dropped together with the request, so nothing
//! carries over between requests.

use std::convert::Infallible;

use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;

use super::types::{Principal, DEFAULT_AUTHORITY};

/// Who is making the current request, if anyone.
#[derive(Debug, Clone, Default)]
pub struct SecurityContext {
    principal: Option<Principal>,
}

impl SecurityContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub(crate) fn set_principal(&mut self, principal: Principal) {
        self.principal = Some(principal);
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SecurityContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .unwrap_or_else(SecurityContext::anonymous))
    }
}

/// Extractor that only succeeds for authenticated requests.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SecurityContext>()
            .and_then(SecurityContext::principal)
            .cloned()
            .map(Authenticated)
            .ok_or_else(unauthorized)
    }
}

fn unauthorized() -> ApiError {
    ApiError::Unauthorized("Unauthorized access! Login first".to_string())
}

/// Authorization gate for protected routes.
///
/// Only reads the context established by the authentication middleware;
/// anonymous requests get 401.
pub async fn require_authenticated(request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let allowed = request
        .extensions()
        .get::<SecurityContext>()
        .and_then(SecurityContext::principal)
        .is_some_and(|principal| principal.has_authority(DEFAULT_AUTHORITY));

    if !allowed {
        tracing::debug!(path = %request.uri().path(), "anonymous request to protected route");
        return Err(unauthorized());
    }

    Ok(next.run(request).await)
}
