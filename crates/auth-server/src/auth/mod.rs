//! Token-based authentication and authorization.
//!
//! This module provides:
//! - HS256 token issuance and verification ([`TokenCodec`])
//! - bcrypt password hashing ([`PasswordHasher`])
//! - email/password login and registration ([`AuthenticationProvider`])
//! - merging Google identities into local accounts ([`IdentityReconciler`])
//! - `authenticate_request` middleware that fills the per-request [`SecurityContext`]
//! - `require_authenticated` gate for protected routes

mod context;
pub mod error;
pub(crate) mod google;
pub mod handlers;
mod jwt;
mod middleware;
mod password;
mod provider;
mod reconciler;
pub mod types;

pub use context::{require_authenticated, Authenticated, SecurityContext};
pub use google::{GoogleOAuthClient, GoogleOAuthConfig};
pub use jwt::TokenCodec;
pub use middleware::{authenticate_request, RequestAuthenticator};
pub use password::PasswordHasher;
pub use provider::AuthenticationProvider;
pub use reconciler::IdentityReconciler;
pub use types::{FederatedIdentity, Principal};
