//! Auth-related types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Account;

/// Authority granted to every authenticated account.
pub const DEFAULT_AUTHORITY: &str = "USER";

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account email)
    pub sub: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

impl Claims {
    /// A token is expired from its `exp` second onwards.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// Read-only view of an authenticated account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub account_id: Uuid,
    pub email: String,
    pub name: String,
    pub authorities: Vec<String>,
}

impl Principal {
    pub fn from_account(account: &Account) -> Self {
        Self {
            account_id: account.id,
            email: account.email.clone(),
            name: account.name.clone(),
            authorities: vec![DEFAULT_AUTHORITY.to_string()],
        }
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.iter().any(|a| a == authority)
    }
}

/// Identity asserted by a third-party provider after a successful login.
#[derive(Debug, Clone)]
pub struct FederatedIdentity {
    pub email: String,
    pub name: String,
    pub provider_id: String,
    pub profile_image_url: Option<String>,
}
