//! User store abstraction.
//!
//! The authentication core only needs three capabilities from persistence:
//! look an account up by email, check whether an email is taken, and save an
//! account. Both implementations enforce email uniqueness (and external
//! provider id uniqueness) at the storage layer, so a lost race between two
//! concurrent writers surfaces as [`StoreError::Conflict`] instead of a
//! duplicate row.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Account;

/// Column whose uniqueness constraint rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    ExternalProviderId,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::Email => write!(f, "email"),
            UniqueField::ExternalProviderId => write!(f, "external provider id"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("{0} already in use")]
    Conflict(UniqueField),

    /// The backing store could not be reached or failed
    #[error("user store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed account repository used by the authentication core.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Get an account by its (unique) email.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    /// Check whether an account with this email exists.
    async fn exists_by_email(&self, email: &str) -> StoreResult<bool>;

    /// Insert the account, or replace the stored one with the same id.
    async fn save(&self, account: Account) -> StoreResult<Account>;
}

/// Process-local store. Used when no database is configured and as the
/// store double in tests.
#[derive(Default)]
pub struct MemoryUserStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    #[cfg(test)]
    pub async fn count_by_email(&self, email: &str) -> usize {
        self.accounts
            .read()
            .await
            .values()
            .filter(|a| a.email == email)
            .count()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn exists_by_email(&self, email: &str) -> StoreResult<bool> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().any(|a| a.email == email))
    }

    async fn save(&self, account: Account) -> StoreResult<Account> {
        // Constraint checks and the insert happen under one write lock.
        let mut accounts = self.accounts.write().await;

        for other in accounts.values().filter(|a| a.id != account.id) {
            if other.email == account.email {
                return Err(StoreError::Conflict(UniqueField::Email));
            }
            if account.external_provider_id.is_some()
                && other.external_provider_id == account.external_provider_id
            {
                return Err(StoreError::Conflict(UniqueField::ExternalProviderId));
            }
        }

        accounts.insert(account.id, account.clone());
        Ok(account)
    }
}

/// Store double whose backend is always down.
#[cfg(test)]
pub struct UnavailableUserStore;

#[cfg(test)]
#[async_trait]
impl UserStore for UnavailableUserStore {
    async fn find_by_email(&self, _email: &str) -> StoreResult<Option<Account>> {
        Err(anyhow::anyhow!("connection refused").into())
    }

    async fn exists_by_email(&self, _email: &str) -> StoreResult<bool> {
        Err(anyhow::anyhow!("connection refused").into())
    }

    async fn save(&self, _account: Account) -> StoreResult<Account> {
        Err(anyhow::anyhow!("connection refused").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio_test::{assert_err, assert_ok};

    fn local(email: &str) -> Account {
        Account::local("Ann", email, "digest".to_string(), Utc::now())
    }

    #[tokio::test]
    async fn save_then_find() {
        let store = MemoryUserStore::new();
        assert!(!store.exists_by_email("a@x.com").await.unwrap());

        let saved = assert_ok!(store.save(local("a@x.com")).await);
        let found = store.find_by_email("a@x.com").await.unwrap();

        assert_eq!(found, Some(saved));
        assert!(store.exists_by_email("a@x.com").await.unwrap());
        assert_eq!(store.find_by_email("b@x.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_with_same_id_updates_in_place() {
        let store = MemoryUserStore::new();
        let mut account = store.save(local("a@x.com")).await.unwrap();

        account.name = "Annie".to_string();
        assert_ok!(store.save(account).await);

        assert_eq!(store.len().await, 1);
        let found = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(found.name, "Annie");
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryUserStore::new();
        store.save(local("a@x.com")).await.unwrap();

        let err = assert_err!(store.save(local("a@x.com")).await);
        assert!(matches!(err, StoreError::Conflict(UniqueField::Email)));
        assert_eq!(store.count_by_email("a@x.com").await, 1);
    }

    #[tokio::test]
    async fn duplicate_provider_id_is_a_conflict() {
        let store = MemoryUserStore::new();
        let first = Account::federated("Ann", "a@x.com", "g-1", None, Utc::now());
        let second = Account::federated("Bob", "b@x.com", "g-1", None, Utc::now());
        store.save(first).await.unwrap();

        let err = assert_err!(store.save(second).await);
        assert!(matches!(
            err,
            StoreError::Conflict(UniqueField::ExternalProviderId)
        ));
    }

    #[tokio::test]
    async fn accounts_without_provider_ids_do_not_collide() {
        let store = MemoryUserStore::new();
        assert_ok!(store.save(local("a@x.com")).await);
        assert_ok!(store.save(local("b@x.com")).await);
        assert_eq!(store.len().await, 2);
    }
}
