//! Email/password authentication and local registration.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tracing::{info, warn};

use crate::models::Account;
use crate::store::UserStore;

use super::error::{AuthError, AuthResult};
use super::password::PasswordHasher;
use super::types::Principal;

/// Authenticates local credentials against the user store and registers
/// new local accounts.
pub struct AuthenticationProvider {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    /// Digest verified when there is no real one to check, so a missing
    /// account costs as much time as a wrong password.
    dummy_digest: OnceLock<Option<String>>,
}

impl AuthenticationProvider {
    pub fn new(store: Arc<dyn UserStore>, hasher: PasswordHasher) -> Self {
        Self {
            store,
            hasher,
            dummy_digest: OnceLock::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Verify `email`/`password` and return the authenticated principal.
    ///
    /// Read-only. Callers issue the session token from the returned
    /// principal's email, never from the raw request input.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AccountNotFound`] when no account has this email
    /// - [`AuthError::BadCredentials`] when the password does not match, or the
    ///   account has no local password (federated-only)
    /// - [`AuthError::StoreUnavailable`] when the lookup fails
    pub async fn authenticate(&self, email: &str, password: &str) -> AuthResult<Principal> {
        let account = match self.store.find_by_email(email).await? {
            Some(account) => account,
            None => {
                self.burn_verification(password);
                warn!(email = %email, "login attempt for non-existent account");
                return Err(AuthError::AccountNotFound);
            }
        };

        let matched = match account.password_hash.as_deref() {
            Some(digest) => self.hasher.matches(password, digest),
            None => {
                self.burn_verification(password);
                false
            }
        };

        if !matched {
            warn!(account_id = %account.id, email = %email, "login attempt with bad credentials");
            return Err(AuthError::BadCredentials);
        }

        info!(account_id = %account.id, "account authenticated");
        Ok(Principal::from_account(&account))
    }

    /// Create a `LOCAL` account with a hashed password.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidInput`] for a malformed email or blank password/name
    /// - [`AuthError::EmailAlreadyExists`] when the email is taken, including when
    ///   a concurrent registration wins the race at the store
    pub async fn register(&self, email: &str, password: &str, name: &str) -> AuthResult<Account> {
        if !shared_types::is_valid_email(email) {
            return Err(AuthError::InvalidInput("email is not a valid address".to_string()));
        }
        if password.trim().is_empty() {
            return Err(AuthError::InvalidInput("password must not be blank".to_string()));
        }
        if name.trim().is_empty() {
            return Err(AuthError::InvalidInput("name must not be blank".to_string()));
        }

        if self.store.exists_by_email(email).await? {
            warn!(email = %email, "registration for an email that already exists");
            return Err(AuthError::EmailAlreadyExists);
        }

        let digest = self.hasher.hash(password)?;
        let account = self
            .store
            .save(Account::local(name.trim(), email, digest, Utc::now()))
            .await?;

        info!(account_id = %account.id, email = %account.email, "local account registered");
        Ok(account)
    }

    /// Resolve the principal for an already-verified identity.
    pub async fn load_principal(&self, email: &str) -> AuthResult<Principal> {
        self.store
            .find_by_email(email)
            .await?
            .map(|account| Principal::from_account(&account))
            .ok_or(AuthError::AccountNotFound)
    }

    fn burn_verification(&self, password: &str) {
        let dummy = self
            .dummy_digest
            .get_or_init(|| self.hasher.hash("dummy-credential").ok());
        if let Some(digest) = dummy {
            let _ = self.hasher.matches(password, digest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::DEFAULT_AUTHORITY;
    use crate::store::MemoryUserStore;
    use shared_types::LoginMethod;
    use tokio_test::assert_ok;

    fn provider() -> (AuthenticationProvider, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        let provider = AuthenticationProvider::new(store.clone(), PasswordHasher::new(4).unwrap());
        (provider, store)
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let (provider, _) = provider();
        let account = assert_ok!(provider.register("a@x.com", "pw1", "Ann").await);

        assert_eq!(account.email, "a@x.com");
        assert_eq!(account.name, "Ann");
        assert_eq!(account.login_method, LoginMethod::Local);
        assert_eq!(account.created_at, account.updated_at);
        assert_ne!(account.password_hash.as_deref(), Some("pw1"));

        let principal = assert_ok!(provider.authenticate("a@x.com", "pw1").await);
        assert_eq!(principal.email, "a@x.com");
        assert_eq!(principal.account_id, account.id);
        assert!(principal.has_authority(DEFAULT_AUTHORITY));
    }

    #[tokio::test]
    async fn wrong_password_is_bad_credentials() {
        let (provider, _) = provider();
        provider.register("a@x.com", "pw1", "Ann").await.unwrap();

        let err = provider.authenticate("a@x.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::BadCredentials));
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let (provider, _) = provider();
        provider.register("a@x.com", "pw1", "Ann").await.unwrap();

        let err = provider.authenticate("missing@x.com", "pw1").await.unwrap_err();
        assert!(matches!(err, AuthError::AccountNotFound));
    }

    #[tokio::test]
    async fn federated_account_cannot_log_in_locally() {
        let (provider, store) = provider();
        let account = Account::federated("Ann", "a@x.com", "g-1", None, Utc::now());
        store.save(account).await.unwrap();

        for password in ["", "123456", "anything"] {
            let err = provider.authenticate("a@x.com", password).await.unwrap_err();
            assert!(matches!(err, AuthError::BadCredentials));
        }
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let (provider, store) = provider();
        provider.register("a@x.com", "pw1", "Ann").await.unwrap();

        let err = provider.register("a@x.com", "pw2", "Other").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailAlreadyExists));
        assert_eq!(store.count_by_email("a@x.com").await, 1);

        // The first password still works, the second was never stored.
        assert_ok!(provider.authenticate("a@x.com", "pw1").await);
        assert!(provider.authenticate("a@x.com", "pw2").await.is_err());
    }

    #[tokio::test]
    async fn concurrent_registrations_create_one_account() {
        let (provider, store) = provider();
        let provider = Arc::new(provider);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let provider = provider.clone();
                tokio::spawn(async move {
                    provider
                        .register("race@x.com", &format!("pw{i}"), "Racer")
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(AuthError::EmailAlreadyExists) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.count_by_email("race@x.com").await, 1);
    }

    #[tokio::test]
    async fn registration_input_is_validated() {
        let (provider, store) = provider();

        for (email, password, name) in [
            ("not-an-email", "pw1", "Ann"),
            ("a@x.com", "   ", "Ann"),
            ("a@x.com", "pw1", ""),
        ] {
            let err = provider.register(email, password, name).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidInput(_)), "{email} {password:?} {name:?}");
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn load_principal_reports_missing_accounts() {
        let (provider, _) = provider();
        provider.register("a@x.com", "pw1", "Ann").await.unwrap();

        assert_eq!(provider.load_principal("a@x.com").await.unwrap().email, "a@x.com");
        assert!(matches!(
            provider.load_principal("gone@x.com").await,
            Err(AuthError::AccountNotFound)
        ));
    }
}
