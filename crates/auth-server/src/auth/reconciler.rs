//! Merges third-party identities into local accounts.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::models::Account;
use crate::store::UserStore;

use super::error::{AuthError, AuthResult};
use super::types::FederatedIdentity;

pub struct IdentityReconciler {
    store: Arc<dyn UserStore>,
}

impl IdentityReconciler {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Find-or-create the account for a federated login, keyed by email.
    ///
    /// A first login creates a `FEDERATED` account without a password digest.
    /// Later logins attach the provider id, refresh the name and profile image
    /// and advance `updated_at`; an existing local account keeps its login
    /// method and password. Repeating the call with the same identity updates
    /// the same account instead of creating another.
    ///
    /// Two concurrent first logins for one email race at the store; the loser
    /// gets [`AuthError::EmailAlreadyExists`].
    pub async fn reconcile_federated(&self, identity: &FederatedIdentity) -> AuthResult<Account> {
        if !shared_types::is_valid_email(&identity.email) {
            return Err(AuthError::InvalidInput(
                "provider returned an invalid email".to_string(),
            ));
        }
        if identity.provider_id.is_empty() {
            return Err(AuthError::InvalidInput(
                "provider returned no subject id".to_string(),
            ));
        }

        let now = Utc::now();
        let account = match self.store.find_by_email(&identity.email).await? {
            Some(mut account) => {
                account.external_provider_id = Some(identity.provider_id.clone());
                if !identity.name.is_empty() {
                    account.name = identity.name.clone();
                }
                account.profile_image_url = identity.profile_image_url.clone();
                // Clock skew between nodes must not move updated_at backwards.
                account.updated_at = now.max(account.updated_at);
                let account = self.store.save(account).await?;
                info!(account_id = %account.id, "federated identity attached to existing account");
                account
            }
            None => {
                let name = if identity.name.is_empty() {
                    identity.email.as_str()
                } else {
                    identity.name.as_str()
                };
                let account = self
                    .store
                    .save(Account::federated(
                        name,
                        &identity.email,
                        &identity.provider_id,
                        identity.profile_image_url.as_deref(),
                        now,
                    ))
                    .await?;
                info!(account_id = %account.id, "federated account created");
                account
            }
        };

        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::PasswordHasher;
    use crate::auth::provider::AuthenticationProvider;
    use crate::store::{MemoryUserStore, UniqueField};
    use shared_types::LoginMethod;
    use tokio_test::assert_ok;

    fn identity(name: &str, picture: Option<&str>) -> FederatedIdentity {
        FederatedIdentity {
            email: "a@x.com".to_string(),
            name: name.to_string(),
            provider_id: "google-123".to_string(),
            profile_image_url: picture.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn first_login_creates_federated_account() {
        let store = Arc::new(MemoryUserStore::new());
        let reconciler = IdentityReconciler::new(store.clone());

        let account = assert_ok!(
            reconciler
                .reconcile_federated(&identity("Ann", Some("https://img/1")))
                .await
        );

        assert_eq!(account.email, "a@x.com");
        assert_eq!(account.name, "Ann");
        assert_eq!(account.login_method, LoginMethod::Federated);
        assert_eq!(account.password_hash, None);
        assert_eq!(account.external_provider_id.as_deref(), Some("google-123"));
        assert_eq!(account.profile_image_url.as_deref(), Some("https://img/1"));
        assert_eq!(account.created_at, account.updated_at);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn repeated_login_updates_the_same_account() {
        let store = Arc::new(MemoryUserStore::new());
        let reconciler = IdentityReconciler::new(store.clone());

        let first = reconciler
            .reconcile_federated(&identity("Ann", Some("https://img/1")))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = reconciler
            .reconcile_federated(&identity("Annie", Some("https://img/2")))
            .await
            .unwrap();

        assert_eq!(store.count_by_email("a@x.com").await, 1);
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Annie");
        assert_eq!(second.profile_image_url.as_deref(), Some("https://img/2"));
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);

        let stored = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored, second);
    }

    #[tokio::test]
    async fn existing_local_account_keeps_its_password() {
        let store = Arc::new(MemoryUserStore::new());
        let provider = AuthenticationProvider::new(store.clone(), PasswordHasher::new(4).unwrap());
        let reconciler = IdentityReconciler::new(store.clone());
        let local = provider.register("a@x.com", "pw1", "Ann").await.unwrap();

        let merged = reconciler
            .reconcile_federated(&identity("Ann G", None))
            .await
            .unwrap();

        assert_eq!(merged.id, local.id);
        assert_eq!(merged.login_method, LoginMethod::Local);
        assert_eq!(merged.password_hash, local.password_hash);
        assert_eq!(merged.external_provider_id.as_deref(), Some("google-123"));
        assert_ok!(provider.authenticate("a@x.com", "pw1").await);
    }

    #[tokio::test]
    async fn provider_id_owned_by_another_account_is_a_conflict() {
        let store = Arc::new(MemoryUserStore::new());
        let reconciler = IdentityReconciler::new(store.clone());
        reconciler
            .reconcile_federated(&identity("Ann", None))
            .await
            .unwrap();

        let mut other = identity("Bob", None);
        other.email = "b@x.com".to_string();
        let err = reconciler.reconcile_federated(&other).await.unwrap_err();

        assert!(matches!(
            err,
            AuthError::IdentityConflict(UniqueField::ExternalProviderId)
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn blank_name_falls_back_to_email() {
        let store = Arc::new(MemoryUserStore::new());
        let reconciler = IdentityReconciler::new(store);

        let account = reconciler
            .reconcile_federated(&identity("", None))
            .await
            .unwrap();
        assert_eq!(account.name, "a@x.com");
    }

    #[tokio::test]
    async fn invalid_assertions_are_rejected() {
        let store = Arc::new(MemoryUserStore::new());
        let reconciler = IdentityReconciler::new(store.clone());

        let mut bad_email = identity("Ann", None);
        bad_email.email = "nope".to_string();
        let mut no_subject = identity("Ann", None);
        no_subject.provider_id.clear();

        for identity in [bad_email, no_subject] {
            let err = reconciler.reconcile_federated(&identity).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidInput(_)));
        }
        assert_eq!(store.len().await, 0);
    }
}
