// Account model and its Diesel row mapping
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared_types::{LoginMethod, UserResponse};
use uuid::Uuid;

/// A user identity record.
///
/// `email` is globally unique. `external_provider_id`, when present, is
/// unique as well. `password_hash` is absent for accounts that only ever
/// signed in through a federated provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub external_provider_id: Option<String>,
    pub profile_image_url: Option<String>,
    pub login_method: LoginMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// New account for an email/password registration.
    pub fn local(name: &str, email: &str, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: Some(password_hash),
            external_provider_id: None,
            profile_image_url: None,
            login_method: LoginMethod::Local,
            created_at: now,
            updated_at: now,
        }
    }

    /// New account created on a first federated login. It never gets a
    /// password digest, so local login stays unavailable for it.
    pub fn federated(
        name: &str,
        email: &str,
        external_provider_id: &str,
        profile_image_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: None,
            external_provider_id: Some(external_provider_id.to_string()),
            profile_image_url: profile_image_url.map(str::to_string),
            login_method: LoginMethod::Federated,
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<&Account> for UserResponse {
    fn from(account: &Account) -> Self {
        UserResponse {
            name: account.name.clone(),
            email: account.email.clone(),
            profile_image_url: account.profile_image_url.clone(),
            external_provider_id: account.external_provider_id.clone(),
            login_method: account.login_method,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

/// Database representation of users.
/// `login_method` is stored as its VARCHAR tag.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct AccountRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub external_provider_id: Option<String>,
    pub profile_image_url: Option<String>,
    pub login_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Account> for AccountRow {
    fn from(account: &Account) -> Self {
        AccountRow {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            password_hash: account.password_hash.clone(),
            external_provider_id: account.external_provider_id.clone(),
            profile_image_url: account.profile_image_url.clone(),
            login_method: account.login_method.as_str().to_string(),
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let login_method = LoginMethod::from_str(&row.login_method).ok_or_else(|| {
            anyhow::anyhow!(
                "unknown login method {:?} on account {}",
                row.login_method,
                row.id
            )
        })?;

        Ok(Account {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            external_provider_id: row.external_provider_id,
            profile_image_url: row.profile_image_url,
            login_method,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
