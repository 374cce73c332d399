use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection, RunQueryDsl,
};

use crate::models::{Account, AccountRow};
use crate::store::{StoreError, StoreResult, UniqueField, UserStore};

pub type DbPool = Pool<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    // The connection future drives the socket; it ends when the client is dropped.
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    AsyncPgConnection::try_from(client).await
}

pub fn establish_connection_pool(database_url: &str, use_tls: bool) -> anyhow::Result<DbPool> {
    let config = if use_tls {
        let mut manager_config = ManagerConfig::default();
        manager_config.custom_setup =
            Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));
        AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
            database_url,
            manager_config,
        )
    } else {
        AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url)
    };

    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

// User account database operations
pub mod users {
    use super::*;

    pub async fn get_by_email(
        conn: &mut AsyncPgConnection,
        email_addr: &str,
    ) -> Result<Option<AccountRow>, DieselError> {
        use crate::schema::users::dsl::*;

        users
            .filter(email.eq(email_addr))
            .select(AccountRow::as_select())
            .first::<AccountRow>(conn)
            .await
            .optional()
    }

    pub async fn exists_by_email(
        conn: &mut AsyncPgConnection,
        email_addr: &str,
    ) -> Result<bool, DieselError> {
        use crate::schema::users::dsl::*;

        diesel::select(diesel::dsl::exists(users.filter(email.eq(email_addr))))
            .get_result::<bool>(conn)
            .await
    }

    /// Insert the row, or overwrite every column of the row with the same id.
    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        row: &AccountRow,
    ) -> Result<AccountRow, DieselError> {
        use crate::schema::users::dsl::*;

        diesel::insert_into(users)
            .values(row)
            .on_conflict(id)
            .do_update()
            .set(row)
            .returning(AccountRow::as_returning())
            .get_result::<AccountRow>(conn)
            .await
    }
}

/// [`UserStore`] backed by the `users` table.
#[derive(Clone)]
pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(
        &self,
    ) -> StoreResult<diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(anyhow::anyhow!("connection pool: {}", e)))
    }
}

fn map_diesel_error(err: DieselError) -> StoreError {
    if let DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) = &err {
        let field = match info.constraint_name() {
            Some(name) if name.contains("external_provider_id") => {
                Some(UniqueField::ExternalProviderId)
            }
            Some(name) if name.contains("email") => Some(UniqueField::Email),
            _ => None,
        };
        if let Some(field) = field {
            return StoreError::Conflict(field);
        }
    }
    StoreError::Unavailable(err.into())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let mut conn = self.conn().await?;
        let row = users::get_by_email(&mut conn, email)
            .await
            .map_err(map_diesel_error)?;

        row.map(Account::try_from)
            .transpose()
            .map_err(StoreError::Unavailable)
    }

    async fn exists_by_email(&self, email: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        users::exists_by_email(&mut conn, email)
            .await
            .map_err(map_diesel_error)
    }

    async fn save(&self, account: Account) -> StoreResult<Account> {
        let mut conn = self.conn().await?;
        let row = users::upsert(&mut conn, &AccountRow::from(&account))
            .await
            .map_err(map_diesel_error)?;

        Account::try_from(row).map_err(StoreError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Violation(&'static str);

    impl diesel::result::DatabaseErrorInformation for Violation {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }
        fn details(&self) -> Option<&str> {
            None
        }
        fn hint(&self) -> Option<&str> {
            None
        }
        fn table_name(&self) -> Option<&str> {
            Some("users")
        }
        fn column_name(&self) -> Option<&str> {
            None
        }
        fn constraint_name(&self) -> Option<&str> {
            Some(self.0)
        }
        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    fn unique_violation(constraint: &'static str) -> DieselError {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, Box::new(Violation(constraint)))
    }

    #[test]
    fn unique_violations_map_to_conflicts() {
        assert!(matches!(
            map_diesel_error(unique_violation("users_email_key")),
            StoreError::Conflict(UniqueField::Email)
        ));
        assert!(matches!(
            map_diesel_error(unique_violation("users_external_provider_id_key")),
            StoreError::Conflict(UniqueField::ExternalProviderId)
        ));
    }

    #[test]
    fn other_errors_mean_unavailable() {
        assert!(matches!(
            map_diesel_error(DieselError::NotFound),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_diesel_error(unique_violation("users_pkey")),
            StoreError::Unavailable(_)
        ));
    }
}
