//! User repository for database operations.
//!
//! Queries are checked at runtime so the crate builds without a live database.

use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use bankid_gateway_core::{PersonalNumber, UserId, VerifiedUser};

use super::RepositoryError;
use crate::models::user::LocalUser;

/// Storage seam for local users.
///
/// `PgUserStore` is the production implementation; `MemoryUserStore` backs
/// tests and offline runs.
pub trait UserStore: Send + Sync + 'static {
    /// Look up a user by verified identity key.
    fn find_by_personal_number(
        &self,
        personal_number: &PersonalNumber,
    ) -> impl Future<Output = Result<Option<LocalUser>, RepositoryError>> + Send;

    /// Look up a user by ID.
    fn get_by_id(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<LocalUser>, RepositoryError>> + Send;

    /// Create a user from a freshly verified identity.
    ///
    /// Fails with `RepositoryError::Conflict` if the identity key is taken.
    fn insert_verified(
        &self,
        user: &VerifiedUser,
        verified_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<LocalUser, RepositoryError>> + Send;

    /// Overwrite name fields and the verification timestamp of an existing user.
    ///
    /// Fails with `RepositoryError::NotFound` if the user is gone.
    fn refresh_verified(
        &self,
        id: UserId,
        user: &VerifiedUser,
        verified_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<LocalUser, RepositoryError>> + Send;
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    personal_number: Option<String>,
    email: Option<String>,
    name: String,
    given_name: String,
    surname: String,
    identity_verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for LocalUser {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let personal_number = row
            .personal_number
            .as_deref()
            .map(PersonalNumber::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!(
                    "invalid personal number in database: {e}"
                ))
            })?;

        Ok(Self {
            id: UserId::from_uuid(row.id),
            personal_number,
            email: row.email,
            name: row.name,
            given_name: row.given_name,
            surname: row.surname,
            identity_verified_at: row.identity_verified_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str = "id, personal_number, email, name, given_name, surname, \
                            identity_verified_at, created_at, updated_at";

/// `PostgreSQL`-backed user store.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new user store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserStore for PgUserStore {
    async fn find_by_personal_number(
        &self,
        personal_number: &PersonalNumber,
    ) -> Result<Option<LocalUser>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM gateway.user WHERE personal_number = $1"
        ))
        .bind(personal_number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(LocalUser::try_from).transpose()
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<LocalUser>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM gateway.user WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(LocalUser::try_from).transpose()
    }

    async fn insert_verified(
        &self,
        user: &VerifiedUser,
        verified_at: DateTime<Utc>,
    ) -> Result<LocalUser, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            INSERT INTO gateway.user
                (id, personal_number, name, given_name, surname, identity_verified_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(UserId::new().as_uuid())
        .bind(user.personal_number.as_str())
        .bind(&user.name)
        .bind(&user.given_name)
        .bind(&user.surname)
        .bind(verified_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("personal number already exists".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        LocalUser::try_from(row)
    }

    async fn refresh_verified(
        &self,
        id: UserId,
        user: &VerifiedUser,
        verified_at: DateTime<Utc>,
    ) -> Result<LocalUser, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE gateway.user
            SET name = $2,
                given_name = $3,
                surname = $4,
                identity_verified_at = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id.as_uuid())
        .bind(&user.name)
        .bind(&user.given_name)
        .bind(&user.surname)
        .bind(verified_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        LocalUser::try_from(row)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(personal_number: Option<&str>) -> UserRow {
        let now = Utc::now();
        UserRow {
            id: Uuid::new_v4(),
            personal_number: personal_number.map(str::to_owned),
            email: None,
            name: "Jane Doe".to_owned(),
            given_name: "Jane".to_owned(),
            surname: "Doe".to_owned(),
            identity_verified_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_conversion() {
        let user = LocalUser::try_from(row(Some("198001011234"))).unwrap();
        assert_eq!(user.personal_number.unwrap().as_str(), "198001011234");
        assert_eq!(user.name, "Jane Doe");
    }

    #[test]
    fn test_row_with_corrupt_personal_number() {
        let err = LocalUser::try_from(row(Some("garbage"))).unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
    }
}
