//! In-process user store.
//!
//! Enforces the same uniqueness rule as the `gateway.user` table, so the
//! identity resolver's conflict recovery can be exercised without `PostgreSQL`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use bankid_gateway_core::{PersonalNumber, UserId, VerifiedUser};

use super::RepositoryError;
use super::users::UserStore;
use crate::models::user::LocalUser;

/// A `UserStore` kept in memory. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<Mutex<HashMap<UserId, LocalUser>>>,
}

impl MemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// How many users carry `personal_number`. Never more than one.
    #[must_use]
    pub fn count_by_personal_number(&self, personal_number: &PersonalNumber) -> usize {
        self.lock()
            .values()
            .filter(|u| u.personal_number.as_ref() == Some(personal_number))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, LocalUser>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UserStore for MemoryUserStore {
    async fn find_by_personal_number(
        &self,
        personal_number: &PersonalNumber,
    ) -> Result<Option<LocalUser>, RepositoryError> {
        Ok(self
            .lock()
            .values()
            .find(|u| u.personal_number.as_ref() == Some(personal_number))
            .cloned())
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<LocalUser>, RepositoryError> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn insert_verified(
        &self,
        user: &VerifiedUser,
        verified_at: DateTime<Utc>,
    ) -> Result<LocalUser, RepositoryError> {
        let mut users = self.lock();
        if users
            .values()
            .any(|u| u.personal_number.as_ref() == Some(&user.personal_number))
        {
            return Err(RepositoryError::Conflict(
                "personal number already exists".to_owned(),
            ));
        }

        let now = Utc::now();
        let created = LocalUser {
            id: UserId::new(),
            personal_number: Some(user.personal_number.clone()),
            email: None,
            name: user.name.clone(),
            given_name: user.given_name.clone(),
            surname: user.surname.clone(),
            identity_verified_at: Some(verified_at),
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        drop(users);
        Ok(created)
    }

    async fn refresh_verified(
        &self,
        id: UserId,
        user: &VerifiedUser,
        verified_at: DateTime<Utc>,
    ) -> Result<LocalUser, RepositoryError> {
        let mut users = self.lock();
        let existing = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        existing.name.clone_from(&user.name);
        existing.given_name.clone_from(&user.given_name);
        existing.surname.clone_from(&user.surname);
        existing.identity_verified_at = Some(verified_at);
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }
}
