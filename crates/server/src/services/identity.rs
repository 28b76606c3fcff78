//! Identity resolution: verified personal number to local user.
//!
//! Resolution is an upsert keyed by personal number. Two layers keep it from
//! creating duplicates:
//!
//! 1. A per-key async lock serializes resolutions inside this process.
//! 2. The store's unique constraint catches everything else; a conflicting
//!    insert re-reads the winner's row and refreshes it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use bankid_gateway_core::{CompletionData, PersonalNumber, VerifiedUser};

use crate::db::{RepositoryError, UserStore};
use crate::models::user::LocalUser;

/// Errors that can occur while resolving an identity.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The store failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The unique key reported a conflict but the conflicting row is gone.
    #[error("user for {0} vanished during resolution")]
    Vanished(String),
}

type KeyLocks = Mutex<HashMap<PersonalNumber, Arc<tokio::sync::Mutex<()>>>>;

/// Maps completed orders to local users.
pub struct IdentityResolver<S> {
    store: S,
    locks: KeyLocks,
}

impl<S: UserStore> IdentityResolver<S> {
    /// Create a resolver over `store`.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Create or refresh the local user for a completed order.
    ///
    /// Safe to call repeatedly and concurrently with the same payload: the
    /// same user is returned every time and only one row ever exists.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Repository` if the store fails.
    #[instrument(
        skip(self, completion),
        fields(personal_number = %completion.user.personal_number.masked())
    )]
    pub async fn resolve(&self, completion: &CompletionData) -> Result<LocalUser, ResolveError> {
        let user = &completion.user;
        let entry = self.key_lock(&user.personal_number);
        let _guard = entry.lock.lock().await;

        self.upsert(user).await
    }

    async fn upsert(&self, user: &VerifiedUser) -> Result<LocalUser, ResolveError> {
        let now = Utc::now();

        let key = &user.personal_number;
        if let Some(existing) = self.store.find_by_personal_number(key).await? {
            debug!(user_id = %existing.id, "Refreshing verified user");
            return Ok(self.store.refresh_verified(existing.id, user, now).await?);
        }

        match self.store.insert_verified(user, now).await {
            Ok(created) => {
                info!(user_id = %created.id, "Created verified user");
                Ok(created)
            }
            Err(RepositoryError::Conflict(_)) => {
                debug!("Identity key taken concurrently, re-reading");
                let existing = self
                    .store
                    .find_by_personal_number(&user.personal_number)
                    .await?
                    .ok_or_else(|| ResolveError::Vanished(user.personal_number.masked()))?;
                Ok(self.store.refresh_verified(existing.id, user, now).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn key_lock(&self, key: &PersonalNumber) -> KeyLock<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(locks.entry(key.clone()).or_default());
        KeyLock {
            locks: &self.locks,
            key: key.clone(),
            lock,
        }
    }
}

/// A claim on one key's lock. Dropping it, including when the owning future
/// is cancelled mid-wait, removes the table entry once no one else holds it.
struct KeyLock<'a> {
    locks: &'a KeyLocks,
    key: PersonalNumber,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The table and this claim; clones are only taken under the table lock.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bankid_gateway_core::{CertValidity, Device};
    use chrono::Duration;

    use super::*;
    use crate::db::MemoryUserStore;

    fn completion(name: &str) -> CompletionData {
        let now = Utc::now();
        let (given, surname) = name.split_once(' ').unwrap();
        CompletionData {
            user: VerifiedUser {
                personal_number: PersonalNumber::parse("198001011234").unwrap(),
                name: name.to_owned(),
                given_name: given.to_owned(),
                surname: surname.to_owned(),
            },
            device: Device {
                ip_address: "192.0.2.10".to_owned(),
                uhi: None,
            },
            cert: CertValidity {
                not_before: now - Duration::days(1),
                not_after: now + Duration::days(1),
            },
            signature: "sig".to_owned(),
            ocsp_response: "ocsp".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_creates_user() {
        let resolver = IdentityResolver::new(MemoryUserStore::new());
        let user = resolver.resolve(&completion("Jane Doe")).await.unwrap();

        assert_eq!(user.name, "Jane Doe");
        assert_eq!(user.personal_number.unwrap().as_str(), "198001011234");
        assert!(user.identity_verified_at.is_some());
    }

    #[tokio::test]
    async fn test_resolve_twice_is_idempotent() {
        let store = MemoryUserStore::new();
        let resolver = IdentityResolver::new(store.clone());

        let first = resolver.resolve(&completion("Jane Doe")).await.unwrap();
        let second = resolver.resolve(&completion("Jane Doe")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
        assert!(second.identity_verified_at >= first.identity_verified_at);
    }

    #[tokio::test]
    async fn test_refreshes_names() {
        let store = MemoryUserStore::new();
        let resolver = IdentityResolver::new(store.clone());

        let first = resolver.resolve(&completion("Jane Doe")).await.unwrap();
        let renamed = resolver.resolve(&completion("Jane Smith")).await.unwrap();

        assert_eq!(first.id, renamed.id);
        assert_eq!(renamed.surname, "Smith");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolves_share_one_user() {
        let store = MemoryUserStore::new();
        let resolver = Arc::new(IdentityResolver::new(store.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    resolver.resolve(&completion("Jane Doe")).await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }

        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.len(), 1);
        assert!(resolver.locks.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_conflict_recovery_across_resolvers() {
        // Separate resolvers share no lock table, so only the store's unique
        // key stands between them.
        let store = MemoryUserStore::new();
        let a = Arc::new(IdentityResolver::new(store.clone()));
        let b = Arc::new(IdentityResolver::new(store.clone()));

        let payload = completion("Jane Doe");
        let (ra, rb) = tokio::join!(a.resolve(&payload), b.resolve(&payload));

        assert_eq!(ra.unwrap().id, rb.unwrap().id);
        assert_eq!(
            store.count_by_personal_number(&payload.user.personal_number),
            1
        );
    }

    #[tokio::test]
    async fn test_conflict_path_rereads() {
        // Store that hides the first lookup, forcing the insert to conflict.
        struct Blind {
            inner: MemoryUserStore,
            hidden: Mutex<bool>,
        }

        impl UserStore for Blind {
            async fn find_by_personal_number(
                &self,
                pn: &PersonalNumber,
            ) -> Result<Option<LocalUser>, RepositoryError> {
                let hide = std::mem::replace(&mut *self.hidden.lock().unwrap(), false);
                if hide {
                    return Ok(None);
                }
                self.inner.find_by_personal_number(pn).await
            }

            async fn get_by_id(
                &self,
                id: bankid_gateway_core::UserId,
            ) -> Result<Option<LocalUser>, RepositoryError> {
                self.inner.get_by_id(id).await
            }

            async fn insert_verified(
                &self,
                user: &VerifiedUser,
                at: chrono::DateTime<Utc>,
            ) -> Result<LocalUser, RepositoryError> {
                self.inner.insert_verified(user, at).await
            }

            async fn refresh_verified(
                &self,
                id: bankid_gateway_core::UserId,
                user: &VerifiedUser,
                at: chrono::DateTime<Utc>,
            ) -> Result<LocalUser, RepositoryError> {
                self.inner.refresh_verified(id, user, at).await
            }
        }

        let inner = MemoryUserStore::new();
        let existing = inner
            .insert_verified(&completion("Jane Doe").user, Utc::now())
            .await
            .unwrap();

        let resolver = IdentityResolver::new(Blind {
            inner: inner.clone(),
            hidden: Mutex::new(true),
        });
        let user = resolver.resolve(&completion("Jane Doe")).await.unwrap();

        assert_eq!(user.id, existing.id);
        assert_eq!(inner.len(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_resolve_releases_lock_entry() {
        let store = MemoryUserStore::new();
        let resolver = IdentityResolver::new(store.clone());
        let payload = completion("Jane Doe");

        let held = resolver.key_lock(&payload.user.personal_number);
        let guard = held.lock.lock().await;

        // Gives up while queued behind `held`
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            resolver.resolve(&payload),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(Arc::strong_count(&held.lock), 2);

        drop(guard);
        drop(held);
        assert!(resolver.locks.lock().unwrap().is_empty());
        assert!(store.is_empty());

        resolver.resolve(&payload).await.unwrap();
        assert!(resolver.locks.lock().unwrap().is_empty());
    }
}
