//! Storage and directory collaborator seams, plus in-memory reference
//! implementations for embedding and tests.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::account::Account;

/// Login and email carry storage-level uniqueness constraints; a violation
/// at persist time names the offending field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniqueField {
    Login,
    Email,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            UniqueField::Login => write!(f, "login"),
            UniqueField::Email => write!(f, "email"),
        }
    }
}

/// Error raised by the storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    Conflict(UniqueField),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

type StoreResult<T> = Result<T, StoreError>;

/// Storage collaborator. Each operation is account-scoped and assumed
/// atomic from the store's perspective; `login`/`email` lookups are
/// case-insensitive.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Account>>;
    async fn find_by_login(&self, login: &str)
    -> StoreResult<Option<Account>>;
    async fn find_by_email(&self, email: &str)
    -> StoreResult<Option<Account>>;
    async fn find_by_activation_key(
        &self,
        key: &str,
    ) -> StoreResult<Option<Account>>;
    async fn find_by_reset_key(
        &self,
        key: &str,
    ) -> StoreResult<Option<Account>>;
    /// All unactivated accounts created strictly before `cutoff`.
    async fn find_all_unactivated_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Account>>;
    /// Insert or overwrite by `id`, enforcing login/email uniqueness.
    async fn save(&self, account: &Account) -> StoreResult<()>;
    async fn delete(&self, id: &str) -> StoreResult<()>;
}

/// Role/Org membership resolution. The entities themselves are owned by
/// collaborators; this core only checks that a reference resolves.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn role_exists(&self, id: &str) -> StoreResult<bool>;
    async fn org_exists(&self, id: &str) -> StoreResult<bool>;
}

/// In-process [`AccountStore`] backed by a hash map.
///
/// Uniqueness is checked inside `save` under a single write lock, so a
/// racing second registration of the same login observes a
/// [`StoreError::Conflict`] exactly like a database constraint.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryStore {
    /// Create a new empty [`MemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub fn len(&self) -> usize {
        self.accounts.read().map(|a| a.len()).unwrap_or_default()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(
        &self,
    ) -> StoreResult<std::sync::RwLockReadGuard<'_, HashMap<String, Account>>>
    {
        self.accounts
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }

    fn find_where(
        &self,
        predicate: impl Fn(&Account) -> bool,
    ) -> StoreResult<Option<Account>> {
        Ok(self.read()?.values().find(|a| predicate(a)).cloned())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Account>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn find_by_login(
        &self,
        login: &str,
    ) -> StoreResult<Option<Account>> {
        let login = login.to_lowercase();
        self.find_where(|a| a.login == login)
    }

    async fn find_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<Account>> {
        let email = email.to_lowercase();
        self.find_where(|a| a.email == email)
    }

    async fn find_by_activation_key(
        &self,
        key: &str,
    ) -> StoreResult<Option<Account>> {
        self.find_where(|a| a.activation_key.as_deref() == Some(key))
    }

    async fn find_by_reset_key(
        &self,
        key: &str,
    ) -> StoreResult<Option<Account>> {
        self.find_where(|a| a.reset_key.as_deref() == Some(key))
    }

    async fn find_all_unactivated_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<Account>> {
        Ok(self
            .read()?
            .values()
            .filter(|a| !a.activated && a.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn save(&self, account: &Account) -> StoreResult<()> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?;

        for other in accounts.values() {
            if other.id == account.id {
                continue;
            }
            if other.login.eq_ignore_ascii_case(&account.login) {
                return Err(StoreError::Conflict(UniqueField::Login));
            }
            if other.email.eq_ignore_ascii_case(&account.email) {
                return Err(StoreError::Conflict(UniqueField::Email));
            }
        }

        accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?;
        accounts.remove(id);
        Ok(())
    }
}

/// [`Directory`] over fixed sets of known role and org IDs.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    roles: HashSet<String>,
    orgs: HashSet<String>,
}

impl StaticDirectory {
    /// Create a directory knowing the given role and org IDs.
    pub fn new(
        roles: impl IntoIterator<Item = impl Into<String>>,
        orgs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            orgs: orgs.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn role_exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.roles.contains(id))
    }

    async fn org_exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.orgs.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str, login: &str, email: &str) -> Account {
        Account {
            id: id.into(),
            login: login.into(),
            email: email.into(),
            created_at: Utc::now(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn save_rejects_duplicate_login() {
        let store = MemoryStore::new();
        store
            .save(&account("1", "alice", "alice@example.org"))
            .await
            .unwrap();

        let err = store
            .save(&account("2", "alice", "other@example.org"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueField::Login)));
    }

    #[tokio::test]
    async fn save_rejects_duplicate_email_case_insensitively() {
        let store = MemoryStore::new();
        store
            .save(&account("1", "alice", "alice@example.org"))
            .await
            .unwrap();

        let err = store
            .save(&account("2", "bob", "ALICE@example.org"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueField::Email)));
    }

    #[tokio::test]
    async fn save_overwrites_same_id() {
        let store = MemoryStore::new();
        let mut acc = account("1", "alice", "alice@example.org");
        store.save(&acc).await.unwrap();

        acc.telephone = Some("123".into());
        store.save(&acc).await.unwrap();

        let found = store.find_by_id("1").await.unwrap().unwrap();
        assert_eq!(found.telephone.as_deref(), Some("123"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn lookups_are_case_insensitive() {
        let store = MemoryStore::new();
        store
            .save(&account("1", "alice", "alice@example.org"))
            .await
            .unwrap();

        assert!(store.find_by_login("ALICE").await.unwrap().is_some());
        assert!(
            store
                .find_by_email("Alice@Example.org")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn unactivated_cutoff_filters_by_age_and_state() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut old_stale = account("1", "a", "a@x.org");
        old_stale.created_at = now - chrono::Duration::days(5);
        let mut old_active = account("2", "b", "b@x.org");
        old_active.created_at = now - chrono::Duration::days(5);
        old_active.activated = true;
        let fresh = account("3", "c", "c@x.org");

        for acc in [&old_stale, &old_active, &fresh] {
            store.save(acc).await.unwrap();
        }

        let stale = store
            .find_all_unactivated_before(now - chrono::Duration::days(3))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "1");
    }
}
