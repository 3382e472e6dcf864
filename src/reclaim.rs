//! Reclamation of abandoned unactivated accounts.
//!
//! A recurring sweep deletes accounts that never confirmed their
//! activation key within the staleness threshold. Sweeps never overlap:
//! a trigger firing while one is still running is skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use crate::account::service::AccountService;

/// Per-sweep tally. Failures are per-account and never abort the batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Accounts deleted and evicted.
    pub deleted: usize,
    /// Accounts that failed to delete and were skipped.
    pub failed: usize,
}

/// Result of one sweep trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The sweep ran to completion.
    Completed(SweepReport),
    /// A previous sweep was still running; this trigger did nothing.
    Skipped,
}

/// Drives [`AccountService::reclaim_stale`] from a timer, with a
/// try-lock guard against overlapping sweeps.
pub struct Reclaimer {
    service: AccountService,
    running: AtomicBool,
}

impl Reclaimer {
    /// Create a new [`Reclaimer`].
    pub fn new(service: AccountService) -> Self {
        Self {
            service,
            running: AtomicBool::new(false),
        }
    }

    /// Run one sweep, unless one is already in flight.
    pub async fn sweep(&self) -> SweepOutcome {
        if self
            .running
            .compare_exchange(
                false,
                true,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::warn!(
                "reclamation trigger skipped, previous sweep still running"
            );
            return SweepOutcome::Skipped;
        }

        let report = self.service.reclaim_stale().await;
        self.running.store(false, Ordering::Release);

        tracing::debug!(
            deleted = report.deleted,
            failed = report.failed,
            "reclamation sweep finished"
        );
        SweepOutcome::Completed(report)
    }

    /// Spawn a task triggering a sweep once per day at `hour` (UTC).
    pub fn spawn_daily(
        self: &Arc<Self>,
        hour: u32,
    ) -> tokio::task::JoinHandle<()> {
        let reclaimer = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(until_next_fire(hour)).await;
                reclaimer.sweep().await;
            }
        })
    }
}

/// Time left until the next wall-clock `hour` (UTC).
fn until_next_fire(hour: u32) -> std::time::Duration {
    const FULL_DAY: std::time::Duration =
        std::time::Duration::from_secs(86_400);

    let now = Utc::now();
    let Some(at_hour) = now.date_naive().and_hms_opt(hour.min(23), 0, 0)
    else {
        return FULL_DAY;
    };

    let mut next = at_hour.and_utc();
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or(FULL_DAY)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::sync::Semaphore;

    use super::*;
    use crate::account::Account;
    use crate::account::repository::{
        AccountStore, MemoryStore, StaticDirectory, StoreError,
    };
    use crate::account::service::CallerResolver;
    use crate::cache::{CacheGateway, CacheName};
    use crate::credential::CredentialCodec;
    use crate::sms::{DeliveryError, SmsGateway, SmsVerification};

    struct NoCaller;

    impl CallerResolver for NoCaller {
        fn current_caller_login(&self) -> Option<String> {
            None
        }
    }

    struct NoSms;

    #[async_trait]
    impl SmsGateway for NoSms {
        async fn query_delivery_status(
            &self,
            _phone: &str,
            _date: chrono::NaiveDate,
            _code: &str,
        ) -> Result<SmsVerification, DeliveryError> {
            Ok(SmsVerification::Mismatch)
        }
    }

    #[derive(Default)]
    struct RecordingCache(Mutex<Vec<(CacheName, String)>>);

    #[async_trait]
    impl CacheGateway for RecordingCache {
        async fn evict(&self, cache: CacheName, key: &str) {
            self.0.lock().unwrap().push((cache, key.to_owned()));
        }

        async fn put(&self, _: CacheName, _: &str, _: String) {}

        async fn get(&self, _: CacheName, _: &str) -> Option<String> {
            None
        }
    }

    /// Store whose stale-account query blocks until a permit arrives.
    struct GatedStore {
        inner: MemoryStore,
        gate: Semaphore,
    }

    #[async_trait]
    impl AccountStore for GatedStore {
        async fn find_by_id(
            &self,
            id: &str,
        ) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_login(
            &self,
            login: &str,
        ) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_login(login).await
        }

        async fn find_by_email(
            &self,
            email: &str,
        ) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_activation_key(
            &self,
            key: &str,
        ) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_activation_key(key).await
        }

        async fn find_by_reset_key(
            &self,
            key: &str,
        ) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_reset_key(key).await
        }

        async fn find_all_unactivated_before(
            &self,
            cutoff: DateTime<Utc>,
        ) -> Result<Vec<Account>, StoreError> {
            let permit = self.gate.acquire().await.map_err(|_| {
                StoreError::Unavailable("gate closed".into())
            })?;
            permit.forget();
            self.inner.find_all_unactivated_before(cutoff).await
        }

        async fn save(&self, account: &Account) -> Result<(), StoreError> {
            self.inner.save(account).await
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete(id).await
        }
    }

    /// Store that refuses to delete one poisoned account.
    struct PoisonedStore {
        inner: MemoryStore,
        poisoned: String,
    }

    #[async_trait]
    impl AccountStore for PoisonedStore {
        async fn find_by_id(
            &self,
            id: &str,
        ) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_login(
            &self,
            login: &str,
        ) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_login(login).await
        }

        async fn find_by_email(
            &self,
            email: &str,
        ) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_activation_key(
            &self,
            key: &str,
        ) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_activation_key(key).await
        }

        async fn find_by_reset_key(
            &self,
            key: &str,
        ) -> Result<Option<Account>, StoreError> {
            self.inner.find_by_reset_key(key).await
        }

        async fn find_all_unactivated_before(
            &self,
            cutoff: DateTime<Utc>,
        ) -> Result<Vec<Account>, StoreError> {
            self.inner.find_all_unactivated_before(cutoff).await
        }

        async fn save(&self, account: &Account) -> Result<(), StoreError> {
            self.inner.save(account).await
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            if id == self.poisoned {
                return Err(StoreError::Unavailable("poisoned row".into()));
            }
            self.inner.delete(id).await
        }
    }

    fn service_over(store: Arc<dyn AccountStore>) -> AccountService {
        service_with(store, Arc::new(RecordingCache::default()))
    }

    fn service_with(
        store: Arc<dyn AccountStore>,
        cache: Arc<RecordingCache>,
    ) -> AccountService {
        AccountService::new(
            store,
            Arc::new(StaticDirectory::default()),
            cache,
            CredentialCodec::argon2(None).unwrap(),
            Arc::new(NoSms),
            Arc::new(NoCaller),
        )
    }

    fn account(id: &str, activated: bool, age_days: i64) -> Account {
        Account {
            id: id.into(),
            login: format!("user-{id}"),
            email: format!("user-{id}@example.org"),
            activated,
            created_at: Utc::now() - chrono::Duration::days(age_days),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn sweep_deletes_exactly_the_stale_unactivated_set() {
        let store = Arc::new(MemoryStore::new());
        for acc in [
            account("1", false, 5),
            account("2", false, 4),
            account("3", false, 1),
            account("4", true, 10),
            account("5", true, 0),
        ] {
            store.save(&acc).await.unwrap();
        }

        let cache = Arc::new(RecordingCache::default());
        let reclaimer =
            Reclaimer::new(service_with(store.clone(), cache.clone()));
        let outcome = reclaimer.sweep().await;

        assert_eq!(
            outcome,
            SweepOutcome::Completed(SweepReport {
                deleted: 2,
                failed: 0
            })
        );
        assert_eq!(store.len(), 3);
        {
            let evictions = cache.0.lock().unwrap();
            for login in ["user-1", "user-2"] {
                assert!(
                    evictions
                        .contains(&(CacheName::ByLogin, login.to_owned()))
                );
            }
        }
        assert!(store.find_by_id("1").await.unwrap().is_none());
        assert!(store.find_by_id("2").await.unwrap().is_none());
        for kept in ["3", "4", "5"] {
            assert!(store.find_by_id(kept).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn sweep_continues_past_per_account_failures() {
        let inner = MemoryStore::new();
        for acc in [
            account("1", false, 5),
            account("poison", false, 5),
            account("3", false, 6),
        ] {
            inner.save(&acc).await.unwrap();
        }
        let store = Arc::new(PoisonedStore {
            inner,
            poisoned: "poison".into(),
        });

        let reclaimer = Reclaimer::new(service_over(store.clone()));
        let outcome = reclaimer.sweep().await;

        assert_eq!(
            outcome,
            SweepOutcome::Completed(SweepReport {
                deleted: 2,
                failed: 1
            })
        );
        assert!(store.find_by_id("poison").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn overlapping_trigger_is_skipped() {
        let store = Arc::new(GatedStore {
            inner: MemoryStore::new(),
            gate: Semaphore::new(0),
        });
        let reclaimer =
            Arc::new(Reclaimer::new(service_over(store.clone())));

        let background = tokio::spawn({
            let reclaimer = Arc::clone(&reclaimer);
            async move { reclaimer.sweep().await }
        });
        // Let the background sweep park on the gated query.
        tokio::task::yield_now().await;

        assert_eq!(reclaimer.sweep().await, SweepOutcome::Skipped);

        store.gate.add_permits(1);
        assert!(matches!(
            background.await.unwrap(),
            SweepOutcome::Completed(_)
        ));

        // The guard is released once the sweep finishes.
        store.gate.add_permits(1);
        assert!(matches!(
            reclaimer.sweep().await,
            SweepOutcome::Completed(_)
        ));
    }

    #[test]
    fn next_fire_is_within_a_day() {
        let wait = until_next_fire(1);
        assert!(wait <= std::time::Duration::from_secs(86_400));
    }
}
