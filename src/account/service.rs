//! Account lifecycle engine.
//!
//! Every successful mutation persists through the storage collaborator
//! first, then evicts the affected lookup-cache entries. Eviction is
//! best-effort; the cache is never a source of truth.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::account::repository::{AccountStore, Directory};
use crate::account::{
    Account, AccountDraft, DEFAULT_LOCALE, ManagedUpdate, PASSWORD_UNCHANGED,
    ProfileUpdate,
};
use crate::cache::{CacheGateway, CacheName};
use crate::config;
use crate::credential::CredentialCodec;
use crate::error::{LifecycleError, Result};
use crate::reclaim::SweepReport;
use crate::sms::{SmsGateway, SmsVerification};
use crate::token::TokenGenerator;

/// Reset keys are consumable for 24 hours after issuance; expiry is
/// evaluated at consumption time.
pub const RESET_WINDOW_SECS: i64 = 86_400;
/// Unactivated accounts older than this are eligible for reclamation.
pub const STALE_AFTER_DAYS: i64 = 3;

/// Resolves the login of the caller behind the current request. Consumed
/// by all self-service operations.
pub trait CallerResolver: Send + Sync {
    /// Login of the current caller, if any is authenticated.
    fn current_caller_login(&self) -> Option<String>;
}

/// Contact detail changed through an out-of-band verification code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactKind {
    Phone,
    Email,
}

/// Service managing account records.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    directory: Arc<dyn Directory>,
    cache: Arc<dyn CacheGateway>,
    codec: CredentialCodec,
    tokens: TokenGenerator,
    sms: Arc<dyn SmsGateway>,
    caller: Arc<dyn CallerResolver>,
    delivery_timeout: Duration,
}

impl AccountService {
    /// Create a new [`AccountService`] over its collaborators.
    pub fn new(
        store: Arc<dyn AccountStore>,
        directory: Arc<dyn Directory>,
        cache: Arc<dyn CacheGateway>,
        codec: CredentialCodec,
        sms: Arc<dyn SmsGateway>,
        caller: Arc<dyn CallerResolver>,
    ) -> Self {
        Self {
            store,
            directory,
            cache,
            codec,
            tokens: TokenGenerator::new(),
            sms,
            caller,
            delivery_timeout: Duration::from_secs(
                config::DEFAULT_DELIVERY_TIMEOUT_SECS,
            ),
        }
    }

    /// Bound applied to delivery-provider calls.
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Self-service registration. The account starts unactivated with a
    /// fresh activation key.
    ///
    /// A colliding login or email belonging to an **activated** account
    /// fails; an unactivated collision is displaced, so an abandoned
    /// unconfirmed registration never squats a name.
    pub async fn register_self(
        &self,
        draft: AccountDraft,
        password: &str,
    ) -> Result<Account> {
        let login = draft.login.to_lowercase();
        let email = draft.email.to_lowercase();

        if let Some(existing) = self.store.find_by_login(&login).await? {
            if existing.activated {
                return Err(LifecycleError::LoginAlreadyUsed);
            }
            self.discard_unactivated(&existing).await?;
        }
        if let Some(existing) = self.store.find_by_email(&email).await? {
            if existing.activated {
                return Err(LifecycleError::EmailAlreadyUsed);
            }
            self.discard_unactivated(&existing).await?;
        }

        let (roles, orgs) =
            self.resolve_memberships(&draft.roles, &draft.orgs).await?;
        let account = Account {
            id: self.tokens.new_account_id(),
            login,
            email,
            telephone: draft.telephone,
            credential_hash: self.codec.hash(password)?,
            credential_strength: self.codec.classify(password),
            activated: false,
            activation_key: Some(self.tokens.new_activation_key()),
            reset_key: None,
            reset_issued_at: None,
            created_at: Utc::now(),
            display_name: draft.display_name,
            nickname: draft.nickname,
            avatar: draft.avatar,
            summary: draft.summary,
            address: draft.address,
            locale: draft.locale.unwrap_or_else(|| DEFAULT_LOCALE.into()),
            roles,
            orgs,
        };

        // The pre-checks above race with concurrent registrations; the
        // store's uniqueness constraints are the authoritative gate.
        self.store
            .save(&account)
            .await
            .map_err(LifecycleError::from_persist)?;
        self.evict_lookup_caches(&account).await;
        tracing::debug!(
            login = %account.login,
            "registered account pending activation"
        );
        Ok(account)
    }

    /// Administrative creation. The record gets a random initial
    /// password and an already-issued reset key, so the owner bootstraps
    /// a credential through the reset flow. `activated` is taken from
    /// the draft directly; no activation-key workflow applies.
    ///
    /// No collision pre-check runs; a login/email uniqueness violation
    /// raised by the store still surfaces as the matching typed error.
    pub async fn create_managed(
        &self,
        draft: AccountDraft,
    ) -> Result<Account> {
        let initial_password = self.tokens.new_initial_password();
        let (roles, orgs) =
            self.resolve_memberships(&draft.roles, &draft.orgs).await?;

        let account = Account {
            id: self.tokens.new_account_id(),
            login: draft.login.to_lowercase(),
            email: draft.email.to_lowercase(),
            telephone: draft.telephone,
            credential_hash: self.codec.hash(&initial_password)?,
            credential_strength: self.codec.classify(&initial_password),
            activated: draft.activated,
            activation_key: None,
            reset_key: Some(self.tokens.new_reset_key()),
            reset_issued_at: Some(Utc::now()),
            created_at: Utc::now(),
            display_name: draft.display_name,
            nickname: draft.nickname,
            avatar: draft.avatar,
            summary: draft.summary,
            address: draft.address,
            locale: draft.locale.unwrap_or_else(|| DEFAULT_LOCALE.into()),
            roles,
            orgs,
        };

        self.store
            .save(&account)
            .await
            .map_err(LifecycleError::from_persist)?;
        self.evict_lookup_caches(&account).await;
        tracing::debug!(login = %account.login, "created managed account");
        Ok(account)
    }

    /// Consume an activation key. The key is cleared atomically with
    /// setting `activated`, so a second call with the same key fails.
    /// Activation keys carry no expiry; they live until consumed or the
    /// account is reclaimed.
    pub async fn activate(&self, key: &str) -> Result<Account> {
        let Some(mut account) =
            self.store.find_by_activation_key(key).await?
        else {
            return Err(LifecycleError::InvalidOrExpiredToken);
        };

        account.activated = true;
        account.activation_key = None;
        self.store
            .save(&account)
            .await
            .map_err(LifecycleError::from_persist)?;
        self.evict_lookup_caches(&account).await;
        tracing::debug!(login = %account.login, "activated account");
        Ok(account)
    }

    /// Issue a reset key for an activated account.
    ///
    /// An unknown email and a not-yet-activated account both report
    /// [`LifecycleError::NotFound`], so a prober cannot enumerate
    /// accounts. Key delivery belongs to an external collaborator.
    pub async fn request_reset(&self, email: &str) -> Result<Account> {
        let Some(mut account) =
            self.store.find_by_email(&email.to_lowercase()).await?
        else {
            return Err(LifecycleError::NotFound);
        };
        if !account.activated {
            return Err(LifecycleError::NotFound);
        }

        account.reset_key = Some(self.tokens.new_reset_key());
        account.reset_issued_at = Some(Utc::now());
        self.store
            .save(&account)
            .await
            .map_err(LifecycleError::from_persist)?;
        self.evict_lookup_caches(&account).await;
        tracing::debug!(login = %account.login, "issued password reset key");
        Ok(account)
    }

    /// Consume a reset key and store a new credential. Fails when the
    /// key is unknown or older than the 24-hour window.
    pub async fn complete_reset(
        &self,
        key: &str,
        new_password: &str,
    ) -> Result<Account> {
        let Some(mut account) = self.store.find_by_reset_key(key).await?
        else {
            return Err(LifecycleError::InvalidOrExpiredToken);
        };
        let issued_at = account
            .reset_issued_at
            .ok_or(LifecycleError::InvalidOrExpiredToken)?;
        if Utc::now() - issued_at
            >= chrono::Duration::seconds(RESET_WINDOW_SECS)
        {
            return Err(LifecycleError::InvalidOrExpiredToken);
        }

        account.credential_hash = self.codec.hash(new_password)?;
        account.credential_strength = self.codec.classify(new_password);
        account.reset_key = None;
        account.reset_issued_at = None;
        self.store
            .save(&account)
            .await
            .map_err(LifecycleError::from_persist)?;
        self.evict_lookup_caches(&account).await;
        tracing::debug!(login = %account.login, "completed password reset");
        Ok(account)
    }

    /// Replace the caller's own profile fields. Credential, identity and
    /// membership fields are untouchable here.
    pub async fn update_as_caller(
        &self,
        profile: ProfileUpdate,
    ) -> Result<Account> {
        let login = self.caller_login()?;
        let Some(mut account) = self.store.find_by_login(&login).await?
        else {
            return Err(LifecycleError::NotFound);
        };

        account.display_name = profile.display_name;
        account.nickname = profile.nickname;
        account.avatar = profile.avatar;
        account.summary = profile.summary;
        account.address = profile.address;
        if let Some(locale) = profile.locale {
            account.locale = locale;
        }

        self.store
            .save(&account)
            .await
            .map_err(LifecycleError::from_persist)?;
        self.evict_lookup_caches(&account).await;
        tracing::debug!(login = %account.login, "updated caller profile");
        Ok(account)
    }

    /// Administrative full replace of one account.
    ///
    /// The pre-mutation login/email cache entries are evicted before the
    /// record changes, covering the case where the identity itself
    /// moves. Membership sets are cleared and rebuilt from the supplied
    /// IDs. The stored digest only changes when the supplied password
    /// differs from [`PASSWORD_UNCHANGED`].
    pub async fn update_managed(
        &self,
        update: ManagedUpdate,
    ) -> Result<Account> {
        let Some(current) = self.store.find_by_id(&update.id).await? else {
            return Err(LifecycleError::NotFound);
        };
        self.evict_lookup_caches(&current).await;

        let mut account = current;
        account.login = update.login.to_lowercase();
        account.email = update.email.to_lowercase();
        if update.password != PASSWORD_UNCHANGED {
            account.credential_hash = self.codec.hash(&update.password)?;
            account.credential_strength =
                self.codec.classify(&update.password);
        }
        account.telephone = update.telephone;
        account.display_name = update.display_name;
        account.nickname = update.nickname;
        account.avatar = update.avatar;
        account.summary = update.summary;
        account.address = update.address;
        account.activated = update.activated;
        if let Some(locale) = update.locale {
            account.locale = locale;
        }
        let (roles, orgs) =
            self.resolve_memberships(&update.roles, &update.orgs).await?;
        account.roles = roles;
        account.orgs = orgs;

        self.store
            .save(&account)
            .await
            .map_err(LifecycleError::from_persist)?;
        self.evict_lookup_caches(&account).await;
        tracing::debug!(login = %account.login, "replaced managed account");
        Ok(account)
    }

    /// Physically delete the account behind `login`.
    pub async fn delete(&self, login: &str) -> Result<()> {
        let Some(account) =
            self.store.find_by_login(&login.to_lowercase()).await?
        else {
            return Err(LifecycleError::NotFound);
        };

        self.store.delete(&account.id).await?;
        self.evict_lookup_caches(&account).await;
        tracing::debug!(login = %account.login, "deleted account");
        Ok(())
    }

    /// Rotate the caller's credential after verifying the current one.
    pub async fn change_credential(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let login = self.caller_login()?;
        let Some(mut account) = self.store.find_by_login(&login).await?
        else {
            return Err(LifecycleError::NotFound);
        };

        if !self
            .codec
            .verify(current_password, &account.credential_hash)
        {
            return Err(LifecycleError::InvalidCredential);
        }

        account.credential_hash = self.codec.hash(new_password)?;
        account.credential_strength = self.codec.classify(new_password);
        self.store
            .save(&account)
            .await
            .map_err(LifecycleError::from_persist)?;
        self.evict_lookup_caches(&account).await;
        tracing::debug!(login = %account.login, "changed credential");
        Ok(())
    }

    /// Change a contact detail gated by an out-of-band verification
    /// code.
    ///
    /// A code mismatch is a silent no-op, not an error: the caller
    /// learns nothing about the pending verification state. Provider
    /// timeouts and failures surface as
    /// [`LifecycleError::VerificationUnavailable`].
    pub async fn change_contact(
        &self,
        kind: ContactKind,
        new_value: &str,
        code: &str,
    ) -> Result<()> {
        let login = self.caller_login()?;
        let Some(mut account) = self.store.find_by_login(&login).await?
        else {
            return Err(LifecycleError::NotFound);
        };

        match kind {
            ContactKind::Phone => {
                let today = Utc::now().date_naive();
                let verdict = match tokio::time::timeout(
                    self.delivery_timeout,
                    self.sms.query_delivery_status(new_value, today, code),
                )
                .await
                {
                    Err(_elapsed) => {
                        tracing::warn!(
                            login = %account.login,
                            "sms provider timed out"
                        );
                        return Err(LifecycleError::VerificationUnavailable);
                    },
                    Ok(Err(err)) => {
                        tracing::warn!(
                            login = %account.login,
                            error = %err,
                            "sms provider failed"
                        );
                        return Err(LifecycleError::VerificationUnavailable);
                    },
                    Ok(Ok(verdict)) => verdict,
                };

                if verdict != SmsVerification::Match {
                    tracing::debug!(
                        login = %account.login,
                        "sms code mismatch, phone unchanged"
                    );
                    return Ok(());
                }

                account.telephone = Some(new_value.to_owned());
                self.store
                    .save(&account)
                    .await
                    .map_err(LifecycleError::from_persist)?;
                self.evict_lookup_caches(&account).await;
                tracing::debug!(login = %account.login, "changed phone");
            },
            ContactKind::Email => {
                let expected = self
                    .cache
                    .get(CacheName::EmailCaptcha, &account.login)
                    .await;
                if expected.as_deref() != Some(code) {
                    tracing::debug!(
                        login = %account.login,
                        "email captcha mismatch, email unchanged"
                    );
                    return Ok(());
                }

                let old_email = account.email.clone();
                account.email = new_value.to_lowercase();
                self.store
                    .save(&account)
                    .await
                    .map_err(LifecycleError::from_persist)?;
                self.cache.evict(CacheName::ByEmail, &old_email).await;
                self.evict_lookup_caches(&account).await;
                tracing::debug!(login = %account.login, "changed email");
            },
        }

        Ok(())
    }

    /// Pure verification of the caller's current credential. No
    /// mutation, no cache effect; any resolution failure is `false`.
    pub async fn check_current_credential(&self, candidate: &str) -> bool {
        let Some(login) = self.caller.current_caller_login() else {
            return false;
        };

        match self.store.find_by_login(&login).await {
            Ok(Some(account)) => {
                self.codec.verify(candidate, &account.credential_hash)
            },
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "credential check failed, storage unavailable"
                );
                false
            },
        }
    }

    /// Delete every unactivated account older than
    /// [`STALE_AFTER_DAYS`]. Each delete+evict is its own unit; a
    /// failure is logged and the sweep continues.
    pub async fn reclaim_stale(&self) -> SweepReport {
        let cutoff =
            Utc::now() - chrono::Duration::days(STALE_AFTER_DAYS);
        let stale =
            match self.store.find_all_unactivated_before(cutoff).await {
                Ok(accounts) => accounts,
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        "reclamation query failed"
                    );
                    return SweepReport::default();
                },
            };

        let mut report = SweepReport::default();
        for account in stale {
            match self.store.delete(&account.id).await {
                Ok(()) => {
                    self.evict_lookup_caches(&account).await;
                    tracing::debug!(
                        login = %account.login,
                        "reclaimed unactivated account"
                    );
                    report.deleted += 1;
                },
                Err(err) => {
                    tracing::warn!(
                        login = %account.login,
                        error = %err,
                        "failed to reclaim account, continuing sweep"
                    );
                    report.failed += 1;
                },
            }
        }
        report
    }

    fn caller_login(&self) -> Result<String> {
        self.caller
            .current_caller_login()
            .ok_or(LifecycleError::NotFound)
    }

    /// Delete an unactivated collision and drop its cache entries.
    async fn discard_unactivated(&self, existing: &Account) -> Result<()> {
        self.store.delete(&existing.id).await?;
        self.evict_lookup_caches(existing).await;
        tracing::debug!(
            login = %existing.login,
            "displaced stale unactivated account"
        );
        Ok(())
    }

    /// Filter supplied role/org IDs through the directory. Unresolved
    /// references are dropped with a log line, never an error.
    async fn resolve_memberships(
        &self,
        roles: &[String],
        orgs: &[String],
    ) -> Result<(BTreeSet<String>, BTreeSet<String>)> {
        let mut resolved_roles = BTreeSet::new();
        for id in roles {
            if self.directory.role_exists(id).await? {
                resolved_roles.insert(id.clone());
            } else {
                tracing::debug!(
                    role = %id,
                    "dropping unresolved role reference"
                );
            }
        }

        let mut resolved_orgs = BTreeSet::new();
        for id in orgs {
            if self.directory.org_exists(id).await? {
                resolved_orgs.insert(id.clone());
            } else {
                tracing::debug!(
                    org = %id,
                    "dropping unresolved org reference"
                );
            }
        }

        Ok((resolved_roles, resolved_orgs))
    }

    async fn evict_lookup_caches(&self, account: &Account) {
        self.cache.evict(CacheName::ByLogin, &account.login).await;
        self.cache.evict(CacheName::ByEmail, &account.email).await;
        self.cache
            .evict(CacheName::EmailCaptcha, &account.login)
            .await;
    }
}
