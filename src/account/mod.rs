//! Account model and the value types feeding the lifecycle engine.

pub mod repository;
pub mod service;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::Strength;

/// Identity record as saved by the storage collaborator.
///
/// `login` and `email` are stored lowercase; uniqueness is
/// case-insensitive. `activation_key` is present iff the account is not
/// yet activated and the key has not been consumed. `reset_key` and
/// `reset_issued_at` are set and cleared together.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub login: String,
    pub email: String,
    pub telephone: Option<String>,
    #[serde(skip)]
    pub credential_hash: String,
    pub credential_strength: Strength,
    pub activated: bool,
    #[serde(skip)]
    pub activation_key: Option<String>,
    #[serde(skip)]
    pub reset_key: Option<String>,
    #[serde(skip)]
    pub reset_issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub display_name: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub summary: Option<String>,
    pub address: Option<String>,
    pub locale: String,
    pub roles: BTreeSet<String>,
    pub orgs: BTreeSet<String>,
}

/// Candidate record for registration or managed creation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountDraft {
    pub login: String,
    pub email: String,
    pub telephone: Option<String>,
    pub display_name: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub summary: Option<String>,
    pub address: Option<String>,
    pub locale: Option<String>,
    /// Only honored by managed creation; self-registration always starts
    /// unactivated.
    pub activated: bool,
    /// Role IDs to resolve into the membership set. Unknown IDs are
    /// dropped, never an error.
    pub roles: Vec<String>,
    /// Org IDs to resolve into the membership set. Unknown IDs are
    /// dropped, never an error.
    pub orgs: Vec<String>,
}

/// Caller-scoped profile mutation. Fields replace the stored values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub summary: Option<String>,
    pub address: Option<String>,
    pub locale: Option<String>,
}

/// Sentinel meaning "the caller did not intend to change the password"
/// on [`ManagedUpdate`].
pub const PASSWORD_UNCHANGED: &str = "888888";

/// Administrative full-replace update.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagedUpdate {
    pub id: String,
    pub login: String,
    pub email: String,
    /// Plaintext password, or [`PASSWORD_UNCHANGED`] to keep the stored
    /// digest.
    pub password: String,
    pub telephone: Option<String>,
    pub display_name: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub summary: Option<String>,
    pub address: Option<String>,
    pub locale: Option<String>,
    pub activated: bool,
    /// Replaces the membership set entirely; unknown IDs are dropped.
    pub roles: Vec<String>,
    /// Replaces the membership set entirely; unknown IDs are dropped.
    pub orgs: Vec<String>,
}

/// Default locale applied when a draft carries none.
pub const DEFAULT_LOCALE: &str = "en";
