//! Error handler for identa.

use thiserror::Error;

use crate::account::repository::StoreError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Enum representing account lifecycle errors.
///
/// Anti-enumeration paths deliberately collapse: a reset request for an
/// unknown email and for a not-yet-activated account both report
/// [`LifecycleError::NotFound`].
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("login is already used by an activated account")]
    LoginAlreadyUsed,

    #[error("email is already used by an activated account")]
    EmailAlreadyUsed,

    #[error("token not found, already consumed or expired")]
    InvalidOrExpiredToken,

    #[error("current password does not match")]
    InvalidCredential,

    #[error("account not found")]
    NotFound,

    #[error("verification provider unavailable")]
    VerificationUnavailable,

    #[error("credential hashing failed: {0}")]
    Hash(String),

    #[error("storage failed: {0}")]
    Store(#[from] StoreError),
}

impl LifecycleError {
    /// Map a uniqueness violation raised by the store at persist time to
    /// the matching typed error. Non-conflict errors pass through.
    pub(crate) fn from_persist(err: StoreError) -> Self {
        use crate::account::repository::UniqueField;

        match err {
            StoreError::Conflict(UniqueField::Login) => Self::LoginAlreadyUsed,
            StoreError::Conflict(UniqueField::Email) => Self::EmailAlreadyUsed,
            other => Self::Store(other),
        }
    }
}
