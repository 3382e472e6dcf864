//! SMS delivery-status collaborator interface.
//!
//! The engine never sends messages itself; it asks the provider whether
//! the code the caller typed matches what was delivered to the phone
//! number today. Calls are bounded by the engine's delivery timeout.

use async_trait::async_trait;
use chrono::NaiveDate;

/// Provider verdict for a verification code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmsVerification {
    /// Code matches the one delivered to this number.
    Match,
    /// Code does not match, or no delivery is on record.
    Mismatch,
}

/// Error raised by the delivery provider.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("provider timed out")]
    Timeout,
    #[error("provider failure: {0}")]
    Provider(String),
}

/// Out-of-process SMS provider.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Check the delivery record for `phone` on `date` against `code`.
    async fn query_delivery_status(
        &self,
        phone: &str,
        date: NaiveDate,
        code: &str,
    ) -> Result<SmsVerification, DeliveryError>;
}
