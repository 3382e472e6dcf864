//! Identa is a lightweight account lifecycle core: registration with
//! pending activation, time-boxed credential resets, verified contact
//! changes and reclamation of abandoned accounts.
//!
//! Transport, persistence and delivery providers stay outside; they are
//! consumed through the traits in [`account::repository`], [`cache`] and
//! [`sms`].

#![forbid(unsafe_code)]
#![deny(unused_mut)]

pub mod account;
pub mod cache;
pub mod config;
pub mod credential;
pub mod error;
pub mod reclaim;
pub mod sms;
pub mod token;

pub use account::service::{AccountService, CallerResolver, ContactKind};
pub use account::{Account, AccountDraft, ManagedUpdate, ProfileUpdate};
pub use error::{LifecycleError, Result};
