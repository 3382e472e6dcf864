//! Single-use token generation.
//!
//! Every value comes from the operating system CSPRNG; outputs are
//! statistically independent and unpredictable from prior outputs.

use rand::RngCore;
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;

/// Byte length of activation and reset keys before hex encoding.
pub const KEY_LENGTH: usize = 32;
/// Byte length of account identifiers before hex encoding.
pub const ID_LENGTH: usize = 16;
/// Character length of generated initial passwords.
pub const INITIAL_PASSWORD_LENGTH: usize = 24;

/// Stateless generator for keys, identifiers and initial passwords.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenGenerator;

impl TokenGenerator {
    /// Create a new [`TokenGenerator`].
    pub fn new() -> Self {
        Self
    }

    fn random_hex(bytes: usize) -> String {
        let mut buf = vec![0u8; bytes];
        OsRng.fill_bytes(&mut buf);
        hex::encode(buf)
    }

    /// Generate an activation key for a newly registered account.
    pub fn new_activation_key(&self) -> String {
        Self::random_hex(KEY_LENGTH)
    }

    /// Generate a password reset key.
    pub fn new_reset_key(&self) -> String {
        Self::random_hex(KEY_LENGTH)
    }

    /// Generate an opaque account identifier.
    pub fn new_account_id(&self) -> String {
        Self::random_hex(ID_LENGTH)
    }

    /// Generate an alphanumeric initial password for managed creation.
    pub fn new_initial_password(&self) -> String {
        Alphanumeric.sample_string(&mut OsRng, INITIAL_PASSWORD_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_hex_and_distinct() {
        let tokens = TokenGenerator::new();

        let a = tokens.new_activation_key();
        let b = tokens.new_activation_key();
        let r = tokens.new_reset_key();

        assert_eq!(a.len(), KEY_LENGTH * 2);
        assert!(hex::decode(&a).is_ok());
        assert_ne!(a, b);
        assert_ne!(a, r);
    }

    #[test]
    fn account_ids_are_shorter_than_keys() {
        let tokens = TokenGenerator::new();
        let id = tokens.new_account_id();

        assert_eq!(id.len(), ID_LENGTH * 2);
        assert!(hex::decode(&id).is_ok());
    }

    #[test]
    fn initial_password_is_alphanumeric() {
        let password = TokenGenerator::new().new_initial_password();

        assert_eq!(password.len(), INITIAL_PASSWORD_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
