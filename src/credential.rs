//! Credential codec: pluggable one-way hashing plus password strength
//! classification.

use std::sync::Arc;

use argon2::password_hash::{
    PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::config::Argon2 as ArgonConfig;
use crate::error::LifecycleError;

/// Error raised by a hashing primitive.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("argon2 error: {0}")]
    Argon2(String),
    #[error("{0}")]
    Primitive(String),
}

impl From<HashError> for LifecycleError {
    fn from(err: HashError) -> Self {
        LifecycleError::Hash(err.to_string())
    }
}

/// One-way hash and verify primitive. Verification must run in constant
/// time relative to the digest; the engine never compares plaintexts.
pub trait CredentialHasher: Send + Sync {
    /// Digest a plaintext password.
    fn hash(&self, plaintext: &str) -> Result<String, HashError>;
    /// Verify a plaintext against a stored digest.
    fn verify(&self, plaintext: &str, digest: &str) -> bool;
}

/// Derived classification of a plaintext password, recomputed on every
/// credential change.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    #[default]
    Weak,
    Medium,
    Strong,
}

const MIN_STRONG_LENGTH: usize = 8;

/// Classify a plaintext by length and character-class mix.
pub fn classify(plaintext: &str) -> Strength {
    let classes = [
        plaintext.chars().any(|c| c.is_ascii_lowercase()),
        plaintext.chars().any(|c| c.is_ascii_uppercase()),
        plaintext.chars().any(|c| c.is_ascii_digit()),
        plaintext.chars().any(|c| !c.is_ascii_alphanumeric()),
    ]
    .iter()
    .filter(|present| **present)
    .count();

    if plaintext.len() < MIN_STRONG_LENGTH || classes <= 1 {
        Strength::Weak
    } else if classes == 2 {
        Strength::Medium
    } else {
        Strength::Strong
    }
}

/// Default hasher using Argon2id and PHC string format.
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Create a new [`Argon2Hasher`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self, HashError> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| HashError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2 {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| HashError::Argon2(err.to_string()))?;

        Ok(hash.to_string())
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };

        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Bundle of hashing primitive and strength classifier handed to the
/// lifecycle engine.
#[derive(Clone)]
pub struct CredentialCodec {
    hasher: Arc<dyn CredentialHasher>,
}

impl CredentialCodec {
    /// Create a new [`CredentialCodec`] around a hashing primitive.
    pub fn new(hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { hasher }
    }

    /// Create a codec with the default Argon2id primitive.
    pub fn argon2(config: Option<ArgonConfig>) -> Result<Self, HashError> {
        Ok(Self::new(Arc::new(Argon2Hasher::new(config)?)))
    }

    /// Digest a plaintext password.
    pub fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        self.hasher.hash(plaintext)
    }

    /// Verify a plaintext against a stored digest.
    pub fn verify(&self, plaintext: &str, digest: &str) -> bool {
        self.hasher.verify(plaintext, digest)
    }

    /// Classify a plaintext password.
    pub fn classify(&self, plaintext: &str) -> Strength {
        classify(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_config() -> ArgonConfig {
        ArgonConfig {
            memory_cost: 1024 * 8,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }
    }

    #[test]
    fn argon2_round_trip() {
        let hasher = Argon2Hasher::new(Some(cheap_config())).unwrap();

        let digest = hasher.hash("correct horse").unwrap();
        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &digest));
        assert!(!hasher.verify("wrong horse", &digest));
    }

    #[test]
    fn malformed_digest_never_verifies() {
        let hasher = Argon2Hasher::new(Some(cheap_config())).unwrap();

        assert!(!hasher.verify("anything", "not-a-phc-string"));
    }

    #[test]
    fn classifier_boundaries() {
        assert_eq!(classify("short"), Strength::Weak);
        assert_eq!(classify("alllowercaseword"), Strength::Weak);
        assert_eq!(classify("lowercase123"), Strength::Medium);
        assert_eq!(classify("Mixed123!pass"), Strength::Strong);
        // Mixed classes below the length floor stay weak.
        assert_eq!(classify("Ab1!"), Strength::Weak);
    }

    #[test]
    fn strength_is_ordinal() {
        assert!(Strength::Weak < Strength::Medium);
        assert!(Strength::Medium < Strength::Strong);
    }
}
