use pbkdf2::pbkdf2;
use rand::rngs::OsRng;
use rand::RngCore;
use std::num::NonZeroU32;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::HmacSha256;

const ALGORITHM: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("PBKDF2 iteration count must be positive")]
    ZeroIterations,
}

/// One-way password hashing
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, HashError>;

    /// `false` for a wrong password as well as for a hash this hasher
    /// cannot parse
    fn verify(&self, hash: &str, plaintext: &str) -> bool;
}

/// PBKDF2-HMAC-SHA256 with a random salt per password.
///
/// Hashes are encoded as `pbkdf2_sha256$<iterations>$<salt hex>$<key hex>`
/// so the cost can be raised later without invalidating stored hashes.
pub struct Pbkdf2Hasher {
    iterations: NonZeroU32,
}

impl Pbkdf2Hasher {
    pub fn new(iterations: u32) -> Result<Self, HashError> {
        let iterations = NonZeroU32::new(iterations).ok_or(HashError::ZeroIterations)?;
        Ok(Self { iterations })
    }
}

/// Derive a 32-byte key from the password using PBKDF2
fn derive_key(plaintext: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut key = vec![0u8; KEY_LEN];
    pbkdf2::<HmacSha256>(plaintext.as_bytes(), salt, iterations, &mut key);
    key
}

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let key = derive_key(plaintext, &salt, self.iterations.get());
        Ok(format!(
            "{}${}${}${}",
            ALGORITHM,
            self.iterations,
            hex::encode(salt),
            hex::encode(key)
        ))
    }

    fn verify(&self, hash: &str, plaintext: &str) -> bool {
        let parts: Vec<&str> = hash.split('$').collect();
        if parts.len() != 4 || parts[0] != ALGORITHM {
            return false;
        }

        let iterations = match parts[1].parse::<NonZeroU32>() {
            Ok(iterations) => iterations,
            Err(_) => return false,
        };
        let (salt, expected) = match (hex::decode(parts[2]), hex::decode(parts[3])) {
            (Ok(salt), Ok(expected)) => (salt, expected),
            _ => return false,
        };

        let key = derive_key(plaintext, &salt, iterations.get());
        key.as_slice().ct_eq(expected.as_slice()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Pbkdf2Hasher {
        Pbkdf2Hasher::new(1_000).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher();
        let hash = hasher.hash("secret1").unwrap();

        assert!(hash.starts_with("pbkdf2_sha256$1000$"));
        assert!(!hash.contains("secret1"));
        assert!(hasher.verify(&hash, "secret1"));
        assert!(!hasher.verify(&hash, "secret2"));
        assert!(!hasher.verify(&hash, ""));
    }

    #[test]
    fn test_salt_is_random() {
        let hasher = hasher();
        let first = hasher.hash("same password").unwrap();
        let second = hasher.hash("same password").unwrap();
        assert_ne!(first, second);
        assert!(hasher.verify(&first, "same password"));
        assert!(hasher.verify(&second, "same password"));
    }

    #[test]
    fn test_iterations_read_from_hash() {
        let weak = Pbkdf2Hasher::new(10).unwrap();
        let hash = weak.hash("secret1").unwrap();
        // A hasher configured differently still checks older hashes
        assert!(hasher().verify(&hash, "secret1"));
    }

    #[test]
    fn test_malformed_hashes() {
        let hasher = hasher();
        assert!(!hasher.verify("", "secret1"));
        assert!(!hasher.verify("plaintext", "plaintext"));
        assert!(!hasher.verify("pbkdf2_sha256$0$00$00", "secret1"));
        assert!(!hasher.verify("pbkdf2_sha256$10$zz$00", "secret1"));
        assert!(!hasher.verify("argon2$10$00$00", "secret1"));
    }

    #[test]
    fn test_key_must_match_in_full() {
        let hasher = hasher();
        let hash = hasher.hash("secret1").unwrap();

        // Same prefix, truncated key
        let truncated = &hash[..hash.len() - 2];
        assert!(!hasher.verify(truncated, "secret1"));

        let mut flipped = hash.clone();
        let last = if hash.ends_with('0') { "1" } else { "0" };
        flipped.replace_range(hash.len() - 1.., last);
        assert!(!hasher.verify(&flipped, "secret1"));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(matches!(
            Pbkdf2Hasher::new(0),
            Err(HashError::ZeroIterations)
        ));
    }
}
