// Crypto module: sealed tokens, CSRF commitments, random generation.

pub mod csrf;
pub mod random;
pub mod sealed;

pub use csrf::{issue_or_verify, CsrfCheck};
pub use random::{generate_random_string, random_bytes};
pub use sealed::{decode, encode};

use subtle::ConstantTimeEq;

/// Compare two byte slices in constant time.
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Hash a magic-link token for storage. Only the hash is persisted, so a
/// leaked verification table cannot be replayed into sign-ins.
pub fn hash_verification_token(token: &str, secret: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_equal() {
        assert!(constant_time_equal(b"hello", b"hello"));
        assert!(!constant_time_equal(b"hello", b"world"));
        assert!(!constant_time_equal(b"hello", b"hell"));
    }

    #[test]
    fn test_verification_token_hash_is_secret_bound() {
        let a = hash_verification_token("token", "secret-1");
        let b = hash_verification_token("token", "secret-2");
        assert_ne!(a, b);
        assert_eq!(a, hash_verification_token("token", "secret-1"));
        assert_eq!(a.len(), 64);
    }
}
