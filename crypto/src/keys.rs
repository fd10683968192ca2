use rand::RngCore;
use sha2::{Digest, Sha256};

/// Size in bytes of the per-node symmetric encrypt key.
pub const KEY_LEN: usize = 32;

/// Size in bytes of the AES block / CTR IV.
pub const IV_LEN: usize = 16;

/// Generates a fresh 32-byte symmetric key from a cryptographic RNG.
pub fn new_random_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::rng().fill_bytes(&mut key);
    key
}

/// Generates a 64-hex-char identifier from 32 random bytes.
///
/// Used for `owner_id` generation when a node is constructed without one.
pub fn new_uuid() -> String {
    let mut buf = [0u8; 32];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// SHA-256 of `key`, returned as a 64-hex-char lowercase string.
pub fn hash_sha256(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_key_has_expected_length() {
        assert_eq!(new_random_key().len(), KEY_LEN);
    }

    #[test]
    fn uuid_is_64_hex_chars() {
        let id = new_uuid();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn uuid_is_random() {
        assert_ne!(new_uuid(), new_uuid());
    }

    #[test]
    fn hash_is_deterministic_64_hex_chars() {
        let a = hash_sha256("hello");
        let b = hash_sha256("hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
