//! Random key/UUID generation, key hashing, and streaming AES-256-CTR
//! encryption used to protect blobs in flight between nodes.
//!
//! Peers never see plaintext: the origin node encrypts before broadcasting,
//! and only the origin can decrypt, since the key never leaves the node that
//! generated it.

mod error;
mod keys;
mod stream;

pub use error::CryptoError;
pub use keys::{IV_LEN, KEY_LEN, hash_sha256, new_random_key, new_uuid};
pub use stream::{copy_decrypt, copy_encrypt};
