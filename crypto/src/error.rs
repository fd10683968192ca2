use std::io;

/// Errors surfaced by the streaming encrypt/decrypt primitives.
///
/// The cipher construction itself cannot fail for a 32-byte key, so the only
/// failures that can occur are I/O errors on the underlying reader/writer.
#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("i/o error during encrypt/decrypt stream")]
    Io(#[from] io::Error),
}
