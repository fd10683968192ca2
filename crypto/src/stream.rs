use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CryptoError;
use crate::keys::IV_LEN;

/// AES-256 in CTR mode, big-endian counter — matches the reference
/// implementation's `cipher.NewCTR` construction.
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const CHUNK_SIZE: usize = 32 * 1024;

/// Encrypts `src` into `dst`, prepending a freshly generated 16-byte IV.
///
/// Returns the total number of bytes written to `dst` (IV length plus
/// ciphertext length).
pub async fn copy_encrypt<R, W>(
    key: &[u8; 32],
    src: &mut R,
    dst: &mut W,
) -> Result<u64, CryptoError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);
    dst.write_all(&iv)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "failed to write iv"))?;

    let mut cipher = Aes256Ctr::new(
        GenericArray::from_slice(key),
        GenericArray::from_slice(&iv),
    );
    let written = xor_stream(&mut cipher, src, dst).await?;
    Ok(IV_LEN as u64 + written)
}

/// Decrypts `src` into `dst`, reading the 16-byte IV from the front of `src`.
///
/// Returns the number of plaintext bytes written to `dst`.
pub async fn copy_decrypt<R, W>(
    key: &[u8; 32],
    src: &mut R,
    dst: &mut W,
) -> Result<u64, CryptoError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut iv = [0u8; IV_LEN];
    src.read_exact(&mut iv)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "failed to read iv"))?;

    let mut cipher = Aes256Ctr::new(
        GenericArray::from_slice(key),
        GenericArray::from_slice(&iv),
    );
    xor_stream(&mut cipher, src, dst).await
}

async fn xor_stream<R, W>(
    cipher: &mut Aes256Ctr,
    src: &mut R,
    dst: &mut W,
) -> Result<u64, CryptoError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = src
            .read(&mut buf)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "failed to read plaintext chunk"))?;
        if n == 0 {
            break;
        }
        cipher.apply_keystream(&mut buf[..n]);
        dst.write_all(&buf[..n])
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "failed to write ciphertext chunk"))?;
        written += n as u64;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::new_random_key;

    #[tokio::test]
    async fn round_trips_arbitrary_bytes() {
        let key = new_random_key();
        let plaintext = b"test data".to_vec();

        let mut ciphertext = Vec::new();
        let written = copy_encrypt(&key, &mut plaintext.as_slice(), &mut ciphertext)
            .await
            .unwrap();
        assert_eq!(written as usize, plaintext.len() + IV_LEN);
        assert_eq!(ciphertext.len(), plaintext.len() + IV_LEN);

        let mut recovered = Vec::new();
        let decrypted_len = copy_decrypt(&key, &mut ciphertext.as_slice(), &mut recovered)
            .await
            .unwrap();
        assert_eq!(decrypted_len as usize, recovered.len());
        assert_eq!(recovered, plaintext);
    }

    #[tokio::test]
    async fn wrong_key_does_not_recover_plaintext() {
        let key = new_random_key();
        let other_key = new_random_key();
        let plaintext = b"some secret bytes".to_vec();

        let mut ciphertext = Vec::new();
        copy_encrypt(&key, &mut plaintext.as_slice(), &mut ciphertext)
            .await
            .unwrap();

        let mut recovered = Vec::new();
        copy_decrypt(&other_key, &mut ciphertext.as_slice(), &mut recovered)
            .await
            .unwrap();
        assert_ne!(recovered, plaintext);
    }

    #[tokio::test]
    async fn empty_input_produces_iv_only_ciphertext() {
        let key = new_random_key();
        let mut ciphertext = Vec::new();
        let written = copy_encrypt(&key, &mut [].as_slice(), &mut ciphertext)
            .await
            .unwrap();
        assert_eq!(written as usize, IV_LEN);
        assert_eq!(ciphertext.len(), IV_LEN);
    }
}
