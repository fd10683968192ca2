use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::StoreError;
use crate::path::{KeyPath, PathTransform};

/// A content-addressed blob store rooted at a directory, namespaced per owner.
///
/// Every operation is parameterized by `(owner_id, key)`; `owner_id` is the
/// first path segment under `root`, so two nodes can use identical keys
/// without their blobs colliding on disk.
#[derive(Clone)]
pub struct Store {
    root: PathBuf,
    transform: Arc<dyn PathTransform>,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>, transform: Arc<dyn PathTransform>) -> Self {
        Self {
            root: root.into(),
            transform,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Applies this store's configured transform to `key`.
    pub fn transform(&self, key: &str) -> KeyPath {
        self.transform.transform(key)
    }

    fn dir_path(&self, owner_id: &str, key_path: &KeyPath) -> PathBuf {
        self.root.join(owner_id).join(&key_path.path_name)
    }

    fn file_path(&self, owner_id: &str, key_path: &KeyPath) -> PathBuf {
        self.dir_path(owner_id, key_path).join(&key_path.file_name)
    }

    fn owner_root(&self, owner_id: &str) -> PathBuf {
        self.root.join(owner_id)
    }

    pub async fn has(&self, owner_id: &str, key: &str) -> bool {
        self.has_path(owner_id, &self.transform(key)).await
    }

    pub async fn has_path(&self, owner_id: &str, key_path: &KeyPath) -> bool {
        fs::try_exists(self.file_path(owner_id, key_path))
            .await
            .unwrap_or(false)
    }

    pub async fn write<R>(&self, owner_id: &str, key: &str, reader: R) -> Result<u64, StoreError>
    where
        R: AsyncRead + Unpin,
    {
        self.write_path(owner_id, &self.transform(key), reader)
            .await
    }

    pub async fn write_path<R>(
        &self,
        owner_id: &str,
        key_path: &KeyPath,
        mut reader: R,
    ) -> Result<u64, StoreError>
    where
        R: AsyncRead + Unpin,
    {
        fs::create_dir_all(self.dir_path(owner_id, key_path))
            .await
            .inspect_err(|e| tracing::warn!(owner_id, path = %key_path.file_name, error = %e, "failed to create blob directory"))?;
        let mut file = fs::File::create(self.file_path(owner_id, key_path))
            .await
            .inspect_err(|e| tracing::warn!(owner_id, path = %key_path.file_name, error = %e, "failed to create blob file"))?;
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .inspect_err(|e| tracing::warn!(owner_id, path = %key_path.file_name, error = %e, "failed to write blob body"))?;
        Ok(written)
    }

    /// Writes `reader` (ciphertext) to disk after decrypting it with
    /// `encrypt_key`. Used when recovering a key the local store lacks from a
    /// peer: the peer only ever holds ciphertext.
    pub async fn write_decrypted<R>(
        &self,
        encrypt_key: &[u8; 32],
        owner_id: &str,
        key: &str,
        mut reader: R,
    ) -> Result<u64, StoreError>
    where
        R: AsyncRead + Unpin,
    {
        let key_path = self.transform(key);
        fs::create_dir_all(self.dir_path(owner_id, &key_path))
            .await
            .inspect_err(|e| tracing::warn!(owner_id, key, error = %e, "failed to create blob directory"))?;
        let mut file = fs::File::create(self.file_path(owner_id, &key_path))
            .await
            .inspect_err(|e| tracing::warn!(owner_id, key, error = %e, "failed to create blob file"))?;
        let written = dstore_crypto::copy_decrypt(encrypt_key, &mut reader, &mut file)
            .await
            .inspect_err(|e| tracing::warn!(owner_id, key, error = %e, "failed to decrypt blob body"))
            .map_err(|_| StoreError::Io(std::io::Error::other("decrypt stream failed")))?;
        Ok(written)
    }

    pub async fn read(&self, owner_id: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.read_path(owner_id, &self.transform(key), key).await
    }

    pub async fn read_path(
        &self,
        owner_id: &str,
        key_path: &KeyPath,
        key_for_error: &str,
    ) -> Result<Vec<u8>, StoreError> {
        fs::read(self.file_path(owner_id, key_path))
            .await
            .map_err(|e| self.not_found_or_io(e, owner_id, key_for_error))
    }

    pub async fn copy_read<W>(&self, owner_id: &str, key: &str, writer: W) -> Result<u64, StoreError>
    where
        W: AsyncWrite + Unpin,
    {
        self.copy_read_path(owner_id, &self.transform(key), key, writer)
            .await
    }

    pub async fn copy_read_path<W>(
        &self,
        owner_id: &str,
        key_path: &KeyPath,
        key_for_error: &str,
        mut writer: W,
    ) -> Result<u64, StoreError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut file = fs::File::open(self.file_path(owner_id, key_path))
            .await
            .map_err(|e| self.not_found_or_io(e, owner_id, key_for_error))?;
        let copied = tokio::io::copy(&mut file, &mut writer).await?;
        Ok(copied)
    }

    pub async fn file_size(&self, owner_id: &str, key: &str) -> Result<u64, StoreError> {
        self.file_size_path(owner_id, &self.transform(key), key)
            .await
    }

    pub async fn file_size_path(
        &self,
        owner_id: &str,
        key_path: &KeyPath,
        key_for_error: &str,
    ) -> Result<u64, StoreError> {
        let meta = fs::metadata(self.file_path(owner_id, key_path))
            .await
            .map_err(|e| self.not_found_or_io(e, owner_id, key_for_error))?;
        Ok(meta.len())
    }

    /// Removes the leaf file, then prunes empty ancestor directories up to
    /// (but not including) `<root>/<owner_id>`.
    pub async fn delete(&self, owner_id: &str, key: &str) -> Result<(), StoreError> {
        self.delete_path(owner_id, &self.transform(key), key).await
    }

    pub async fn delete_path(
        &self,
        owner_id: &str,
        key_path: &KeyPath,
        key_for_error: &str,
    ) -> Result<(), StoreError> {
        let file_path = self.file_path(owner_id, key_path);
        fs::remove_file(&file_path)
            .await
            .map_err(|e| self.not_found_or_io(e, owner_id, key_for_error))?;

        let owner_root = self.owner_root(owner_id);
        let mut dir = self.dir_path(owner_id, key_path);
        while dir != owner_root {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => break,
            };
            if entries.next_entry().await.ok().flatten().is_some() {
                break;
            }
            if fs::remove_dir(&dir).await.is_err() {
                break;
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "failed to clear store root");
                Err(e.into())
            }
        }
    }

    fn not_found_or_io(&self, e: std::io::Error, owner_id: &str, key: &str) -> StoreError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound {
                owner_id: owner_id.to_string(),
                key: key.to_string(),
            }
        } else {
            tracing::warn!(owner_id, key, error = %e, "unexpected i/o error");
            StoreError::Io(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{PassThroughTransform, Sha1Transform};

    fn sha1_store(root: &Path) -> Store {
        Store::new(root, Arc::new(Sha1Transform))
    }

    fn passthrough_store(root: &Path) -> Store {
        Store::new(root, Arc::new(PassThroughTransform))
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = sha1_store(dir.path());

        let content = b"Inside the file".to_vec();
        let n = store
            .write("owner1", "testingFile", content.as_slice())
            .await
            .unwrap();
        assert_eq!(n as usize, content.len());

        assert!(store.has("owner1", "testingFile").await);
        let read_back = store.read("owner1", "testingFile").await.unwrap();
        assert_eq!(read_back, content);
    }

    #[tokio::test]
    async fn has_is_false_after_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = sha1_store(dir.path());

        store.write("owner1", "key", b"v".as_slice()).await.unwrap();
        assert!(store.has("owner1", "key").await);

        store.delete("owner1", "key").await.unwrap();
        assert!(!store.has("owner1", "key").await);
    }

    #[tokio::test]
    async fn delete_prunes_empty_ancestors_but_keeps_owner_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = sha1_store(dir.path());

        store.write("owner1", "hello", b"v".as_slice()).await.unwrap();
        let key_path = store.transform("hello");
        let leaf_dir = dir.path().join("owner1").join(&key_path.path_name);
        assert!(fs::try_exists(&leaf_dir).await.unwrap());

        store.delete("owner1", "hello").await.unwrap();

        assert!(!fs::try_exists(&leaf_dir).await.unwrap());
        assert!(fs::try_exists(dir.path().join("owner1")).await.unwrap());
    }

    #[tokio::test]
    async fn delete_does_not_prune_siblings_still_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = passthrough_store(dir.path());

        store.write("owner1", "a", b"1".as_slice()).await.unwrap();
        store.write("owner1", "b", b"2".as_slice()).await.unwrap();

        store.delete("owner1", "a").await.unwrap();

        assert!(!store.has("owner1", "a").await);
        assert!(store.has("owner1", "b").await);
    }

    #[tokio::test]
    async fn read_missing_key_errors_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = sha1_store(dir.path());

        let err = store.read("owner1", "missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn file_size_matches_written_length() {
        let dir = tempfile::tempdir().unwrap();
        let store = sha1_store(dir.path());

        store
            .write("owner1", "sized", vec![0u8; 12345].as_slice())
            .await
            .unwrap();
        let size = store.file_size("owner1", "sized").await.unwrap();
        assert_eq!(size, 12345);
    }

    #[tokio::test]
    async fn write_then_write_again_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let store = sha1_store(dir.path());

        store
            .write("owner1", "k", b"original content".as_slice())
            .await
            .unwrap();
        store
            .write("owner1", "k", b"new".as_slice())
            .await
            .unwrap();

        let content = store.read("owner1", "k").await.unwrap();
        assert_eq!(content, b"new");
    }

    #[tokio::test]
    async fn clear_all_removes_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = sha1_store(dir.path());
        store.write("owner1", "k", b"v".as_slice()).await.unwrap();

        store.clear_all().await.unwrap();
        assert!(!fs::try_exists(dir.path().join("owner1")).await.unwrap());
    }

    #[tokio::test]
    async fn write_path_and_read_path_bypass_transform() {
        let dir = tempfile::tempdir().unwrap();
        let store = sha1_store(dir.path());

        let digest = crate::path::sha1_hex("Hello");
        let key_path = crate::path::split_digest(&digest);

        store
            .write_path("owner1", &key_path, b"JIDJISED".as_slice())
            .await
            .unwrap();

        assert_eq!(key_path, store.transform("Hello"));
        let content = store.read("owner1", "Hello").await.unwrap();
        assert_eq!(content, b"JIDJISED");
    }
}
