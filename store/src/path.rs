use sha1::{Digest, Sha1};

/// Number of five-hex-char directory segments a production digest is split into.
const NUM_SEGMENTS: usize = 8;
const SEGMENT_LEN: usize = 5;

/// A key, already transformed into its on-disk location.
///
/// `path_name` is the directory path relative to `<root>/<owner_id>`;
/// `file_name` is the leaf file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    pub path_name: String,
    pub file_name: String,
}

impl KeyPath {
    /// The path of the leaf file, relative to `<root>/<owner_id>`.
    pub fn file_path(&self) -> String {
        format!("{}/{}", self.path_name, self.file_name)
    }
}

/// Deterministic mapping from an opaque user key to its on-disk location.
pub trait PathTransform: Send + Sync {
    fn transform(&self, key: &str) -> KeyPath;
}

/// Hashes `key` with SHA-1 and splits the 40-hex-char digest into eight
/// five-char directory segments. This is the production transform: the same
/// key always maps to the same path on every node.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha1Transform;

impl PathTransform for Sha1Transform {
    fn transform(&self, key: &str) -> KeyPath {
        let digest = sha1_hex(key);
        split_digest(&digest)
    }
}

/// Identity transform: `path_name = file_name = key`. Only useful for tests,
/// where a human-readable on-disk layout is more convenient to assert on.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughTransform;

impl PathTransform for PassThroughTransform {
    fn transform(&self, key: &str) -> KeyPath {
        KeyPath {
            path_name: key.to_string(),
            file_name: key.to_string(),
        }
    }
}

/// SHA-1 of `key` as a 40-char lowercase hex string.
///
/// This is also the `hashed_key` placed on the wire: since it is the exact
/// digest the production transform splits into a path, a receiving peer can
/// reconstruct the identical on-disk location via [`split_digest`] without
/// hashing a second time.
pub fn sha1_hex(key: &str) -> String {
    let digest = Sha1::digest(key.as_bytes());
    hex::encode(digest)
}

/// Splits an already-computed 40-hex-char digest into the same eight
/// five-char segments [`Sha1Transform`] would produce, without re-hashing.
///
/// Used to persist a blob under a `hashed_key` received over the wire: the
/// sender already hashed the key once, and hashing the digest again would
/// place the blob at a different path than the sender's own copy.
pub fn split_digest(digest: &str) -> KeyPath {
    let num_segments = digest.len() / SEGMENT_LEN;
    let mut segments = Vec::with_capacity(num_segments.max(NUM_SEGMENTS));
    for i in 0..num_segments {
        let start = i * SEGMENT_LEN;
        segments.push(&digest[start..start + SEGMENT_LEN]);
    }
    KeyPath {
        path_name: segments.join("/"),
        file_name: digest.to_string(),
    }
}
