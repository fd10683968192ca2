//! Content-addressed blob storage on the local filesystem, namespaced per
//! owner so that multiple node identities can share one store root.

mod error;
mod path;
mod store;

pub use error::StoreError;
pub use path::{KeyPath, PassThroughTransform, PathTransform, Sha1Transform, sha1_hex, split_digest};
pub use store::Store;
