use std::io;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("key not found: owner={owner_id} key={key}")]
    NotFound { owner_id: String, key: String },
    #[error("i/o error")]
    Io(#[from] io::Error),
}
