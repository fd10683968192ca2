//! The replication engine: each node owns one content-addressed store and
//! one peer transport, and sequences broadcast-then-stream on writes,
//! broadcast-then-await-stream on remote reads, and best-effort propagation
//! of deletes.

mod broadcast;
mod error;
mod node;

pub use error::NodeError;
pub use node::{Node, NodeOpts};
