//! Content addressing for source and target files.
//!
//! Two digests are kept per file:
//! - a SHA-256 hex digest, the stable content hash reported to users;
//! - the Git blob object id (SHA-1 over `blob <len>\0<bytes>`), which is what a
//!   hosted tree listing returns per path. Comparing blob ids lets the planner
//!   diff a whole repository from one tree call.

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of `content`.
pub fn content_hash(content: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(content);
    hex::encode(h.finalize())
}

/// Git blob object id of `content`, as reported by tree listings.
pub fn git_blob_id(content: &[u8]) -> String {
    let mut h = Sha1::new();
    h.update(format!("blob {}\0", content.len()).as_bytes());
    h.update(content);
    hex::encode(h.finalize())
}
