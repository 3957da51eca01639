//! The commit layer.
//!
//! A commit groups ops that are already durable in the stream's op log and
//! records, for every update and delete, the content it superseded. That
//! `old_content` is what makes [`revert`](crate::commit::revert_commit)
//! precise, and the `(lamport, node, line)` op key is what makes
//! cherry-pick and merge idempotent.

pub mod create;
pub mod hash;
pub mod merge;
pub mod revert;
pub mod store;

use std::path::PathBuf;

use thiserror::Error;
use time::OffsetDateTime;

use crate::core::{CommitId, CoreError, LineId, Op, StreamName};
use crate::oplog::OpLogError;
use crate::signing::SigningError;

pub use create::{create_commit, gather_new_ops};
pub use hash::{canonical_hash, sign_commit, verify_commit};
pub use merge::{cherry_pick, merge_streams, partial_merge, MergeFilter};
pub use revert::revert_commit;
pub use store::CommitStore;

/// An op plus the content it superseded.
///
/// `old_content` is populated for updates (the replaced content) and
/// deletes (the content at the moment of deletion); it is what enables
/// precise inversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedOp {
    pub op: Op,
    pub old_content: Option<String>,
}

impl ExtendedOp {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            old_content: None,
        }
    }

    pub fn with_old_content(op: Op, old_content: Option<String>) -> Self {
        Self { op, old_content }
    }
}

/// A commit record. Append-only within a stream: never mutated once written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub id: CommitId,
    pub stream: StreamName,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: OffsetDateTime,
    /// Hex-encoded Ed25519 signature over the canonical hash, if signed.
    pub signature: Option<String>,
    pub operations: Vec<ExtendedOp>,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommitError {
    #[error("commit {id} not found")]
    CommitNotFound { id: CommitId },

    /// A delete or update is missing the preserved content its inverse needs.
    #[error("cannot invert op on line {line}: prior content was not preserved")]
    OldContentMissing { line: LineId },

    #[error("commit {id} has no signature but verification is required")]
    SignatureMissing { id: CommitId },

    #[error("signature of commit {id} does not verify")]
    SignatureInvalid { id: CommitId },

    #[error("malformed commit record {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("timestamp could not be formatted: {0}")]
    TimestampFormat(#[from] time::error::Format),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    OpLog(#[from] OpLogError),

    #[error(transparent)]
    Signing(#[from] SigningError),
}

pub type CommitResult<T> = std::result::Result<T, CommitError>;
