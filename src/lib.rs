#![forbid(unsafe_code)]

//! Offline-first version control engine.
//!
//! Every tracked file is a line-based CRDT (a Replicated Growable Array)
//! whose operations live in a per-stream append-only binary log. A commit
//! layer groups new operations together with the prior content they
//! superseded, which is what makes precise revert and filtered cross-stream
//! merges possible. A background compactor coalesces redundant operations
//! and prunes expired tombstones without changing any materialized document.

pub mod commit;
pub mod compact;
pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod ingest;
pub mod lfs;
pub mod oplog;
pub mod paths;
pub mod repo;
pub mod signing;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the types most callers need at the crate root.
pub use crate::commit::{Commit, CommitStore, ExtendedOp, MergeFilter};
pub use crate::compact::{CompactionConfig, CompactionService};
pub use crate::config::Config;
pub use crate::core::{
    CoreError, Document, FileId, LamportClock, LineId, NodeId, Op, OpKey, OpKind, Rga, StreamName,
    WallClock,
};
pub use crate::index::Index;
pub use crate::ingest::{FileStatus, IngestReport, PathState, RepoStatus};
pub use crate::lfs::{LargeFileStore, LfsGcService};
pub use crate::oplog::OpLog;
pub use crate::repo::Repository;
pub use crate::signing::{Ed25519Signer, Signer};
