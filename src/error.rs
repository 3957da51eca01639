//! Crate-level convenience error.
//!
//! A thin wrapper over the canonical capability errors, not a god error:
//! each module keeps its own bounded enum and this just lets callers hold
//! any of them.

use thiserror::Error;

use crate::commit::CommitError;
use crate::compact::CompactError;
use crate::config::ConfigError;
use crate::core::CoreError;
use crate::index::IndexError;
use crate::ingest::IngestError;
use crate::lfs::LfsError;
use crate::oplog::OpLogError;
use crate::repo::RepoError;
use crate::signing::SigningError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    OpLog(#[from] OpLogError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Compact(#[from] CompactError),

    #[error(transparent)]
    Lfs(#[from] LfsError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Repo(#[from] RepoError),
}
