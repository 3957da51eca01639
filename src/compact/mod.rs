//! Background compaction: per-line coalescing and tombstone GC over the
//! op log, preserving every materialized document byte for byte.

pub mod config;
pub mod service;

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;
use time::OffsetDateTime;

use crate::commit::CommitError;
use crate::core::{CoreError, Op, OpKey, OpKind, Rga, WallClock};
use crate::oplog::OpLogError;

pub use config::CompactionConfig;
pub use service::CompactionService;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompactError {
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
    Commit(#[from] CommitError),
}

/// When each op key was captured by a commit of the same stream.
///
/// Ops are not persisted with timestamps, so tombstone age is approximated
/// by the timestamp of the latest commit containing the op. An op absent
/// from every commit has unknown age and is never TTL-dropped — which also
/// guarantees a delete whose content no commit has captured survives.
#[derive(Debug, Default)]
pub struct CommittedIndex {
    captured: HashMap<OpKey, WallClock>,
}

impl CommittedIndex {
    /// Build from a stream's commits, listed oldest first.
    pub fn from_commits<'a>(commits: impl IntoIterator<Item = &'a crate::commit::Commit>) -> Self {
        let mut captured = HashMap::new();
        for commit in commits {
            let at = wall_clock_of(commit.timestamp);
            for eop in &commit.operations {
                captured.insert(eop.op.key(), at);
            }
        }
        Self { captured }
    }

    pub fn captured_at(&self, key: &OpKey) -> Option<WallClock> {
        self.captured.get(key).copied()
    }
}

fn wall_clock_of(ts: OffsetDateTime) -> WallClock {
    let ms = ts.unix_timestamp_nanos() / 1_000_000;
    WallClock(ms.max(0) as u64)
}

/// Plan the compacted form of one file's log.
///
/// Returns `None` when the log should be left untouched: below the
/// `max_ops` threshold, or when compaction would drop below the
/// `min_ops_to_keep` floor. Otherwise returns the replacement op list,
/// which materializes to the identical document:
///
/// - every live line collapses to one insert at its original position
///   carrying its current content;
/// - every dead line collapses to its winning delete, which is dropped
///   entirely once it is older than the tombstone TTL *and* captured by a
///   commit of the stream.
pub fn plan_compaction(
    ops: &[Op],
    committed: &CommittedIndex,
    now: WallClock,
    config: &CompactionConfig,
) -> Result<Option<Vec<Op>>, CoreError> {
    if ops.len() < config.max_ops {
        return Ok(None);
    }

    let rga = Rga::replay(ops.iter().cloned())?;
    let ttl_ms = config.tombstone_ttl.as_millis() as u64;
    let compacted: Vec<Op> = rga
        .coalesced_ops()
        .into_iter()
        .filter(|op| {
            if op.kind != OpKind::Delete {
                return true;
            }
            match committed.captured_at(&op.key()) {
                Some(at) => at.saturating_age_ms(now) <= ttl_ms,
                // Uncommitted: age unknown and old_content not yet
                // preserved anywhere. Keep.
                None => true,
            }
        })
        .collect();

    if compacted.len() < config.min_ops_to_keep && compacted.len() < ops.len() {
        return Ok(None);
    }
    Ok(Some(compacted))
}
