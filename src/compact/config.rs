//! Compaction thresholds.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CompactionConfig {
    /// Logs shorter than this are left alone.
    pub max_ops: usize,
    /// Tombstones older than this may be pruned once committed.
    pub tombstone_ttl: Duration,
    /// Never compact a log below this many ops.
    pub min_ops_to_keep: usize,
    /// How often the background service runs.
    pub interval: Duration,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            max_ops: 10_000,
            tombstone_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            min_ops_to_keep: 1_000,
            interval: Duration::from_secs(60 * 60),
        }
    }
}
