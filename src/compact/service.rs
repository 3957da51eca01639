//! The background compaction worker.
//!
//! One thread, woken on a tick, cancelled by closing a quit channel.
//! Errors are logged per tick and never terminate the worker. Log readers
//! need no coordination with a running pass because the rewrite is
//! rename-based: a reader sees either the old file or the new one.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};

use crate::commit::CommitStore;
use crate::core::WallClock;
use crate::oplog::OpLog;

use super::{plan_compaction, CommittedIndex, CompactError, CompactionConfig};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    pub files_examined: usize,
    pub files_rewritten: usize,
    pub ops_before: usize,
    pub ops_after: usize,
}

/// Compact every op log of every stream under `repo_root` once.
pub fn compact_repository(
    repo_root: &Path,
    config: &CompactionConfig,
) -> Result<CompactionStats, CompactError> {
    let oplog = OpLog::new(repo_root);
    let commits = CommitStore::new(repo_root);
    let now = WallClock::now();
    let mut stats = CompactionStats::default();

    for stream in streams_with_ops(repo_root)? {
        let committed = CommittedIndex::from_commits(commits.list(&stream)?.iter());
        for file in oplog.file_ids(&stream)? {
            let ops = oplog.load_all(&stream, &file)?;
            stats.files_examined += 1;
            stats.ops_before += ops.len();
            match plan_compaction(&ops, &committed, now, config)? {
                Some(compacted) => {
                    stats.ops_after += compacted.len();
                    oplog.replace(&stream, &file, &compacted)?;
                    stats.files_rewritten += 1;
                    tracing::debug!(
                        stream = %stream,
                        file = %file,
                        before = ops.len(),
                        after = compacted.len(),
                        "compacted op log"
                    );
                }
                None => stats.ops_after += ops.len(),
            }
        }
    }
    Ok(stats)
}

fn streams_with_ops(
    repo_root: &Path,
) -> Result<Vec<crate::core::StreamName>, CompactError> {
    let dir = crate::paths::ops_dir(repo_root);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(CompactError::Io { path: dir, source }),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| CompactError::Io {
            path: dir.clone(),
            source,
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if let Ok(stream) = crate::core::StreamName::parse(name) {
                out.push(stream);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Owned handle to the periodic compaction worker.
#[derive(Debug)]
pub struct CompactionService {
    quit: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CompactionService {
    pub fn start(repo_root: PathBuf, config: CompactionConfig) -> Self {
        let (quit_tx, quit_rx) = bounded::<()>(0);
        let handle = std::thread::Builder::new()
            .name("evo-compactor".to_string())
            .spawn(move || loop {
                match quit_rx.recv_timeout(config.interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(err) = compact_repository(&repo_root, &config) {
                            tracing::warn!(error = %err, "compaction tick failed");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            })
            .expect("spawn compaction worker");
        Self {
            quit: Some(quit_tx),
            handle: Some(handle),
        }
    }

    /// Signal cancellation and wait for the current tick to finish.
    pub fn stop(&mut self) {
        self.quit.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CompactionService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FileId, LineId, NodeId, Op, OpKind, Rga, StreamName};
    use std::time::Duration;

    fn stream() -> StreamName {
        StreamName::parse("main").unwrap()
    }

    #[test]
    fn compact_repository_rewrites_oversized_logs() {
        let dir = tempfile::tempdir().unwrap();
        let oplog = OpLog::new(dir.path());
        let file = FileId::generate();
        let line = LineId::generate();
        let node = NodeId::from_bytes([1; 16]);
        for i in 0..20u64 {
            let kind = if i == 0 { OpKind::Insert } else { OpKind::Update };
            oplog
                .append(&Op {
                    kind,
                    lamport: i + 1,
                    node,
                    file,
                    line,
                    content: format!("v{i}"),
                    stream: stream(),
                    timestamp: None,
                })
                .unwrap();
        }
        let before = Rga::replay(oplog.load_all(&stream(), &file).unwrap())
            .unwrap()
            .materialize();

        let config = CompactionConfig {
            max_ops: 10,
            min_ops_to_keep: 1,
            tombstone_ttl: Duration::from_secs(60),
            interval: Duration::from_secs(3600),
        };
        let stats = compact_repository(dir.path(), &config).unwrap();
        assert_eq!(stats.files_rewritten, 1);

        let after_ops = oplog.load_all(&stream(), &file).unwrap();
        assert_eq!(after_ops.len(), 1);
        let after = Rga::replay(after_ops).unwrap().materialize();
        assert_eq!(before, after);
    }

    #[test]
    fn compact_repository_on_empty_repo_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let stats = compact_repository(dir.path(), &CompactionConfig::default()).unwrap();
        assert_eq!(stats, CompactionStats::default());
    }

    #[test]
    fn service_starts_and_stops_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompactionConfig {
            interval: Duration::from_millis(10),
            ..CompactionConfig::default()
        };
        let mut service = CompactionService::start(dir.path().to_path_buf(), config);
        std::thread::sleep(Duration::from_millis(50));
        service.stop();
        // Idempotent.
        service.stop();
    }
}
