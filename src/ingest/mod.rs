//! Working-tree ingestion.
//!
//! Scans tracked files, diffs each against the materialized document of
//! the current stream, and appends the resulting ops to the op log. Files
//! above the large-file threshold bypass the line CRDT: their content
//! goes to the chunk store and the document becomes a single stub line
//! `EVO-LFS:<file-uuid>:<size>`.
//!
//! Changed files are fanned out over a bounded worker pool; every worker
//! serializes its own appends per file, and the op log's per-file locks
//! make concurrent workers safe.

pub mod diff;

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crossbeam::channel;
use thiserror::Error;

use crate::core::{CoreError, FileId, LamportClock, LineId, NodeId, Op, OpKind, StreamName, WallClock};
use crate::index::{Index, IndexError};
use crate::lfs::{LargeFileStore, LfsError};
use crate::oplog::{OpLog, OpLogError};
use crate::paths;

pub use diff::{diff_lines, split_lines, LineDiff};

pub const DEFAULT_WORKERS: usize = 8;

/// Prefix of the stub line standing in for large-file content.
pub const LFS_STUB_PREFIX: &str = "EVO-LFS:";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IngestError {
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
    Index(#[from] IndexError),

    #[error(transparent)]
    Lfs(#[from] LfsError),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

// ---------------------------------------------------------------------------
// Ignore patterns
// ---------------------------------------------------------------------------

/// Patterns from `.evo-ignore`: one glob per line, `#` comments, blank
/// lines skipped, `dir/` shorthand for `dir/**`. `.evo` itself is always
/// ignored.
#[derive(Debug, Default)]
pub struct IgnoreList {
    patterns: Vec<glob::Pattern>,
}

impl IgnoreList {
    pub fn load(repo_root: &Path) -> IngestResult<Self> {
        let path = paths::ignore_file(repo_root);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(IngestError::Io { path, source }),
        };
        let mut patterns = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut pattern = line.to_string();
            if let Some(dir) = pattern.strip_suffix('/') {
                if !dir.contains("**") {
                    pattern = format!("{dir}/**");
                }
            }
            match glob::Pattern::new(&pattern) {
                Ok(p) => patterns.push(p),
                Err(err) => {
                    tracing::warn!(pattern = %pattern, %err, "skipping invalid ignore pattern");
                }
            }
        }
        Ok(Self { patterns })
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        if rel_path == paths::EVO_DIR || rel_path.starts_with(".evo/") {
            return true;
        }
        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..glob::MatchOptions::new()
        };
        self.patterns
            .iter()
            .any(|p| p.matches_with(rel_path, options))
    }
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// Everything one ingest pass needs. Owned by [`Repository`] in normal
/// use.
///
/// [`Repository`]: crate::repo::Repository
pub struct IngestContext<'a> {
    pub repo_root: &'a Path,
    pub stream: StreamName,
    pub node: NodeId,
    pub clock: &'a LamportClock,
    pub oplog: &'a OpLog,
    pub lfs: &'a LargeFileStore,
    pub index: &'a Index,
    pub large_threshold: u64,
    pub workers: usize,
}

/// Paths that produced at least one new op.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub changed: Vec<String>,
}

/// Ingest every tracked file of the working tree.
pub fn ingest_changes(ctx: &IngestContext<'_>) -> IngestResult<IngestReport> {
    let ignore = IgnoreList::load(ctx.repo_root)?;
    let files = list_working_files(ctx.repo_root, &ignore)?;

    let workers = ctx.workers.max(1).min(files.len().max(1));
    let (work_tx, work_rx) = channel::unbounded::<String>();
    let (result_tx, result_rx) = channel::unbounded::<IngestResult<Option<String>>>();
    for rel in files {
        work_tx.send(rel).expect("receiver alive");
    }
    drop(work_tx);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for rel in work_rx {
                    let outcome = process_file(ctx, &rel)
                        .map(|changed| changed.then_some(rel));
                    if result_tx.send(outcome).is_err() {
                        return;
                    }
                }
            });
        }
        drop(result_tx);
    });

    let mut changed = Vec::new();
    for outcome in result_rx {
        if let Some(rel) = outcome? {
            changed.push(rel);
        }
    }
    changed.sort();
    Ok(IngestReport { changed })
}

/// Diff one working-tree file against its document and append the
/// resulting ops. Returns whether anything was emitted. Untracked and
/// vanished paths are skipped.
pub fn process_file(ctx: &IngestContext<'_>, rel_path: &str) -> IngestResult<bool> {
    let Some(file_id) = ctx.index.lookup(rel_path) else {
        return Ok(false);
    };
    let abs = ctx.repo_root.join(rel_path);
    let meta = match fs::metadata(&abs) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(source) => return Err(IngestError::Io { path: abs, source }),
    };
    if meta.is_dir() {
        return Ok(false);
    }

    let existing = ctx.oplog.load_all(&ctx.stream, &file_id)?;
    let doc = crate::core::Rga::replay(existing)?;

    if meta.len() > ctx.large_threshold {
        return ingest_large_file(ctx, &file_id, &abs, meta.len(), &doc);
    }

    let raw = fs::read(&abs).map_err(|source| IngestError::Io {
        path: abs.clone(),
        source,
    })?;
    let disk_lines = split_lines(&String::from_utf8_lossy(&raw));
    let doc_lines = doc.materialize();
    let diff = diff_lines(&doc_lines, &disk_lines);
    if diff.is_empty() {
        return Ok(false);
    }

    let line_ids = doc.line_ids();
    let emit = |kind: OpKind, line: LineId, content: String| -> IngestResult<()> {
        let op = Op {
            kind,
            lamport: ctx.clock.next(),
            node: ctx.node,
            file: file_id,
            line,
            content,
            stream: ctx.stream.clone(),
            timestamp: Some(WallClock::now()),
        };
        ctx.oplog.append(&op)?;
        Ok(())
    };

    for (doc_index, content) in diff.updates {
        emit(OpKind::Update, line_ids[doc_index], content)?;
    }
    for doc_index in diff.deletes {
        emit(OpKind::Delete, line_ids[doc_index], String::new())?;
    }
    for content in diff.inserts {
        emit(OpKind::Insert, LineId::generate(), content)?;
    }
    Ok(true)
}

fn ingest_large_file(
    ctx: &IngestContext<'_>,
    file_id: &FileId,
    abs: &Path,
    size: u64,
    doc: &crate::core::Rga,
) -> IngestResult<bool> {
    let mut reader = File::open(abs).map_err(|source| IngestError::Io {
        path: abs.to_path_buf(),
        source,
    })?;
    let info = ctx.lfs.put(file_id, &mut reader, size)?;

    let stub = format!("{LFS_STUB_PREFIX}{file_id}:{}", info.size);
    let doc_lines = doc.materialize();
    if doc_lines.len() == 1 && doc_lines[0] == stub {
        return Ok(false);
    }

    // The document must end up as exactly the stub line: tombstone
    // whatever line content preceded the threshold crossing, then insert
    // the stub.
    for line in doc.line_ids() {
        let op = Op {
            kind: OpKind::Delete,
            lamport: ctx.clock.next(),
            node: ctx.node,
            file: *file_id,
            line,
            content: String::new(),
            stream: ctx.stream.clone(),
            timestamp: Some(WallClock::now()),
        };
        ctx.oplog.append(&op)?;
    }
    let op = Op {
        kind: OpKind::Insert,
        lamport: ctx.clock.next(),
        node: ctx.node,
        file: *file_id,
        line: LineId::generate(),
        content: stub,
        stream: ctx.stream.clone(),
        timestamp: Some(WallClock::now()),
    };
    ctx.oplog.append(&op)?;
    Ok(true)
}

/// All regular files under `repo_root`, repo-relative with `/`
/// separators, minus ignored paths.
pub fn list_working_files(repo_root: &Path, ignore: &IgnoreList) -> IngestResult<Vec<String>> {
    let mut out = Vec::new();
    let mut stack = vec![repo_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| IngestError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| IngestError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            let rel = path
                .strip_prefix(repo_root)
                .expect("walk stays under the root")
                .to_string_lossy()
                .replace('\\', "/");
            if ignore.is_ignored(&rel) {
                continue;
            }
            let file_type = entry.file_type().map_err(|source| IngestError::Io {
                path: path.clone(),
                source,
            })?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                out.push(rel);
            }
        }
    }
    out.sort();
    Ok(out)
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Modified,
    New,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub path: String,
    pub state: PathState,
}

#[derive(Debug)]
pub struct RepoStatus {
    pub stream: StreamName,
    pub files: Vec<FileStatus>,
}

/// Compare the working tree against the materialized documents of the
/// context's stream.
pub fn status(ctx: &IngestContext<'_>) -> IngestResult<RepoStatus> {
    let ignore = IgnoreList::load(ctx.repo_root)?;
    let working = list_working_files(ctx.repo_root, &ignore)?;
    let working_set: HashSet<&str> = working.iter().map(String::as_str).collect();

    let mut files = Vec::new();
    for (rel, file_id) in ctx.index.iter() {
        if !working_set.contains(rel) {
            files.push(FileStatus {
                path: rel.to_string(),
                state: PathState::Deleted,
            });
            continue;
        }
        let abs = ctx.repo_root.join(rel);
        let meta = match fs::metadata(&abs) {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        let doc_lines = {
            let ops = ctx.oplog.load_all(&ctx.stream, &file_id)?;
            crate::core::Rga::replay(ops)?.materialize()
        };
        let disk_lines = if meta.len() > ctx.large_threshold {
            vec![format!("{LFS_STUB_PREFIX}{file_id}:{}", meta.len())]
        } else {
            let raw = fs::read(&abs).map_err(|source| IngestError::Io {
                path: abs.clone(),
                source,
            })?;
            split_lines(&String::from_utf8_lossy(&raw))
        };
        if doc_lines != disk_lines {
            files.push(FileStatus {
                path: rel.to_string(),
                state: PathState::Modified,
            });
        }
    }
    for rel in &working {
        if ctx.index.lookup(rel).is_none() {
            files.push(FileStatus {
                path: rel.clone(),
                state: PathState::New,
            });
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(RepoStatus {
        stream: ctx.stream.clone(),
        files,
    })
}
