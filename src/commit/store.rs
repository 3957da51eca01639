//! Commit record persistence.
//!
//! One file per commit at `.evo/commits/<stream>/<commit-uuid>.bin`:
//! a 4-byte big-endian length followed by that many bytes of UTF-8 JSON.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::{CommitId, FileId, LineId, NodeId, Op, OpKind, StreamName};
use crate::paths;

use super::{Commit, CommitError, CommitResult, ExtendedOp};

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCommit {
    id: String,
    stream: String,
    message: String,
    author_name: String,
    author_email: String,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    operations: Vec<WireExtendedOp>,
}

#[derive(Serialize, Deserialize)]
struct WireExtendedOp {
    op: WireOp,
    #[serde(
        rename = "oldContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    old_content: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireOp {
    #[serde(rename = "type")]
    kind: String,
    lamport: u64,
    node: String,
    file: String,
    line: String,
    content: String,
}

fn to_wire(commit: &Commit) -> WireCommit {
    WireCommit {
        id: commit.id.to_string(),
        stream: commit.stream.as_str().to_string(),
        message: commit.message.clone(),
        author_name: commit.author_name.clone(),
        author_email: commit.author_email.clone(),
        timestamp: commit.timestamp,
        signature: commit.signature.clone(),
        operations: commit
            .operations
            .iter()
            .map(|eop| WireExtendedOp {
                op: WireOp {
                    kind: eop.op.kind.as_str().to_string(),
                    lamport: eop.op.lamport,
                    node: eop.op.node.to_string(),
                    file: eop.op.file.to_string(),
                    line: eop.op.line.to_string(),
                    content: eop.op.content.clone(),
                },
                old_content: eop.old_content.clone(),
            })
            .collect(),
    }
}

fn from_wire(wire: WireCommit, path: &Path) -> CommitResult<Commit> {
    let corrupt = |reason: String| CommitError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };
    let id = CommitId::parse(&wire.id).map_err(|e| corrupt(e.to_string()))?;
    let stream = StreamName::parse(wire.stream).map_err(|e| corrupt(e.to_string()))?;
    let mut operations = Vec::with_capacity(wire.operations.len());
    for weop in wire.operations {
        let kind = OpKind::parse(&weop.op.kind)
            .ok_or_else(|| corrupt(format!("unknown op type `{}`", weop.op.kind)))?;
        operations.push(ExtendedOp {
            op: Op {
                kind,
                lamport: weop.op.lamport,
                node: NodeId::parse(&weop.op.node).map_err(|e| corrupt(e.to_string()))?,
                file: FileId::parse(&weop.op.file).map_err(|e| corrupt(e.to_string()))?,
                line: LineId::parse(&weop.op.line).map_err(|e| corrupt(e.to_string()))?,
                content: weop.op.content,
                stream: stream.clone(),
                timestamp: None,
            },
            old_content: weop.old_content,
        });
    }
    Ok(Commit {
        id,
        stream,
        message: wire.message,
        author_name: wire.author_name,
        author_email: wire.author_email,
        timestamp: wire.timestamp,
        signature: wire.signature,
        operations,
    })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CommitStore {
    repo_root: PathBuf,
}

impl CommitStore {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn commit_file(&self, stream: &StreamName, id: &CommitId) -> PathBuf {
        paths::commit_file(&self.repo_root, stream, id)
    }

    /// Persist one commit record. Records are append-only: a commit is
    /// written once and never mutated.
    pub fn save(&self, commit: &Commit) -> CommitResult<()> {
        let path = self.commit_file(&commit.stream, &commit.id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| CommitError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_vec(&to_wire(commit)).map_err(|e| CommitError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let mut out = File::create(&path).map_err(|source| CommitError::Io {
            path: path.clone(),
            source,
        })?;
        let len = u32::try_from(json.len()).map_err(|_| CommitError::Corrupt {
            path: path.clone(),
            reason: "commit record exceeds u32 length".to_string(),
        })?;
        out.write_all(&len.to_be_bytes())
            .and_then(|()| out.write_all(&json))
            .and_then(|()| out.flush())
            .map_err(|source| CommitError::Io { path, source })
    }

    pub fn load(&self, path: &Path) -> CommitResult<Commit> {
        let mut file = File::open(path).map_err(|source| CommitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)
            .map_err(|source| CommitError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut json = vec![0u8; len];
        file.read_exact(&mut json)
            .map_err(|source| CommitError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let wire: WireCommit =
            serde_json::from_slice(&json).map_err(|e| CommitError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        from_wire(wire, path)
    }

    /// All commits of one stream, sorted by timestamp ascending (ties
    /// broken by id for determinism). A stream with no commits yet is
    /// an empty list.
    pub fn list(&self, stream: &StreamName) -> CommitResult<Vec<Commit>> {
        let dir = paths::stream_commits_dir(&self.repo_root, stream);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(CommitError::Io { path: dir, source }),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CommitError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }
            out.push(self.load(&path)?);
        }
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    /// Stream names that have a commits directory.
    pub fn streams(&self) -> CommitResult<Vec<StreamName>> {
        let dir = paths::commits_dir(&self.repo_root);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(CommitError::Io { path: dir, source }),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CommitError::Io {
                path: dir.clone(),
                source,
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(stream) = StreamName::parse(name) {
                    out.push(stream);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Locate a commit by id, scanning every stream.
    pub fn find(&self, id: &CommitId) -> CommitResult<Option<Commit>> {
        for stream in self.streams()? {
            let path = self.commit_file(&stream, id);
            if path.exists() {
                return Ok(Some(self.load(&path)?));
            }
        }
        Ok(None)
    }

    /// Whether `stream` already holds a commit with this id.
    pub fn contains(&self, stream: &StreamName, id: &CommitId) -> bool {
        self.commit_file(stream, id).exists()
    }
}
