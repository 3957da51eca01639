//! The path ↔ FileId index, `.evo/index`.
//!
//! One record per line: `"<file-uuid> <path>\n"`. There is no escaping;
//! a path containing a newline is rejected outright.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::FileId;
use crate::paths;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IndexError {
    #[error("path `{path}` cannot be indexed: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("malformed index line {line_no}: {line:?}")]
    Malformed { line_no: usize, line: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// In-memory view of the index. Paths are repo-relative with `/`
/// separators.
#[derive(Debug, Default, Clone)]
pub struct Index {
    by_path: BTreeMap<String, FileId>,
}

impl Index {
    /// Load the index; a missing file is an empty index.
    pub fn load(repo_root: &Path) -> Result<Self, IndexError> {
        let path = paths::index_file(repo_root);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(IndexError::Io { path, source }),
        };
        let mut by_path = BTreeMap::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((id, rel)) = line.split_once(' ') else {
                return Err(IndexError::Malformed {
                    line_no: line_no + 1,
                    line: line.to_string(),
                });
            };
            let Ok(id) = FileId::parse(id) else {
                return Err(IndexError::Malformed {
                    line_no: line_no + 1,
                    line: line.to_string(),
                });
            };
            by_path.insert(rel.to_string(), id);
        }
        Ok(Self { by_path })
    }

    pub fn save(&self, repo_root: &Path) -> Result<(), IndexError> {
        let path = paths::index_file(repo_root);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| IndexError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let mut out = String::new();
        for (rel, id) in &self.by_path {
            out.push_str(&format!("{id} {rel}\n"));
        }
        fs::write(&path, out).map_err(|source| IndexError::Io { path, source })
    }

    pub fn lookup(&self, rel_path: &str) -> Option<FileId> {
        self.by_path.get(rel_path).copied()
    }

    pub fn path_of(&self, id: &FileId) -> Option<&str> {
        self.by_path
            .iter()
            .find(|(_, fid)| *fid == id)
            .map(|(path, _)| path.as_str())
    }

    /// Track a path, assigning a fresh id if it is new. Rejects paths
    /// that cannot be represented in the line-oriented format.
    pub fn track(&mut self, rel_path: &str) -> Result<FileId, IndexError> {
        if rel_path.contains('\n') {
            return Err(IndexError::InvalidPath {
                path: rel_path.replace('\n', "\\n"),
                reason: "contains a newline".to_string(),
            });
        }
        if rel_path.is_empty() {
            return Err(IndexError::InvalidPath {
                path: String::new(),
                reason: "empty".to_string(),
            });
        }
        Ok(*self
            .by_path
            .entry(rel_path.to_string())
            .or_insert_with(FileId::generate))
    }

    pub fn untrack(&mut self, rel_path: &str) -> Option<FileId> {
        self.by_path.remove(rel_path)
    }

    /// Reconcile with the set of paths currently in the working tree:
    /// new paths get fresh ids, vanished paths are dropped.
    pub fn update<'a>(
        &mut self,
        working_paths: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), IndexError> {
        let mut seen = std::collections::BTreeSet::new();
        for path in working_paths {
            self.track(path)?;
            seen.insert(path.to_string());
        }
        self.by_path.retain(|path, _| seen.contains(path));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FileId)> {
        self.by_path.iter().map(|(p, id)| (p.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}
