//! The on-disk op log store.
//!
//! One `.bin` file per `(stream, file)`, containing a concatenation of
//! framed records. Appends are atomic per record: one fully framed write,
//! serialized by an in-process per-file mutex. Readers take no lock; a
//! read racing an append sees either the whole new record or a torn tail,
//! and the tail is discarded by the frame reader. Cross-process writers
//! are not supported.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::core::{FileId, Op, StreamName};
use crate::paths;

use super::frame::{encode_op, OpReader};
use super::{OpLogError, OpLogResult};

#[derive(Debug)]
pub struct OpLog {
    repo_root: PathBuf,
    /// Per-file append locks, file-granularity single-writer discipline.
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl OpLog {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn op_file(&self, stream: &StreamName, file: &FileId) -> PathBuf {
        paths::op_file(&self.repo_root, stream, file)
    }

    /// Append exactly one framed record, creating directories and the file
    /// as needed, and flush before returning.
    pub fn append(&self, op: &Op) -> OpLogResult<()> {
        let path = self.op_file(&op.stream, &op.file);
        let frame = encode_op(op)?;

        let lock = self.file_lock(&path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| OpLogError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| OpLogError::Io {
                path: path.clone(),
                source,
            })?;
        file.write_all(&frame).map_err(|source| OpLogError::Io {
            path: path.clone(),
            source,
        })?;
        file.flush().map_err(|source| OpLogError::Io {
            path: path.clone(),
            source,
        })
    }

    /// Read every fully written record of one file's log, tolerating a
    /// torn tail. A missing file is an empty log.
    pub fn load_all(&self, stream: &StreamName, file: &FileId) -> OpLogResult<Vec<Op>> {
        self.load(stream, file, false)
    }

    /// Like [`OpLog::load_all`] but a full-size, ill-formed record fails
    /// with [`OpLogError::CorruptOp`] instead of ending the read.
    pub fn load_all_strict(&self, stream: &StreamName, file: &FileId) -> OpLogResult<Vec<Op>> {
        self.load(stream, file, true)
    }

    fn load(&self, stream: &StreamName, file: &FileId, strict: bool) -> OpLogResult<Vec<Op>> {
        let path = self.op_file(stream, file);
        let handle = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(OpLogError::Io { path, source }),
        };
        let mut reader = OpReader::new(BufReader::new(handle), stream.clone(), &path, strict);
        let mut out = Vec::new();
        while let Some(op) = reader.read_next()? {
            out.push(op);
        }
        Ok(out)
    }

    /// The file ids that have a log in this stream.
    pub fn file_ids(&self, stream: &StreamName) -> OpLogResult<Vec<FileId>> {
        let dir = paths::stream_ops_dir(&self.repo_root, stream);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(OpLogError::Io { path: dir, source }),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| OpLogError::Io {
                path: dir.clone(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(".bin") else {
                continue;
            };
            if let Ok(id) = FileId::parse(stem) {
                out.push(id);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Load every file's ops in a stream, in log (append) order per file.
    pub fn load_stream(&self, stream: &StreamName) -> OpLogResult<Vec<(FileId, Vec<Op>)>> {
        let mut out = Vec::new();
        for file in self.file_ids(stream)? {
            let ops = self.load_all(stream, &file)?;
            out.push((file, ops));
        }
        Ok(out)
    }

    /// Atomically replace one file's log with `ops`. Writes a sibling
    /// `.tmp` and renames over the original; the rename is the
    /// linearization point, so readers either see the old log or the new
    /// one, never a mixture.
    pub fn replace(&self, stream: &StreamName, file: &FileId, ops: &[Op]) -> OpLogResult<()> {
        let path = self.op_file(stream, file);
        let tmp = path.with_extension("bin.tmp");

        let lock = self.file_lock(&path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| OpLogError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let mut out = File::create(&tmp).map_err(|source| OpLogError::Io {
            path: tmp.clone(),
            source,
        })?;
        for op in ops {
            let frame = encode_op(op)?;
            out.write_all(&frame).map_err(|source| OpLogError::Io {
                path: tmp.clone(),
                source,
            })?;
        }
        out.sync_all().map_err(|source| OpLogError::Io {
            path: tmp.clone(),
            source,
        })?;
        drop(out);
        fs::rename(&tmp, &path).map_err(|source| OpLogError::Io { path, source })
    }

    fn file_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }
}
