//! Content-addressed large-file storage.
//!
//! Files above the configured threshold never enter the line CRDT; their
//! bytes are split into 1 MiB chunks stored under
//! `.evo/chunks/<sha256>`, with per-file metadata in
//! `.evo/largefiles/<file-uuid>/info.json`. Identical content is
//! deduplicated by whole-file hash and tracked with a reference count;
//! chunks are shared freely and garbage-collected when the last
//! referencing file is deleted.

pub mod gc;

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::FileId;
use crate::paths;

pub use gc::{LfsGcService, DEFAULT_GC_INTERVAL};

/// Chunk size: 1 MiB.
pub const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LfsError {
    #[error("large file {id} not found")]
    NotFound { id: FileId },

    #[error("expected {expected} bytes, read {got}")]
    SizeMismatch { expected: u64, got: u64 },

    #[error("malformed metadata {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type LfsResult<T> = std::result::Result<T, LfsError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: FileId,
    pub size: u64,
    /// SHA-256 of the whole content, hex.
    pub content_hash: String,
    pub num_chunks: usize,
    pub chunks: Vec<ChunkInfo>,
    pub ref_count: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkInfo {
    /// SHA-256 of the chunk, hex. Doubles as the chunk's file name.
    pub hash: String,
    pub size: u64,
}

#[derive(Debug)]
pub struct LargeFileStore {
    repo_root: PathBuf,
    lock: Mutex<()>,
}

impl LargeFileStore {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store `size` bytes from `reader` under `id`, deduplicating against
    /// existing content by whole-file hash.
    pub fn put(&self, id: &FileId, reader: &mut dyn Read, size: u64) -> LfsResult<FileInfo> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let chunks_dir = paths::chunks_dir(&self.repo_root);
        fs::create_dir_all(&chunks_dir).map_err(|source| LfsError::Io {
            path: chunks_dir.clone(),
            source,
        })?;

        let mut content_hash = Sha256::new();
        let mut chunks = Vec::new();
        let mut total: u64 = 0;
        let mut buf = vec![0u8; CHUNK_SIZE];
        while total < size {
            let want = ((size - total) as usize).min(CHUNK_SIZE);
            let mut filled = 0;
            while filled < want {
                let n = reader
                    .read(&mut buf[filled..want])
                    .map_err(|source| LfsError::Io {
                        path: chunks_dir.clone(),
                        source,
                    })?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            let chunk = &buf[..filled];
            content_hash.update(chunk);
            let chunk_hash = hex::encode(Sha256::digest(chunk));
            let chunk_path = paths::chunk_file(&self.repo_root, &chunk_hash);
            if !chunk_path.exists() {
                fs::write(&chunk_path, chunk).map_err(|source| LfsError::Io {
                    path: chunk_path,
                    source,
                })?;
            }
            chunks.push(ChunkInfo {
                hash: chunk_hash,
                size: filled as u64,
            });
            total += filled as u64;
        }
        if total != size {
            return Err(LfsError::SizeMismatch {
                expected: size,
                got: total,
            });
        }
        let hash = hex::encode(content_hash.finalize());

        // Same content already stored under another id: share its chunks
        // and bump the reference count on both records.
        if let Some((twin_id, mut twin)) = self.find_by_content_hash(&hash, Some(id))? {
            twin.ref_count += 1;
            self.save_info(&twin_id, &twin)?;
            let info = FileInfo {
                id: *id,
                size: twin.size,
                content_hash: twin.content_hash.clone(),
                num_chunks: twin.num_chunks,
                chunks: twin.chunks.clone(),
                ref_count: twin.ref_count,
                created: OffsetDateTime::now_utc(),
            };
            self.save_info(id, &info)?;
            return Ok(info);
        }

        let info = FileInfo {
            id: *id,
            size,
            content_hash: hash,
            num_chunks: chunks.len(),
            chunks,
            ref_count: 1,
            created: OffsetDateTime::now_utc(),
        };
        self.save_info(id, &info)?;
        Ok(info)
    }

    /// Stream the stored content of `id` into `writer`.
    pub fn get(&self, id: &FileId, writer: &mut dyn Write) -> LfsResult<()> {
        let info = self.info(id)?;
        for chunk in &info.chunks {
            let path = paths::chunk_file(&self.repo_root, &chunk.hash);
            let data = fs::read(&path).map_err(|source| LfsError::Io { path, source })?;
            writer
                .write_all(&data)
                .map_err(|source| LfsError::Io {
                    path: paths::chunks_dir(&self.repo_root),
                    source,
                })?;
        }
        Ok(())
    }

    pub fn info(&self, id: &FileId) -> LfsResult<FileInfo> {
        let path = paths::largefile_dir(&self.repo_root, id).join("info.json");
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LfsError::NotFound { id: *id })
            }
            Err(source) => return Err(LfsError::Io { path, source }),
        };
        serde_json::from_slice(&data).map_err(|e| LfsError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }

    /// Delete `id`'s record, decrement its content twin's reference
    /// count, and remove chunks nothing references any more.
    pub fn delete(&self, id: &FileId) -> LfsResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let info = self.info(id)?;
        let dir = paths::largefile_dir(&self.repo_root, id);
        fs::remove_dir_all(&dir).map_err(|source| LfsError::Io { path: dir, source })?;

        if let Some((twin_id, mut twin)) =
            self.find_by_content_hash(&info.content_hash, Some(id))?
        {
            twin.ref_count = twin.ref_count.saturating_sub(1);
            self.save_info(&twin_id, &twin)?;
        }

        for chunk in &info.chunks {
            if !self.chunk_referenced(&chunk.hash)? {
                let path = paths::chunk_file(&self.repo_root, &chunk.hash);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => return Err(LfsError::Io { path, source }),
                }
            }
        }
        Ok(())
    }

    /// Drop every chunk no stored file references.
    pub fn gc(&self) -> LfsResult<usize> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let dir = paths::chunks_dir(&self.repo_root);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(LfsError::Io { path: dir, source }),
        };
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|source| LfsError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Some(hash) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !self.chunk_referenced(hash)? {
                fs::remove_file(&path).map_err(|source| LfsError::Io { path, source })?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn save_info(&self, id: &FileId, info: &FileInfo) -> LfsResult<()> {
        let dir = paths::largefile_dir(&self.repo_root, id);
        fs::create_dir_all(&dir).map_err(|source| LfsError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join("info.json");
        let json = serde_json::to_vec_pretty(info).map_err(|e| LfsError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let mut file = File::create(&path).map_err(|source| LfsError::Io {
            path: path.clone(),
            source,
        })?;
        file.write_all(&json)
            .map_err(|source| LfsError::Io { path, source })
    }

    fn each_info(&self) -> LfsResult<Vec<(FileId, FileInfo)>> {
        let dir = paths::largefiles_dir(&self.repo_root);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(LfsError::Io { path: dir, source }),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LfsError::Io {
                path: dir.clone(),
                source,
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(id) = FileId::parse(&name) else { continue };
            match self.info(&id) {
                Ok(info) => out.push((id, info)),
                Err(LfsError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn find_by_content_hash(
        &self,
        hash: &str,
        excluding: Option<&FileId>,
    ) -> LfsResult<Option<(FileId, FileInfo)>> {
        for (id, info) in self.each_info()? {
            if Some(&id) == excluding {
                continue;
            }
            if info.content_hash == hash {
                return Ok(Some((id, info)));
            }
        }
        Ok(None)
    }

    fn chunk_referenced(&self, hash: &str) -> LfsResult<bool> {
        for (_, info) in self.each_info()? {
            if info.chunks.iter().any(|c| c.hash == hash) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
