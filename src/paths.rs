//! Repository layout helpers.
//!
//! Everything the engine persists lives under `<repo>/.evo/`:
//!
//! ```text
//! .evo/
//!   HEAD                           current stream name
//!   node-id                        this node's stable id
//!   streams/<name>                 marker file per stream
//!   ops/<stream>/<file-uuid>.bin   op logs
//!   commits/<stream>/<id>.bin      commit records
//!   config/config.toml             repo config
//!   index                          "<file-uuid> <path>" per line
//!   largefiles/<file-uuid>/        large-file metadata
//!   chunks/<sha256>                content-addressed chunks
//! ```

use std::path::{Path, PathBuf};

use crate::core::{CommitId, FileId, StreamName};

pub const EVO_DIR: &str = ".evo";

pub fn evo_dir(repo: &Path) -> PathBuf {
    repo.join(EVO_DIR)
}

pub fn head_file(repo: &Path) -> PathBuf {
    evo_dir(repo).join("HEAD")
}

pub fn node_id_file(repo: &Path) -> PathBuf {
    evo_dir(repo).join("node-id")
}

pub fn streams_dir(repo: &Path) -> PathBuf {
    evo_dir(repo).join("streams")
}

pub fn stream_marker(repo: &Path, stream: &StreamName) -> PathBuf {
    streams_dir(repo).join(stream.as_str())
}

pub fn ops_dir(repo: &Path) -> PathBuf {
    evo_dir(repo).join("ops")
}

pub fn stream_ops_dir(repo: &Path, stream: &StreamName) -> PathBuf {
    ops_dir(repo).join(stream.as_str())
}

pub fn op_file(repo: &Path, stream: &StreamName, file: &FileId) -> PathBuf {
    stream_ops_dir(repo, stream).join(format!("{file}.bin"))
}

pub fn commits_dir(repo: &Path) -> PathBuf {
    evo_dir(repo).join("commits")
}

pub fn stream_commits_dir(repo: &Path, stream: &StreamName) -> PathBuf {
    commits_dir(repo).join(stream.as_str())
}

pub fn commit_file(repo: &Path, stream: &StreamName, id: &CommitId) -> PathBuf {
    stream_commits_dir(repo, stream).join(format!("{id}.bin"))
}

pub fn config_dir(repo: &Path) -> PathBuf {
    evo_dir(repo).join("config")
}

pub fn config_file(repo: &Path) -> PathBuf {
    config_dir(repo).join("config.toml")
}

pub fn index_file(repo: &Path) -> PathBuf {
    evo_dir(repo).join("index")
}

pub fn largefiles_dir(repo: &Path) -> PathBuf {
    evo_dir(repo).join("largefiles")
}

pub fn largefile_dir(repo: &Path, file: &FileId) -> PathBuf {
    largefiles_dir(repo).join(file.to_string())
}

pub fn chunks_dir(repo: &Path) -> PathBuf {
    evo_dir(repo).join("chunks")
}

pub fn chunk_file(repo: &Path, hash: &str) -> PathBuf {
    chunks_dir(repo).join(hash)
}

pub fn ignore_file(repo: &Path) -> PathBuf {
    repo.join(".evo-ignore")
}
