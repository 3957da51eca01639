//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use evo_core::{Repository, StreamName};

pub fn temp_repo() -> (tempfile::TempDir, Repository) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let repo = Repository::init(dir.path()).expect("init repository");
    (dir, repo)
}

pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).expect("create parent dirs");
    }
    fs::write(path, contents).expect("write working file");
}

/// Track everything in the working tree and ingest it.
pub fn track_and_ingest(repo: &Repository) -> Vec<String> {
    repo.update_index().expect("update index");
    repo.ingest().expect("ingest").changed
}

pub fn stream(name: &str) -> StreamName {
    StreamName::parse(name).expect("valid stream name")
}

/// The materialized lines of a tracked path in the current stream.
pub fn doc_lines(repo: &Repository, rel: &str) -> Vec<String> {
    repo.file_lines(rel)
        .expect("materialize")
        .expect("path is tracked")
}
