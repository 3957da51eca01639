//! Large files bypass the line CRDT via the chunk store and a stub line.

mod common;

use common::{doc_lines, temp_repo, track_and_ingest, write_file};
use evo_core::Index;

#[test]
fn oversized_file_becomes_a_stub_line() {
    let (dir, repo) = temp_repo();
    // Default threshold is 1,000,000 bytes.
    let big = "x".repeat(2_000_000);
    write_file(dir.path(), "blob.bin", &big);

    let changed = track_and_ingest(&repo);
    assert_eq!(changed, vec!["blob.bin".to_string()]);

    let index = Index::load(dir.path()).unwrap();
    let file_id = index.lookup("blob.bin").unwrap();

    let lines = doc_lines(&repo, "blob.bin");
    assert_eq!(lines, vec![format!("EVO-LFS:{file_id}:2000000")]);

    let info = repo.lfs().info(&file_id).unwrap();
    assert_eq!(info.size, 2_000_000);
    assert_eq!(info.id, file_id);

    let mut out = Vec::new();
    repo.lfs().get(&file_id, &mut out).unwrap();
    assert_eq!(out.len(), 2_000_000);
}

#[test]
fn unchanged_large_file_emits_nothing_on_reingest() {
    let (dir, repo) = temp_repo();
    write_file(dir.path(), "blob.bin", &"y".repeat(1_500_000));
    track_and_ingest(&repo);

    let changed = repo.ingest().unwrap().changed;
    assert!(changed.is_empty());
}

#[test]
fn file_crossing_the_threshold_replaces_its_lines_with_the_stub() {
    let (dir, repo) = temp_repo();
    write_file(dir.path(), "grows.txt", "small\ntext\n");
    track_and_ingest(&repo);
    assert_eq!(doc_lines(&repo, "grows.txt"), vec!["small", "text"]);

    write_file(dir.path(), "grows.txt", &"z".repeat(1_200_000));
    repo.ingest().unwrap();

    let index = Index::load(dir.path()).unwrap();
    let file_id = index.lookup("grows.txt").unwrap();
    let lines = doc_lines(&repo, "grows.txt");
    assert_eq!(lines, vec![format!("EVO-LFS:{file_id}:1200000")]);
}
