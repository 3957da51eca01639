//! End-to-end flows: ingest, materialize, commit, revert.

mod common;

use common::{doc_lines, stream, temp_repo, track_and_ingest, write_file};
use evo_core::{PathState, Repository};

#[test]
fn ingest_materializes_the_working_tree() {
    let (dir, repo) = temp_repo();
    write_file(dir.path(), "notes.txt", "alpha\nbeta\ngamma\n");

    let changed = track_and_ingest(&repo);
    assert_eq!(changed, vec!["notes.txt".to_string()]);
    assert_eq!(doc_lines(&repo, "notes.txt"), vec!["alpha", "beta", "gamma"]);
}

#[test]
fn reingesting_an_unchanged_tree_emits_nothing() {
    let (dir, repo) = temp_repo();
    write_file(dir.path(), "notes.txt", "alpha\nbeta\n");
    track_and_ingest(&repo);

    let changed = repo.ingest().unwrap().changed;
    assert!(changed.is_empty(), "unchanged tree re-emitted ops: {changed:?}");
}

#[test]
fn edits_become_updates_deletes_and_inserts() {
    let (dir, repo) = temp_repo();
    write_file(dir.path(), "notes.txt", "one\ntwo\nthree\n");
    track_and_ingest(&repo);

    // Change the middle line.
    write_file(dir.path(), "notes.txt", "one\nTWO\nthree\n");
    assert_eq!(repo.ingest().unwrap().changed.len(), 1);
    assert_eq!(doc_lines(&repo, "notes.txt"), vec!["one", "TWO", "three"]);

    // Shrink.
    write_file(dir.path(), "notes.txt", "one\n");
    repo.ingest().unwrap();
    assert_eq!(doc_lines(&repo, "notes.txt"), vec!["one"]);

    // Grow at the end.
    write_file(dir.path(), "notes.txt", "one\nfour\n");
    repo.ingest().unwrap();
    assert_eq!(doc_lines(&repo, "notes.txt"), vec!["one", "four"]);
}

#[test]
fn crlf_input_is_normalized() {
    let (dir, repo) = temp_repo();
    write_file(dir.path(), "dos.txt", "a\r\nb\r\n");
    track_and_ingest(&repo);
    assert_eq!(doc_lines(&repo, "dos.txt"), vec!["a", "b"]);
}

#[test]
fn status_reports_modified_new_and_deleted() {
    let (dir, repo) = temp_repo();
    write_file(dir.path(), "tracked.txt", "content\n");
    write_file(dir.path(), "gone.txt", "bye\n");
    track_and_ingest(&repo);

    write_file(dir.path(), "tracked.txt", "changed\n");
    write_file(dir.path(), "brand-new.txt", "hi\n");
    std::fs::remove_file(dir.path().join("gone.txt")).unwrap();

    let status = repo.status().unwrap();
    let state_of = |path: &str| {
        status
            .files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.state)
    };
    assert_eq!(state_of("tracked.txt"), Some(PathState::Modified));
    assert_eq!(state_of("brand-new.txt"), Some(PathState::New));
    assert_eq!(state_of("gone.txt"), Some(PathState::Deleted));
}

#[test]
fn commit_then_revert_update_restores_content() {
    let (dir, repo) = temp_repo();
    write_file(dir.path(), "file.txt", "a\n");
    track_and_ingest(&repo);
    repo.commit("insert a", false).unwrap();

    write_file(dir.path(), "file.txt", "b\n");
    repo.ingest().unwrap();
    let update_commit = repo.commit("update to b", false).unwrap();
    assert_eq!(doc_lines(&repo, "file.txt"), vec!["b"]);

    repo.revert(&update_commit.id).unwrap();
    assert_eq!(doc_lines(&repo, "file.txt"), vec!["a"]);
}

#[test]
fn commit_then_revert_delete_restores_the_line() {
    let (dir, repo) = temp_repo();
    write_file(dir.path(), "file.txt", "a\nkeep\n");
    track_and_ingest(&repo);
    repo.commit("base", false).unwrap();

    write_file(dir.path(), "file.txt", "keep\n");
    repo.ingest().unwrap();
    let delete_commit = repo.commit("drop first line", false).unwrap();
    assert_eq!(doc_lines(&repo, "file.txt"), vec!["keep"]);

    repo.revert(&delete_commit.id).unwrap();
    assert_eq!(doc_lines(&repo, "file.txt"), vec!["a", "keep"]);
}

#[test]
fn commits_list_in_creation_order_and_gather_is_incremental() {
    let (dir, repo) = temp_repo();
    write_file(dir.path(), "file.txt", "one\n");
    track_and_ingest(&repo);
    let first = repo.commit("first", false).unwrap();
    assert!(!first.operations.is_empty());

    write_file(dir.path(), "file.txt", "one\ntwo\n");
    repo.ingest().unwrap();
    let second = repo.commit("second", false).unwrap();
    assert_eq!(second.operations.len(), 1);

    let listed = repo.list_commits(&stream("main")).unwrap();
    let messages: Vec<_> = listed.iter().map(|c| c.message.as_str()).collect();
    assert_eq!(messages, vec!["first", "second"]);
}

#[test]
fn documents_rematerialize_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let repo = Repository::init(dir.path()).unwrap();
        write_file(dir.path(), "file.txt", "persisted\nlines\n");
        track_and_ingest(&repo);
    }
    let repo = Repository::open(dir.path()).unwrap();
    assert_eq!(doc_lines(&repo, "file.txt"), vec!["persisted", "lines"]);
}

#[test]
fn ignored_paths_are_not_tracked() {
    let (dir, repo) = temp_repo();
    write_file(dir.path(), ".evo-ignore", "*.log\n");
    write_file(dir.path(), "kept.txt", "keep\n");
    write_file(dir.path(), "noise.log", "drop\n");

    track_and_ingest(&repo);
    assert!(repo.file_lines("kept.txt").unwrap().is_some());
    assert!(repo.file_lines("noise.log").unwrap().is_none());
}
