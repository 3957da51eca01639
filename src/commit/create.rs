//! Commit creation and the auto-gather pass.

use std::collections::HashSet;

use time::OffsetDateTime;

use crate::core::{CommitId, OpKey, OpKind, Rga, StreamName};
use crate::oplog::OpLog;
use crate::signing::Signer;

use super::{sign_commit, Commit, CommitResult, CommitStore, ExtendedOp};

/// Collect the ops durable in `stream`'s log that no commit has captured
/// yet, attaching the superseded content to every update and delete.
///
/// Known ops are identified by their `(lamport, node, line)` key across
/// all existing commits of the stream. The superseded content of an op is
/// looked up in the per-file document state built from the ops that
/// strictly precede it in the total order.
pub fn gather_new_ops(oplog: &OpLog, store: &CommitStore, stream: &StreamName) -> CommitResult<Vec<ExtendedOp>> {
    let mut known: HashSet<OpKey> = HashSet::new();
    for commit in store.list(stream)? {
        for eop in &commit.operations {
            known.insert(eop.op.key());
        }
    }

    let mut gathered = Vec::new();
    for (_file, mut ops) in oplog.load_stream(stream)? {
        ops.sort_by(|a, b| a.cmp_order(b));
        let mut doc = Rga::new();
        for op in ops {
            if !known.contains(&op.key()) {
                let old_content = match op.kind {
                    OpKind::Update | OpKind::Delete => doc.line_map().get(&op.line).cloned(),
                    OpKind::Insert => None,
                };
                gathered.push(ExtendedOp::with_old_content(op.clone(), old_content));
            }
            doc.apply(op)?;
        }
    }
    gathered.sort_by(|a, b| a.op.cmp_order(&b.op));
    Ok(gathered)
}

/// Create a commit in `stream`.
///
/// An empty `requested` list auto-gathers every op not yet captured by a
/// commit. The ops referenced must already be durable in the stream's op
/// log; auto-gather guarantees this, callers passing explicit ops are
/// responsible for it.
#[allow(clippy::too_many_arguments)]
pub fn create_commit(
    oplog: &OpLog,
    store: &CommitStore,
    stream: &StreamName,
    message: &str,
    author_name: &str,
    author_email: &str,
    requested: Vec<ExtendedOp>,
    signer: Option<&dyn Signer>,
) -> CommitResult<Commit> {
    let operations = if requested.is_empty() {
        gather_new_ops(oplog, store, stream)?
    } else {
        requested
    };

    let mut commit = Commit {
        id: CommitId::generate(),
        stream: stream.clone(),
        message: message.to_string(),
        author_name: author_name.to_string(),
        author_email: author_email.to_string(),
        timestamp: OffsetDateTime::now_utc(),
        signature: None,
        operations,
    };
    if let Some(signer) = signer {
        commit.signature = Some(sign_commit(&commit, signer)?);
    }
    store.save(&commit)?;
    Ok(commit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FileId, LineId, NodeId, Op, StreamName};

    fn stream() -> StreamName {
        StreamName::parse("main").unwrap()
    }

    fn op(file: FileId, line: LineId, kind: OpKind, lamport: u64, content: &str) -> Op {
        Op {
            kind,
            lamport,
            node: NodeId::from_bytes([1; 16]),
            file,
            line,
            content: content.to_string(),
            stream: stream(),
            timestamp: None,
        }
    }

    #[test]
    fn gather_attaches_old_content_to_updates_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let oplog = OpLog::new(dir.path());
        let store = CommitStore::new(dir.path());
        let file = FileId::generate();
        let line_a = LineId::generate();
        let line_b = LineId::generate();

        oplog.append(&op(file, line_a, OpKind::Insert, 1, "alpha")).unwrap();
        oplog.append(&op(file, line_b, OpKind::Insert, 2, "beta")).unwrap();
        oplog.append(&op(file, line_a, OpKind::Update, 3, "alpha2")).unwrap();
        oplog.append(&op(file, line_b, OpKind::Delete, 4, "")).unwrap();

        let gathered = gather_new_ops(&oplog, &store, &stream()).unwrap();
        assert_eq!(gathered.len(), 4);
        // Sorted by total order.
        assert_eq!(gathered[0].op.lamport, 1);
        assert_eq!(gathered[0].old_content, None);
        assert_eq!(gathered[2].op.kind, OpKind::Update);
        assert_eq!(gathered[2].old_content.as_deref(), Some("alpha"));
        assert_eq!(gathered[3].op.kind, OpKind::Delete);
        assert_eq!(gathered[3].old_content.as_deref(), Some("beta"));
    }

    #[test]
    fn gather_skips_ops_already_committed() {
        let dir = tempfile::tempdir().unwrap();
        let oplog = OpLog::new(dir.path());
        let store = CommitStore::new(dir.path());
        let file = FileId::generate();
        let line = LineId::generate();

        oplog.append(&op(file, line, OpKind::Insert, 1, "alpha")).unwrap();
        create_commit(&oplog, &store, &stream(), "first", "a", "a@x", Vec::new(), None).unwrap();

        oplog.append(&op(file, line, OpKind::Update, 2, "alpha2")).unwrap();
        let gathered = gather_new_ops(&oplog, &store, &stream()).unwrap();
        assert_eq!(gathered.len(), 1);
        assert_eq!(gathered[0].op.lamport, 2);
        assert_eq!(gathered[0].old_content.as_deref(), Some("alpha"));
    }

    #[test]
    fn update_old_content_is_the_pre_op_state_not_the_final_state() {
        let dir = tempfile::tempdir().unwrap();
        let oplog = OpLog::new(dir.path());
        let store = CommitStore::new(dir.path());
        let file = FileId::generate();
        let line = LineId::generate();

        oplog.append(&op(file, line, OpKind::Insert, 1, "v1")).unwrap();
        oplog.append(&op(file, line, OpKind::Update, 2, "v2")).unwrap();
        oplog.append(&op(file, line, OpKind::Update, 3, "v3")).unwrap();

        let gathered = gather_new_ops(&oplog, &store, &stream()).unwrap();
        let old: Vec<_> = gathered.iter().map(|e| e.old_content.as_deref()).collect();
        assert_eq!(old, vec![None, Some("v1"), Some("v2")]);
    }

    #[test]
    fn create_commit_persists_and_returns_gathered_ops() {
        let dir = tempfile::tempdir().unwrap();
        let oplog = OpLog::new(dir.path());
        let store = CommitStore::new(dir.path());
        let file = FileId::generate();

        oplog
            .append(&op(file, LineId::generate(), OpKind::Insert, 1, "x"))
            .unwrap();
        let commit =
            create_commit(&oplog, &store, &stream(), "msg", "Ada", "a@x", Vec::new(), None)
                .unwrap();
        assert_eq!(commit.operations.len(), 1);
        assert_eq!(commit.message, "msg");

        let listed = store.list(&stream()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, commit.id);
    }

    #[test]
    fn second_commit_captures_only_new_ops() {
        let dir = tempfile::tempdir().unwrap();
        let oplog = OpLog::new(dir.path());
        let store = CommitStore::new(dir.path());
        let file = FileId::generate();
        let line = LineId::generate();

        oplog.append(&op(file, line, OpKind::Insert, 1, "x")).unwrap();
        create_commit(&oplog, &store, &stream(), "one", "a", "a@x", Vec::new(), None).unwrap();
        oplog.append(&op(file, line, OpKind::Update, 2, "y")).unwrap();
        let second =
            create_commit(&oplog, &store, &stream(), "two", "a", "a@x", Vec::new(), None).unwrap();
        assert_eq!(second.operations.len(), 1);
        assert_eq!(second.operations[0].op.lamport, 2);
    }
}
