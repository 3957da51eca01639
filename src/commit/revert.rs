//! Precise commit inversion.

use time::OffsetDateTime;

use crate::core::{CommitId, LamportClock, NodeId, Op, OpKind, StreamName, WallClock};
use crate::oplog::OpLog;
use crate::signing::Signer;

use super::{sign_commit, Commit, CommitError, CommitResult, CommitStore, ExtendedOp};

/// Produce and persist the inverse of commit `commit_id` in `stream`.
///
/// Ops are inverted in reverse order: an insert becomes a delete, a delete
/// becomes an insert of the preserved content under the same line id, an
/// update becomes an update back to the preserved content. Inverse ops get
/// fresh `(lamport, node)` from the reverting node, are appended to the op
/// log first, and only then is the commit record written.
#[allow(clippy::too_many_arguments)]
pub fn revert_commit(
    oplog: &OpLog,
    store: &CommitStore,
    clock: &LamportClock,
    node: NodeId,
    stream: &StreamName,
    commit_id: &CommitId,
    author_name: &str,
    author_email: &str,
    signer: Option<&dyn Signer>,
) -> CommitResult<Commit> {
    let target = store
        .list(stream)?
        .into_iter()
        .find(|c| c.id == *commit_id)
        .ok_or(CommitError::CommitNotFound { id: *commit_id })?;

    let mut inverses = Vec::with_capacity(target.operations.len());
    for eop in target.operations.iter().rev() {
        let fresh = |kind: OpKind, content: String| Op {
            kind,
            lamport: clock.next(),
            node,
            file: eop.op.file,
            line: eop.op.line,
            content,
            stream: stream.clone(),
            timestamp: Some(WallClock::now()),
        };
        let inverse = match eop.op.kind {
            OpKind::Insert => ExtendedOp::with_old_content(
                fresh(OpKind::Delete, String::new()),
                Some(eop.op.content.clone()),
            ),
            OpKind::Delete => {
                let old = eop
                    .old_content
                    .clone()
                    .ok_or(CommitError::OldContentMissing { line: eop.op.line })?;
                ExtendedOp::new(fresh(OpKind::Insert, old))
            }
            OpKind::Update => {
                let old = eop
                    .old_content
                    .clone()
                    .ok_or(CommitError::OldContentMissing { line: eop.op.line })?;
                ExtendedOp::with_old_content(
                    fresh(OpKind::Update, old),
                    Some(eop.op.content.clone()),
                )
            }
        };
        inverses.push(inverse);
    }

    // Ops become durable before the commit record references them.
    for eop in &inverses {
        oplog.append(&eop.op)?;
    }

    let mut commit = Commit {
        id: CommitId::generate(),
        stream: stream.clone(),
        message: format!("Revert of {}: {}", target.id, target.message),
        author_name: author_name.to_string(),
        author_email: author_email.to_string(),
        timestamp: OffsetDateTime::now_utc(),
        signature: None,
        operations: inverses,
    };
    if let Some(signer) = signer {
        commit.signature = Some(sign_commit(&commit, signer)?);
    }
    store.save(&commit)?;
    Ok(commit)
}
