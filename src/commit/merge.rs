//! Cross-stream replication: cherry-pick, full merge, partial merge.
//!
//! Replication copies op records from one stream's log into another and
//! writes a corresponding commit in the target. Ops keep their identity
//! (`lamport`, `node`, `line`); only the stream context changes. The
//! op-key dedup makes re-replication a no-op.

use std::collections::HashSet;

use crate::core::{CommitId, FileId, OpKey, OpKind, StreamName};
use crate::oplog::OpLog;

use super::{Commit, CommitError, CommitResult, CommitStore, ExtendedOp};

/// Filter applied to each candidate op during a partial merge. An empty
/// field accepts everything; an entirely empty filter is a full merge.
#[derive(Clone, Debug, Default)]
pub struct MergeFilter {
    pub file_ids: HashSet<FileId>,
    pub op_types: HashSet<OpKind>,
}

impl MergeFilter {
    pub fn is_empty(&self) -> bool {
        self.file_ids.is_empty() && self.op_types.is_empty()
    }

    pub fn accepts(&self, eop: &ExtendedOp) -> bool {
        (self.file_ids.is_empty() || self.file_ids.contains(&eop.op.file))
            && (self.op_types.is_empty() || self.op_types.contains(&eop.op.kind))
    }
}

fn target_op_keys(oplog: &OpLog, target: &StreamName) -> CommitResult<HashSet<OpKey>> {
    let mut keys = HashSet::new();
    for (_file, ops) in oplog.load_stream(target)? {
        for op in ops {
            keys.insert(op.key());
        }
    }
    Ok(keys)
}

/// Append the ops of `eops` that the target log does not hold yet.
/// Returns how many were appended.
fn replicate_ops(
    oplog: &OpLog,
    target: &StreamName,
    eops: &[ExtendedOp],
    known: &mut HashSet<OpKey>,
) -> CommitResult<usize> {
    let mut appended = 0;
    for eop in eops {
        if !known.insert(eop.op.key()) {
            continue;
        }
        let mut op = eop.op.clone();
        op.stream = target.clone();
        oplog.append(&op)?;
        appended += 1;
    }
    Ok(appended)
}

fn retarget(eops: &[ExtendedOp], target: &StreamName) -> Vec<ExtendedOp> {
    eops.iter()
        .map(|eop| {
            let mut eop = eop.clone();
            eop.op.stream = target.clone();
            eop
        })
        .collect()
}

/// Replicate a single commit, located in whichever stream holds it, into
/// `target` under a fresh id.
///
/// Idempotent: when every op of the source commit is already present in
/// the target log, no op and no commit is written and `Ok(None)` is
/// returned.
pub fn cherry_pick(
    oplog: &OpLog,
    store: &CommitStore,
    commit_id: &CommitId,
    target: &StreamName,
) -> CommitResult<Option<Commit>> {
    let source = store
        .find(commit_id)?
        .ok_or(CommitError::CommitNotFound { id: *commit_id })?;

    let mut known = target_op_keys(oplog, target)?;
    let appended = replicate_ops(oplog, target, &source.operations, &mut known)?;
    if appended == 0 && !source.operations.is_empty() {
        return Ok(None);
    }

    let commit = Commit {
        id: CommitId::generate(),
        stream: target.clone(),
        message: format!("[cherry-pick] {}", source.message),
        author_name: source.author_name.clone(),
        author_email: source.author_email.clone(),
        timestamp: source.timestamp,
        // The canonical hash covers id and stream, both of which changed.
        signature: None,
        operations: retarget(&source.operations, target),
    };
    store.save(&commit)?;
    Ok(Some(commit))
}

/// Replicate every commit of `source` that `target` does not have (by
/// commit id), in timestamp order. Returns the ids of the commits added.
pub fn merge_streams(
    oplog: &OpLog,
    store: &CommitStore,
    source: &StreamName,
    target: &StreamName,
) -> CommitResult<Vec<CommitId>> {
    let missing: Vec<Commit> = store
        .list(source)?
        .into_iter()
        .filter(|c| !store.contains(target, &c.id))
        .collect();

    let mut known = target_op_keys(oplog, target)?;
    let mut added = Vec::new();
    for commit in missing {
        replicate_ops(oplog, target, &commit.operations, &mut known)?;
        let copy = Commit {
            id: commit.id,
            stream: target.clone(),
            message: commit.message.clone(),
            author_name: commit.author_name.clone(),
            author_email: commit.author_email.clone(),
            timestamp: commit.timestamp,
            signature: None,
            operations: retarget(&commit.operations, target),
        };
        store.save(&copy)?;
        added.push(copy.id);
    }
    Ok(added)
}

/// Merge only the ops accepted by `filter`. Each source commit with at
/// least one surviving op contributes one new commit (fresh id, message
/// prefixed `[merge]`) carrying exactly the survivors. An entirely empty
/// filter behaves as a full merge.
pub fn partial_merge(
    oplog: &OpLog,
    store: &CommitStore,
    source: &StreamName,
    target: &StreamName,
    filter: &MergeFilter,
) -> CommitResult<Vec<CommitId>> {
    if filter.is_empty() {
        return merge_streams(oplog, store, source, target);
    }

    let mut known = target_op_keys(oplog, target)?;
    let mut added = Vec::new();
    for commit in store.list(source)? {
        let surviving: Vec<ExtendedOp> = commit
            .operations
            .iter()
            .filter(|eop| filter.accepts(eop))
            .cloned()
            .collect();
        if surviving.is_empty() {
            continue;
        }
        let appended = replicate_ops(oplog, target, &surviving, &mut known)?;
        if appended == 0 {
            // Everything already replicated on an earlier run.
            continue;
        }
        let new_commit = Commit {
            id: CommitId::generate(),
            stream: target.clone(),
            message: format!("[merge] {}", commit.message),
            author_name: commit.author_name.clone(),
            author_email: commit.author_email.clone(),
            timestamp: commit.timestamp,
            signature: None,
            operations: retarget(&surviving, target),
        };
        store.save(&new_commit)?;
        added.push(new_commit.id);
    }
    Ok(added)
}
