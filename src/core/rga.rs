//! The RGA (Replicated Growable Array) document engine.
//!
//! A document is the replay of all ops of one file within one stream.
//! Inserts establish lines and their visit order; updates are resolved
//! last-writer-wins by the total order; deletes tombstone a line while its
//! insert entry is retained for order stability. Replaying a legal causal
//! history (inserts before updates/deletes of the same line) in any
//! delivery order materializes the same document.
//!
//! The engine performs no I/O. [`Document`] wraps an [`Rga`] in a
//! reader-writer lock: `apply` takes the write lock, readers share the
//! read lock and see a consistent snapshot.

use std::collections::HashMap;
use std::sync::RwLock;

use super::error::CoreError;
use super::identity::{LineId, NodeId};
use super::op::{Op, OpKind};

/// `(lamport, node)` — the total order in tuple form.
type OrderKey = (u64, NodeId);

fn order_key(op: &Op) -> OrderKey {
    (op.lamport, op.node)
}

#[derive(Clone, Debug)]
struct Entry {
    /// The governing insert. Its `(lamport, node)` is the entry's position
    /// in the visit order (the smallest insert key observed for this line);
    /// its `content` is kept current with the winning writer.
    op: Op,
    /// Largest insert key observed for this line; a tombstone older than
    /// this has been superseded by a re-insert.
    latest_insert: OrderKey,
    /// Key of the op that currently owns the content (insert or update).
    content_key: OrderKey,
}

/// In-memory RGA for a single file.
#[derive(Debug, Default)]
pub struct Rga {
    entries: Vec<Entry>,
    tombstones: HashMap<LineId, Op>,
}

impl Rga {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document by replaying `ops` in the given order.
    pub fn replay(ops: impl IntoIterator<Item = Op>) -> Result<Self, CoreError> {
        let mut rga = Self::new();
        for op in ops {
            rga.apply(op)?;
        }
        Ok(rga)
    }

    /// Apply one operation.
    ///
    /// Fails with [`CoreError::UnknownLine`] when an update targets a line
    /// no insert has established. Re-delivery of an op already applied is
    /// a no-op.
    pub fn apply(&mut self, op: Op) -> Result<(), CoreError> {
        match op.kind {
            OpKind::Insert => self.apply_insert(op),
            OpKind::Update => self.apply_update(op)?,
            OpKind::Delete => self.apply_delete(op),
        }
        Ok(())
    }

    fn apply_insert(&mut self, op: Op) {
        let key = order_key(&op);
        if let Some(entry) = self.entries.iter_mut().find(|e| e.op.line == op.line) {
            // Re-delivery or re-insert of an existing line. The position is
            // the smallest insert key; content goes to the newest writer.
            if key > entry.content_key {
                entry.op.content = op.content;
                entry.content_key = key;
            }
            if key > entry.latest_insert {
                entry.latest_insert = key;
            }
            if key < (entry.op.lamport, entry.op.node) {
                entry.op.lamport = op.lamport;
                entry.op.node = op.node;
            }
        } else {
            self.entries.push(Entry {
                latest_insert: key,
                content_key: key,
                op,
            });
        }
        self.entries
            .sort_by(|a, b| a.op.cmp_order(&b.op).then_with(|| a.op.line.cmp(&b.op.line)));
    }

    fn apply_update(&mut self, op: Op) -> Result<(), CoreError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.op.line == op.line)
            .ok_or(CoreError::UnknownLine { line: op.line })?;
        let key = order_key(&op);
        if key > entry.content_key {
            entry.op.content = op.content;
            entry.content_key = key;
        }
        Ok(())
    }

    fn apply_delete(&mut self, op: Op) {
        match self.tombstones.get(&op.line) {
            Some(existing) if order_key(existing) >= order_key(&op) => {}
            _ => {
                self.tombstones.insert(op.line, op);
            }
        }
    }

    fn is_live(&self, entry: &Entry) -> bool {
        match self.tombstones.get(&entry.op.line) {
            // A re-insert newer than the tombstone resurrects the line
            // (the revert pathway inserts under the original LineId).
            Some(del) => order_key(del) < entry.latest_insert,
            None => true,
        }
    }

    fn live_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| self.is_live(e))
    }

    /// The document text, one string per live line, in visit order.
    pub fn materialize(&self) -> Vec<String> {
        self.live_entries().map(|e| e.op.content.clone()).collect()
    }

    /// LineIds of the live lines, in visit order.
    pub fn line_ids(&self) -> Vec<LineId> {
        self.live_entries().map(|e| e.op.line).collect()
    }

    /// LineId → current content for every live line.
    pub fn line_map(&self) -> HashMap<LineId, String> {
        self.live_entries()
            .map(|e| (e.op.line, e.op.content.clone()))
            .collect()
    }

    /// Reset to the empty document.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.tombstones.clear();
    }

    /// One op per line, reproducing this document exactly on replay:
    /// an insert (at the line's position key, carrying current content)
    /// for each live line, and the winning delete for each dead one.
    ///
    /// This is the coalesced form the compactor rewrites logs with.
    pub fn coalesced_ops(&self) -> Vec<Op> {
        let mut out = Vec::new();
        for entry in &self.entries {
            if self.is_live(entry) {
                let mut op = entry.op.clone();
                op.kind = OpKind::Insert;
                op.timestamp = None;
                out.push(op);
            }
        }
        for (line, del) in &self.tombstones {
            let superseded = self
                .entries
                .iter()
                .any(|e| e.op.line == *line && self.is_live(e));
            if !superseded {
                out.push(del.clone());
            }
        }
        out.sort_by(Op::cmp_order);
        out
    }
}

/// Shared handle around one document: single writer, concurrent readers.
#[derive(Debug, Default)]
pub struct Document {
    inner: RwLock<Rga>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rga(rga: Rga) -> Self {
        Self {
            inner: RwLock::new(rga),
        }
    }

    pub fn apply(&self, op: Op) -> Result<(), CoreError> {
        self.write().apply(op)
    }

    pub fn materialize(&self) -> Vec<String> {
        self.read().materialize()
    }

    pub fn line_ids(&self) -> Vec<LineId> {
        self.read().line_ids()
    }

    pub fn line_map(&self) -> HashMap<LineId, String> {
        self.read().line_map()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Rga> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Rga> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
