//! The operation model.
//!
//! An [`Op`] is the unit of change: one insert, update, or delete of a
//! single line of a single file within a stream. Ops are totally ordered
//! by `(lamport, node)` with the node id compared as raw bytes; the wall
//! timestamp is informational only and never participates in ordering.

use std::cmp::Ordering;

use super::clock::WallClock;
use super::error::CoreError;
use super::identity::{FileId, LineId, NodeId, StreamName};

/// The three fixed kinds of operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

impl OpKind {
    /// Wire tag used by the binary op framing.
    pub const fn as_u8(self) -> u8 {
        match self {
            OpKind::Insert => 0,
            OpKind::Update => 1,
            OpKind::Delete => 2,
        }
    }

    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(OpKind::Insert),
            1 => Some(OpKind::Update),
            2 => Some(OpKind::Delete),
            _ => None,
        }
    }

    /// Tag used in commit record JSON.
    pub const fn as_str(self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(OpKind::Insert),
            "update" => Some(OpKind::Update),
            "delete" => Some(OpKind::Delete),
            _ => None,
        }
    }
}

/// Identity of an op for dedup purposes: `(lamport, node, line)`.
///
/// Two deliveries of the same op always carry the same key; the commit
/// layer and cross-stream replication use it to make re-delivery a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpKey {
    pub lamport: u64,
    pub node: NodeId,
    pub line: LineId,
}

/// A single CRDT operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Op {
    pub kind: OpKind,
    pub lamport: u64,
    pub node: NodeId,
    pub file: FileId,
    pub line: LineId,
    /// Line content. Empty for deletes; the content a delete removed is
    /// captured at commit time, not on the wire.
    pub content: String,
    pub stream: StreamName,
    /// Wall time the op was created, when known. Not persisted by the
    /// binary framing; reloaded ops carry `None`.
    pub timestamp: Option<WallClock>,
}

impl Op {
    pub fn key(&self) -> OpKey {
        OpKey {
            lamport: self.lamport,
            node: self.node,
            line: self.line,
        }
    }

    /// Ordering key: `(lamport, node)` with node bytes compared
    /// lexicographically.
    pub fn order_key(&self) -> (u64, &[u8; 16]) {
        (self.lamport, self.node.as_bytes())
    }

    /// The total order used for RGA visit order and all tie-breaking.
    pub fn cmp_order(&self, other: &Op) -> Ordering {
        self.lamport
            .cmp(&other.lamport)
            .then_with(|| self.node.as_bytes().cmp(other.node.as_bytes()))
    }

    pub fn less_than(&self, other: &Op) -> bool {
        self.cmp_order(other) == Ordering::Less
    }

    /// True iff `other` can be folded into `self`: same stream, file,
    /// line, and node, both non-delete, and `self` strictly older.
    pub fn can_combine(&self, other: &Op) -> bool {
        self.stream == other.stream
            && self.file == other.file
            && self.line == other.line
            && self.node == other.node
            && self.kind != OpKind::Delete
            && other.kind != OpKind::Delete
            && self.lamport < other.lamport
    }

    /// Fold the newer op's effect into `self`, keeping the newer content,
    /// lamport, and timestamp.
    pub fn combine(&mut self, other: &Op) -> Result<(), CoreError> {
        if !self.can_combine(other) {
            return Err(CoreError::IncompatibleMerge {
                reason: "ops differ in stream, file, line, or node, involve a delete, \
                         or are not ordered oldest-to-newest",
            });
        }
        self.content = other.content.clone();
        self.lamport = other.lamport;
        self.timestamp = other.timestamp;
        Ok(())
    }
}
