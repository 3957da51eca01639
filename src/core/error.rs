//! Core capability errors (validation, CRDT invariants).
//!
//! These represent domain/refusal states, not library implementation
//! details, so they are bounded and stable.

use thiserror::Error;

use super::identity::LineId;

/// Invalid identifier or stream name.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("node id `{raw}` is invalid: {reason}")]
    Node { raw: String, reason: String },
    #[error("file id `{raw}` is invalid: {reason}")]
    File { raw: String, reason: String },
    #[error("line id `{raw}` is invalid: {reason}")]
    Line { raw: String, reason: String },
    #[error("commit id `{raw}` is invalid: {reason}")]
    Commit { raw: String, reason: String },
    #[error("stream name `{raw}` is invalid: {reason}")]
    Stream { raw: String, reason: String },
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    /// An update targeted a line that is not present in the document.
    #[error("unknown line {line} for update")]
    UnknownLine { line: LineId },

    /// `combine` was invoked on a pair of ops that `can_combine` rejects.
    #[error("operations cannot be combined: {reason}")]
    IncompatibleMerge { reason: &'static str },
}
