//! The durable op log: fixed binary framing plus the per-stream,
//! per-file append-only store.

pub mod frame;
pub mod store;

use std::path::PathBuf;

use thiserror::Error;

pub use frame::{decode_op, encode_op, OpReader, HEADER_LEN};
pub use store::OpLog;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpLogError {
    /// A full-size record decoded to garbage (unknown op type, content not
    /// UTF-8). Only surfaced when strict loading is requested; the default
    /// loader stops at the first ill-formed record.
    #[error("corrupt op record at offset {offset} in {path}: {reason}")]
    CorruptOp {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    #[error("op content of {got} bytes exceeds the {max}-byte record limit")]
    ContentTooLarge { got: usize, max: usize },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type OpLogResult<T> = std::result::Result<T, OpLogError>;
