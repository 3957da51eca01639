//! Binary op record framing.
//!
//! Each record is a fixed header followed by the content bytes:
//!
//! | offset | size | field                              |
//! |-------:|-----:|------------------------------------|
//! |      0 |    1 | op type (0=insert 1=update 2=delete) |
//! |      1 |    8 | lamport, big-endian u64            |
//! |      9 |   16 | node id                            |
//! |     25 |   16 | file id                            |
//! |     41 |   16 | line id                            |
//! |     57 |    4 | content length N, big-endian u32   |
//! |     61 |    N | UTF-8 content                      |
//!
//! Stream and timestamp are not persisted: the containing directory
//! supplies the stream, and reloaded ops carry an unknown timestamp.
//!
//! A torn tail (short read of header or content) ends the read loop
//! silently; that is the sole recovery path for interrupted appends.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::core::{FileId, LineId, NodeId, Op, OpKind, StreamName};

use super::{OpLogError, OpLogResult};

pub const HEADER_LEN: usize = 1 + 8 + 16 + 16 + 16 + 4;

/// Upper bound on a single line's content. Lines are logical text lines;
/// anything near this size is garbage or an attack, and a bogus length
/// prefix must not drive allocation.
pub const MAX_CONTENT_LEN: usize = 16 * 1024 * 1024;

/// Encode one op as a fully framed record.
pub fn encode_op(op: &Op) -> OpLogResult<Vec<u8>> {
    let content = op.content.as_bytes();
    if content.len() > MAX_CONTENT_LEN {
        return Err(OpLogError::ContentTooLarge {
            got: content.len(),
            max: MAX_CONTENT_LEN,
        });
    }
    let mut buf = Vec::with_capacity(HEADER_LEN + content.len());
    buf.push(op.kind.as_u8());
    buf.extend_from_slice(&op.lamport.to_be_bytes());
    buf.extend_from_slice(op.node.as_bytes());
    buf.extend_from_slice(op.file.as_bytes());
    buf.extend_from_slice(op.line.as_bytes());
    buf.extend_from_slice(&(content.len() as u32).to_be_bytes());
    buf.extend_from_slice(content);
    Ok(buf)
}

/// Decode one fully framed record. Used by tests and the strict loader;
/// the streaming path is [`OpReader`].
pub fn decode_op(record: &[u8], stream: &StreamName) -> Option<Op> {
    if record.len() < HEADER_LEN {
        return None;
    }
    let (header, content) = record.split_at(HEADER_LEN);
    let declared = u32::from_be_bytes(header[57..61].try_into().ok()?) as usize;
    if declared != content.len() {
        return None;
    }
    op_from_parts(header, content, stream).ok()
}

fn op_from_parts(
    header: &[u8],
    content: &[u8],
    stream: &StreamName,
) -> Result<Op, String> {
    let kind = OpKind::from_u8(header[0])
        .ok_or_else(|| format!("unknown op type {}", header[0]))?;
    let lamport = u64::from_be_bytes(header[1..9].try_into().expect("8 bytes"));
    let node = NodeId::from_bytes(header[9..25].try_into().expect("16 bytes"));
    let file = FileId::from_bytes(header[25..41].try_into().expect("16 bytes"));
    let line = LineId::from_bytes(header[41..57].try_into().expect("16 bytes"));
    let content = std::str::from_utf8(content)
        .map_err(|e| format!("content is not UTF-8: {e}"))?
        .to_string();
    Ok(Op {
        kind,
        lamport,
        node,
        file,
        line,
        content,
        stream: stream.clone(),
        timestamp: None,
    })
}

/// Streaming reader over a concatenation of framed records.
pub struct OpReader<R> {
    reader: R,
    stream: StreamName,
    path: PathBuf,
    offset: u64,
    strict: bool,
}

impl<R: Read> OpReader<R> {
    pub fn new(reader: R, stream: StreamName, path: &Path, strict: bool) -> Self {
        Self {
            reader,
            stream,
            path: path.to_path_buf(),
            offset: 0,
            strict,
        }
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` at EOF and on a torn tail. A full-size but
    /// ill-formed record returns `Err(CorruptOp)` in strict mode and
    /// `Ok(None)` otherwise (the reader cannot resync past it).
    pub fn read_next(&mut self) -> OpLogResult<Option<Op>> {
        let record_offset = self.offset;
        let mut header = [0u8; HEADER_LEN];
        if !self.fill(&mut header)? {
            return Ok(None);
        }

        let declared = u32::from_be_bytes(header[57..61].try_into().expect("4 bytes")) as usize;
        if declared > MAX_CONTENT_LEN {
            return self.ill_formed(record_offset, format!("content length {declared} out of range"));
        }
        let mut content = vec![0u8; declared];
        if !self.fill(&mut content)? {
            return Ok(None);
        }

        match op_from_parts(&header, &content, &self.stream) {
            Ok(op) => Ok(Some(op)),
            Err(reason) => self.ill_formed(record_offset, reason),
        }
    }

    fn ill_formed(&self, offset: u64, reason: String) -> OpLogResult<Option<Op>> {
        if self.strict {
            Err(OpLogError::CorruptOp {
                path: self.path.clone(),
                offset,
                reason,
            })
        } else {
            tracing::debug!(
                path = %self.path.display(),
                offset,
                %reason,
                "stopping op log read at ill-formed record"
            );
            Ok(None)
        }
    }

    /// Fill `buf` completely. `Ok(false)` means EOF arrived first (clean
    /// EOF at offset 0 of the buffer, or a torn tail partway through).
    fn fill(&mut self, buf: &mut [u8]) -> OpLogResult<bool> {
        let mut read = 0;
        while read < buf.len() {
            let n = self
                .reader
                .read(&mut buf[read..])
                .map_err(|source| OpLogError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            if n == 0 {
                return Ok(false);
            }
            read += n;
            self.offset += n as u64;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream() -> StreamName {
        StreamName::parse("main").unwrap()
    }

    fn sample_op(kind: OpKind, lamport: u64, content: &str) -> Op {
        Op {
            kind,
            lamport,
            node: NodeId::from_bytes([1; 16]),
            file: FileId::from_bytes([2; 16]),
            line: LineId::from_bytes([3; 16]),
            content: content.to_string(),
            stream: stream(),
            timestamp: None,
        }
    }

    fn read_all(bytes: Vec<u8>, strict: bool) -> OpLogResult<Vec<Op>> {
        let mut reader = OpReader::new(
            Cursor::new(bytes),
            stream(),
            Path::new("test.bin"),
            strict,
        );
        let mut out = Vec::new();
        while let Some(op) = reader.read_next()? {
            out.push(op);
        }
        Ok(out)
    }

    #[test]
    fn round_trip_single_record() {
        let op = sample_op(OpKind::Insert, 42, "hello world");
        let frame = encode_op(&op).unwrap();
        assert_eq!(frame.len(), HEADER_LEN + 11);
        let ops = read_all(frame, true).unwrap();
        assert_eq!(ops, vec![op]);
    }

    #[test]
    fn round_trip_empty_content_delete() {
        let op = sample_op(OpKind::Delete, 7, "");
        let frame = encode_op(&op).unwrap();
        assert_eq!(frame.len(), HEADER_LEN);
        let ops = read_all(frame, true).unwrap();
        assert_eq!(ops, vec![op]);
    }

    #[test]
    fn round_trip_multiple_records() {
        let a = sample_op(OpKind::Insert, 1, "a");
        let b = sample_op(OpKind::Update, 2, "b-longer-content");
        let c = sample_op(OpKind::Delete, 3, "");
        let mut bytes = Vec::new();
        for op in [&a, &b, &c] {
            bytes.extend(encode_op(op).unwrap());
        }
        assert_eq!(read_all(bytes, true).unwrap(), vec![a, b, c]);
    }

    #[test]
    fn torn_header_is_dropped_silently() {
        let a = sample_op(OpKind::Insert, 1, "survivor");
        let mut bytes = encode_op(&a).unwrap();
        bytes.extend_from_slice(&[0u8; 30]); // incomplete header
        assert_eq!(read_all(bytes, false).unwrap(), vec![a]);
    }

    #[test]
    fn torn_content_is_dropped_silently() {
        let a = sample_op(OpKind::Insert, 1, "survivor");
        let b = sample_op(OpKind::Update, 2, "this content will be cut");
        let mut bytes = encode_op(&a).unwrap();
        let second = encode_op(&b).unwrap();
        bytes.extend_from_slice(&second[..second.len() - 5]);
        assert_eq!(read_all(bytes, false).unwrap(), vec![a]);
    }

    #[test]
    fn torn_tail_is_dropped_even_in_strict_mode() {
        let a = sample_op(OpKind::Insert, 1, "survivor");
        let mut bytes = encode_op(&a).unwrap();
        bytes.extend_from_slice(&[9u8; 12]);
        assert_eq!(read_all(bytes, true).unwrap(), vec![a]);
    }

    #[test]
    fn unknown_op_type_stops_lenient_read() {
        let a = sample_op(OpKind::Insert, 1, "ok");
        let b = sample_op(OpKind::Insert, 2, "bad");
        let mut bytes = encode_op(&a).unwrap();
        let mut second = encode_op(&b).unwrap();
        second[0] = 9;
        bytes.extend(second);
        assert_eq!(read_all(bytes, false).unwrap(), vec![a]);
    }

    #[test]
    fn unknown_op_type_is_corrupt_in_strict_mode() {
        let mut bytes = encode_op(&sample_op(OpKind::Insert, 1, "x")).unwrap();
        bytes[0] = 9;
        let err = read_all(bytes, true).unwrap_err();
        assert!(matches!(err, OpLogError::CorruptOp { .. }));
    }

    #[test]
    fn invalid_utf8_content_is_corrupt_in_strict_mode() {
        let mut bytes = encode_op(&sample_op(OpKind::Insert, 1, "ab")).unwrap();
        let len = bytes.len();
        bytes[len - 2] = 0xff;
        bytes[len - 1] = 0xfe;
        let err = read_all(bytes, true).unwrap_err();
        assert!(matches!(err, OpLogError::CorruptOp { .. }));
    }

    #[test]
    fn oversize_length_prefix_does_not_allocate() {
        let mut bytes = encode_op(&sample_op(OpKind::Insert, 1, "x")).unwrap();
        bytes[57..61].copy_from_slice(&u32::MAX.to_be_bytes());
        // lenient: stops; strict: corrupt
        assert!(read_all(bytes.clone(), false).unwrap().is_empty());
        assert!(matches!(
            read_all(bytes, true).unwrap_err(),
            OpLogError::CorruptOp { .. }
        ));
    }

    #[test]
    fn decode_op_matches_reader() {
        let op = sample_op(OpKind::Update, 11, "content");
        let frame = encode_op(&op).unwrap();
        assert_eq!(decode_op(&frame, &stream()), Some(op));
        assert_eq!(decode_op(&frame[..10], &stream()), None);
    }
}
