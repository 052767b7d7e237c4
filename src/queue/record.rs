//! Record framing: `[len: u32 little-endian][payload: len bytes]`, where the
//! payload is the UTF-8 JSON encoding of a [`VersionedOperation`].
//!
//! Length-prefixed framing lets recovery skip past intact records in O(1) and
//! tolerate a truncated trailing frame without misparsing the rest of the
//! segment (`SPEC_FULL.md` §4.1 "Framing").

use std::io::{self, Read, Write};

use crate::operation::VersionedOperation;

/// Result of attempting to read one frame from a segment.
pub(crate) enum ReadOutcome {
    /// A complete, valid record.
    Record(VersionedOperation, usize),
    /// End of file: no more bytes at all.
    Eof,
    /// A length header or payload was present but incomplete — the classic
    /// "crashed mid-write" tail. Recovery truncates the segment here.
    Truncated,
    /// The length header and payload were both fully present on disk, but the
    /// payload did not deserialize. Unlike `Truncated`, this is not a crash
    /// tail — the frame's byte span (carried here) is known and intact, it's
    /// just semantically unreadable, so the caller can skip past it rather
    /// than stop reading. Backs the `SerializationError` "offending op is
    /// acked (dropped)" handling in `SPEC_FULL.md` §7.
    Corrupt(usize),
}

/// Encodes `op` into its on-disk frame: 4-byte LE length, then JSON payload.
///
/// Returns the total number of bytes the frame occupies on disk.
pub(crate) fn encode(op: &VersionedOperation) -> Result<Vec<u8>, crate::error::QueueError> {
    let payload = serde_json::to_vec(op).map_err(|e| crate::error::QueueError::Serialization {
        version: Some(op.version),
        reason: e.to_string(),
    })?;
    let len: u32 = payload
        .len()
        .try_into()
        .map_err(|_| crate::error::QueueError::RecordTooLarge {
            size: payload.len(),
            limit: u32::MAX as usize,
        })?;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Reads exactly one frame from `reader`.
///
/// Never returns an `io::Error` for ordinary EOF conditions; those become
/// [`ReadOutcome::Eof`] or [`ReadOutcome::Truncated`] so that callers can
/// distinguish "nothing left to read" from "crash left a partial frame" without
/// matching on `ErrorKind`.
pub(crate) fn read_one<R: Read>(reader: &mut R) -> io::Result<ReadOutcome> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_short(reader, &mut len_buf)? {
        FillResult::Empty => return Ok(ReadOutcome::Eof),
        FillResult::Partial => return Ok(ReadOutcome::Truncated),
        FillResult::Full => {}
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    match read_exact_or_short(reader, &mut payload)? {
        FillResult::Full => {}
        FillResult::Empty | FillResult::Partial => return Ok(ReadOutcome::Truncated),
    }

    match serde_json::from_slice::<VersionedOperation>(&payload) {
        Ok(op) => Ok(ReadOutcome::Record(op, 4 + len)),
        // Both length-prefix and payload were fully read, so this frame's
        // byte span is known and durable — it just isn't valid JSON. Distinct
        // from `Truncated`: the reader can skip past it and keep going.
        Err(_) => Ok(ReadOutcome::Corrupt(4 + len)),
    }
}

enum FillResult {
    Full,
    Partial,
    Empty,
}

/// Like `Read::read_exact`, but reports a short read (including zero bytes
/// read) instead of turning it into an `UnexpectedEof` error.
fn read_exact_or_short<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<FillResult> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(if filled == 0 {
        FillResult::Empty
    } else if filled == buf.len() {
        FillResult::Full
    } else {
        FillResult::Partial
    })
}

pub(crate) fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> io::Result<()> {
    writer.write_all(frame)
}
