//! `DiskQueue`: a crash-consistent, append-only, segmented queue of
//! [`Operation`](crate::operation::Operation)s.
//!
//! This is the durability core the three processor variants are built on top
//! of. It plays the same role the teacher's `disk_v2` buffer variant plays in
//! `vector-buffers`, generalized from an async reader/writer pair coordinating
//! through a memory-mapped `Ledger` into a single struct guarded by ordinary
//! `Mutex`es, per the explicit thread-based concurrency model this spec calls
//! for (`SPEC_FULL.md` §5).
//!
//! On-disk layout, directly under a processor's `DataPath` (a sibling of
//! `upload_path/`, not nested inside it):
//!
//! ```text
//! operations-0.log
//! operations-1.log
//! last_put_version
//! last_ack_version
//! ```

mod ledger;
mod record;
mod segment;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::QueueError;
use crate::operation::{Batch, Operation, VersionedOperation};

use ledger::Ledger;
use record::ReadOutcome;
use segment::{list_segments, segment_path};

pub use segment::DEFAULT_MAX_SEGMENT_BYTES;

struct WriteState {
    segment_index: u64,
    file: File,
    size: u64,
}

struct ReadState {
    segment_index: u64,
    file: Option<File>,
}

/// One durable segment's bookkeeping: its index, the highest operation
/// version it contains (used to decide when a segment is fully acknowledged
/// and safe to delete), and its current byte length (used to keep
/// `size_bytes` accurate without re-`stat`ing on delete).
#[derive(Debug, Clone, Copy)]
struct SegmentMeta {
    index: u64,
    max_version: u64,
    bytes: u64,
}

pub struct DiskQueue {
    dir: PathBuf,
    ledger: Ledger,
    max_segment_bytes: u64,
    write: parking_lot::Mutex<WriteState>,
    read: parking_lot::Mutex<ReadState>,
    segments: parking_lot::Mutex<Vec<SegmentMeta>>,
    /// Running total of bytes occupied by all segment files, maintained
    /// incrementally by `put` and `cleanup_acked_segments` so `size()` can be
    /// read lock-free (`SPEC_FULL.md` §5: "`size()` may be read without
    /// locking (best-effort, via an `AtomicU64`)").
    size_bytes: AtomicU64,
}

impl DiskQueue {
    /// Opens (creating if necessary) the queue rooted at `dir`, running crash
    /// recovery: truncating a torn trailing frame in the newest segment,
    /// rewinding `last_put_version` to the last intact record, and
    /// positioning the read cursor just past `last_ack_version`.
    pub fn open(dir: &Path, max_segment_bytes: u64) -> Result<Self, QueueError> {
        fs::create_dir_all(dir).map_err(|e| QueueError::io(dir, e))?;

        let ledger = Ledger::load_or_create(dir).map_err(|e| QueueError::io(dir, e))?;
        let mut indices = list_segments(dir).map_err(|e| QueueError::io(dir, e))?;
        if indices.is_empty() {
            let path = segment_path(dir, 0);
            File::create(&path).map_err(|e| QueueError::io(&path, e))?;
            indices.push(0);
        }

        let mut segments = Vec::with_capacity(indices.len());
        let mut max_version_seen = 0u64;
        let mut total_bytes = 0u64;
        let last_index = *indices.last().expect("just ensured non-empty");

        for &index in &indices {
            let path = segment_path(dir, index);
            let is_last = index == last_index;
            let original_len = fs::metadata(&path).map_err(|e| QueueError::io(&path, e))?.len();
            let (valid_len, max_version) =
                scan_segment(&path, is_last).map_err(|e| QueueError::io(&path, e))?;
            if is_last {
                if valid_len < original_len {
                    warn!(
                        segment = index,
                        original_len,
                        valid_len,
                        "truncating torn trailing frame found during recovery"
                    );
                    truncate_to(&path, valid_len).map_err(|e| QueueError::io(&path, e))?;
                } else {
                    debug!(segment = index, valid_len, "recovered segment with no truncation needed");
                }
            } else {
                debug!(segment = index, valid_len, max_version, "recovered closed segment");
            }
            if max_version > max_version_seen {
                max_version_seen = max_version;
            }
            total_bytes += valid_len;
            segments.push(SegmentMeta { index, max_version, bytes: valid_len });
        }
        ledger.set_last_put_version(max_version_seen);

        let write_size = fs::metadata(segment_path(dir, last_index))
            .map_err(|e| QueueError::io(dir, e))?
            .len();
        let write_file = OpenOptions::new()
            .append(true)
            .open(segment_path(dir, last_index))
            .map_err(|e| QueueError::io(dir, e))?;

        let last_ack_version = ledger.last_ack_version();
        let start_index = segments
            .iter()
            .find(|s| s.max_version > last_ack_version)
            .map(|s| s.index)
            .unwrap_or(last_index);

        debug!(
            segments = segments.len(),
            last_put_version = max_version_seen,
            last_ack_version,
            "disk queue opened"
        );

        let queue = Self {
            dir: dir.to_path_buf(),
            ledger,
            max_segment_bytes,
            write: parking_lot::Mutex::new(WriteState {
                segment_index: last_index,
                file: write_file,
                size: write_size,
            }),
            read: parking_lot::Mutex::new(ReadState {
                segment_index: start_index,
                file: None,
            }),
            segments: parking_lot::Mutex::new(segments),
            size_bytes: AtomicU64::new(total_bytes),
        };

        queue.skip_to_read_cursor(start_index, last_ack_version)?;
        queue.cleanup_acked_segments();
        Ok(queue)
    }

    /// Discards already-acknowledged records at the head of the starting
    /// segment so the first real `get_batch` call begins exactly at
    /// `last_ack_version + 1`.
    fn skip_to_read_cursor(&self, start_index: u64, last_ack_version: u64) -> Result<(), QueueError> {
        let path = segment_path(&self.dir, start_index);
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(QueueError::io(&path, e)),
        };

        loop {
            let pos = file.stream_position().map_err(|e| QueueError::io(&path, e))?;
            match record::read_one(&mut file).map_err(|e| QueueError::io(&path, e))? {
                ReadOutcome::Record(vop, _) if vop.version <= last_ack_version => continue,
                ReadOutcome::Record(_, _) => {
                    file.seek(SeekFrom::Start(pos))
                        .map_err(|e| QueueError::io(&path, e))?;
                    break;
                }
                // Can't tell whether this record (whose version we couldn't
                // parse) is already acked or not; leave the cursor here and
                // let `get_batch` apply its ack-and-drop handling.
                ReadOutcome::Corrupt(_) => {
                    file.seek(SeekFrom::Start(pos))
                        .map_err(|e| QueueError::io(&path, e))?;
                    break;
                }
                ReadOutcome::Eof | ReadOutcome::Truncated => break,
            }
        }

        let resting_pos = file.stream_position().map_err(|e| QueueError::io(&path, e))?;
        trace!(segment = start_index, resting_pos, "read cursor positioned on open");
        self.read.lock().file = Some(file);
        Ok(())
    }

    /// Appends `op`, assigning it the next version. Durable only after the
    /// next [`Self::flush`].
    pub fn put(&self, op: Operation) -> Result<u64, QueueError> {
        let version = self.ledger.last_put_version() + 1;
        let vop = VersionedOperation::new(version, op);
        let frame = record::encode(&vop)?;

        let mut write = self.write.lock();
        if write.size > 0 && write.size + frame.len() as u64 > self.max_segment_bytes {
            self.rotate(&mut write)?;
        }

        let frame_len = frame.len() as u64;
        record::write_frame(&mut write.file, &frame).map_err(|e| self.write_io_err(&write, e))?;
        write.size += frame_len;

        {
            let mut segments = self.segments.lock();
            match segments.last_mut() {
                Some(meta) if meta.index == write.segment_index => {
                    meta.max_version = version;
                    meta.bytes += frame_len;
                }
                _ => segments.push(SegmentMeta {
                    index: write.segment_index,
                    max_version: version,
                    bytes: frame_len,
                }),
            }
        }
        self.size_bytes.fetch_add(frame_len, Ordering::Relaxed);

        trace!(version, segment = write.segment_index, bytes = frame_len, "put record");
        self.ledger.record_put(version);
        Ok(version)
    }

    fn rotate(&self, write: &mut WriteState) -> Result<(), QueueError> {
        write
            .file
            .sync_all()
            .map_err(|e| self.write_io_err(write, e))?;

        let next_index = write.segment_index + 1;
        let path = segment_path(&self.dir, next_index);
        let file = File::create(&path).map_err(|e| QueueError::io(&path, e))?;

        debug!(
            from_segment = write.segment_index,
            to_segment = next_index,
            closed_size = write.size,
            "rotating to a new segment"
        );

        write.segment_index = next_index;
        write.file = file;
        write.size = 0;
        Ok(())
    }

    fn write_io_err(&self, write: &WriteState, source: io::Error) -> QueueError {
        QueueError::io(&segment_path(&self.dir, write.segment_index), source)
    }

    /// Fsyncs the current segment and persists `last_put_version`. Also wakes
    /// any consumer waiting in `Idle` so it drains without waiting out the
    /// full flush period.
    pub fn flush(&self) -> Result<(), QueueError> {
        {
            let write = self.write.lock();
            write.file.sync_all().map_err(|e| self.write_io_err(&write, e))?;
        }
        self.ledger
            .persist_last_put_version()
            .map_err(|e| QueueError::io(&self.dir, e))?;
        self.ledger.request_wakeup();
        trace!(last_put_version = self.ledger.last_put_version(), "flushed");
        Ok(())
    }

    /// Returns the single next unread operation, or `None` if nothing
    /// unacknowledged remains. Equivalent to `get_batch(1, usize::MAX)`,
    /// unwrapped to the one operation it can contain (`SPEC_FULL.md` §4.1).
    pub fn get(&self) -> Result<Option<(Operation, u64)>, QueueError> {
        let batch = self.get_batch(1, usize::MAX)?;
        Ok(batch
            .into_vec()
            .into_iter()
            .next()
            .map(|vop| (vop.op, vop.version)))
    }

    /// Drains up to `max_count` operations, and at most `max_bytes` of
    /// serialized size, from the head of the queue. Always returns at least
    /// one operation if any are available, even if that single record exceeds
    /// `max_bytes` on its own.
    pub fn get_batch(&self, max_count: usize, max_bytes: usize) -> Result<Batch, QueueError> {
        let write_segment_index = self.write.lock().segment_index;
        let mut read = self.read.lock();
        let mut ops = Vec::new();
        let mut bytes = 0usize;

        while ops.len() < max_count {
            if read.file.is_none() {
                let path = segment_path(&self.dir, read.segment_index);
                read.file = Some(match File::open(&path) {
                    Ok(f) => f,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                    Err(e) => return Err(QueueError::io(&path, e)),
                });
            }
            let path = segment_path(&self.dir, read.segment_index);
            let file = read.file.as_mut().expect("just ensured Some");
            let start_pos = file.stream_position().map_err(|e| QueueError::io(&path, e))?;

            match record::read_one(file).map_err(|e| QueueError::io(&path, e))? {
                ReadOutcome::Eof => {
                    if read.segment_index < write_segment_index {
                        debug!(from_segment = read.segment_index, "read cursor crossing into next segment");
                        read.segment_index += 1;
                        read.file = None;
                        continue;
                    }
                    break;
                }
                ReadOutcome::Truncated => {
                    warn!(
                        segment = read.segment_index,
                        "encountered a truncated frame outside of startup recovery; stopping read"
                    );
                    break;
                }
                ReadOutcome::Corrupt(frame_len) => {
                    // Length-complete but undeserializable: the record's own
                    // version is unreadable, but the queue's version series is
                    // contiguous, so the dropped record must be the next one
                    // after whatever we've already read (or already acked, if
                    // this is the first record of the batch). Ack it so the
                    // consumer doesn't wedge here forever, per the
                    // `SerializationError` handling in `SPEC_FULL.md` §7.
                    let dropped_version = ops
                        .last()
                        .map(|vop: &VersionedOperation| vop.version + 1)
                        .unwrap_or_else(|| self.ledger.last_ack_version() + 1);
                    warn!(
                        version = dropped_version,
                        segment = read.segment_index,
                        frame_len,
                        "dropping unparseable record; acking it as consumed"
                    );
                    self.ack(dropped_version)?;
                }
                ReadOutcome::Record(vop, frame_len) => {
                    if !ops.is_empty() && bytes + frame_len > max_bytes {
                        file.seek(SeekFrom::Start(start_pos))
                            .map_err(|e| QueueError::io(&path, e))?;
                        break;
                    }
                    trace!(version = vop.version, segment = read.segment_index, "read record");
                    bytes += frame_len;
                    ops.push(vop);
                }
            }
        }

        Ok(Batch { operations: ops })
    }

    /// Durably acknowledges every operation up to and including `version`.
    /// Max-preserving and idempotent. Triggers cleanup of any segment that is
    /// now fully acknowledged.
    pub fn ack(&self, version: u64) -> Result<(), QueueError> {
        let advanced = self
            .ledger
            .ack(version)
            .map_err(|e| QueueError::io(&self.dir, e))?;
        if advanced {
            debug!(version, "acked");
            self.cleanup_acked_segments();
        }
        Ok(())
    }

    fn cleanup_acked_segments(&self) {
        let ack_version = self.ledger.last_ack_version();
        let current_write_index = self.write.lock().segment_index;
        let mut segments = self.segments.lock();
        segments.retain(|meta| {
            let keep = meta.index == current_write_index || meta.max_version > ack_version;
            if !keep {
                let path = segment_path(&self.dir, meta.index);
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to remove fully-acknowledged segment");
                } else {
                    debug!(segment = meta.index, bytes = meta.bytes, "removed fully-acknowledged segment");
                }
                self.size_bytes.fetch_sub(meta.bytes, Ordering::Relaxed);
            }
            keep
        });
    }

    /// Best-effort total bytes currently occupied by segment files, used for
    /// the `MAX_QUEUE_BYTES` backpressure warning. Read lock-free off an
    /// `AtomicU64` maintained by `put` and `cleanup_acked_segments`
    /// (`SPEC_FULL.md` §5), since `process()` calls this on every operation.
    pub fn size(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    /// Flushes, then blocks the calling thread until every operation with
    /// `version <= last_put_version` as of this call has been acked, or until
    /// `timeout` elapses. Returns whether the target was actually reached.
    /// This is what backs the `Async` processor's `flush(timeout)` semantics
    /// (`SPEC_FULL.md` §4.6 "Wakeup"); for queues with no consumer (`Offline`)
    /// nothing will ever ack and this degrades to waiting out the timeout.
    pub fn flush_and_wait_for_ack(&self, timeout: std::time::Duration) -> Result<bool, QueueError> {
        self.flush()?;
        let target = self.ledger.last_put_version();
        Ok(self.ledger.wait_for_ack_at_least(target, timeout))
    }

    pub fn last_put_version(&self) -> u64 {
        self.ledger.last_put_version()
    }

    pub fn last_ack_version(&self) -> u64 {
        self.ledger.last_ack_version()
    }

    /// Number of operations written but not yet acknowledged. Used by the
    /// `Async` processor to decide when the backlog has crossed a batch-size
    /// threshold and the consumer should be woken early rather than waiting
    /// out `flush_period` (`SPEC_FULL.md` §4.6 "Idle").
    pub fn pending_count(&self) -> u64 {
        self.ledger
            .last_put_version()
            .saturating_sub(self.ledger.last_ack_version())
    }

    /// Wakes a consumer blocked in `Idle` immediately, without persisting
    /// anything. `flush()` uses this after fsyncing; callers that only want
    /// the wakeup (e.g. `process()` crossing a batch-size threshold) can call
    /// it directly.
    pub fn request_wakeup(&self) {
        self.ledger.request_wakeup();
    }

    /// Blocks the calling (consumer) thread until a `put`, an explicit
    /// `flush`/backpressure wakeup, a stop request, or `timeout` — whichever
    /// comes first. Used by the `Async` processor's `ConsumerLoop` `Idle`
    /// state.
    pub fn wait_for_activity(&self, timeout: std::time::Duration) {
        self.ledger.wait_idle(self.ledger.last_put_version(), timeout);
    }

    pub fn request_stop(&self) {
        debug!("stop requested");
        self.ledger.mark_stopping();
    }

    pub fn is_stopping(&self) -> bool {
        self.ledger.is_stopping()
    }

    /// Flushes and drops open file handles. Does not delete anything on disk.
    pub fn close(&self) -> Result<(), QueueError> {
        self.flush()
    }

    /// Recursively removes the queue's entire directory. Neither `Offline`
    /// nor `Async` call this from their own `stop()`: both are built around
    /// preserving unacknowledged operations across a restart. It exists for
    /// callers that explicitly want to discard a queue outright.
    pub fn cleanup(&self) -> Result<(), QueueError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QueueError::io(&self.dir, e)),
        }
    }
}

/// Scans every frame in a segment file, returning `(valid_byte_length,
/// highest_version_seen)`. For the newest segment (`is_last`), a truncated
/// trailing frame is expected after a crash and simply ends the scan; for any
/// other (previously-rotated, closed) segment a truncated frame is treated
/// the same way defensively, since a fully-closed segment should never be
/// torn in practice.
fn scan_segment(path: &Path, _is_last: bool) -> io::Result<(u64, u64)> {
    let mut file = File::open(path)?;
    let mut valid_len = 0u64;
    let mut max_version = 0u64;

    loop {
        let pos = file.stream_position()?;
        match record::read_one(&mut file)? {
            ReadOutcome::Record(vop, frame_len) => {
                valid_len = pos + frame_len as u64;
                if vop.version > max_version {
                    max_version = vop.version;
                }
            }
            // A corrupt-but-length-complete frame isn't a crash tail: its
            // bytes are intact, so recovery keeps them (no truncation) and
            // just can't learn a version from it. `get_batch` drops it later.
            ReadOutcome::Corrupt(frame_len) => {
                valid_len = pos + frame_len as u64;
                warn!(
                    segment = %path.display(),
                    offset = pos,
                    "found an unparseable record during recovery scan; it will be skipped and acked when read"
                );
            }
            ReadOutcome::Eof | ReadOutcome::Truncated => break,
        }
    }

    Ok((valid_len, max_version))
}

fn truncate_to(path: &Path, len: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use tempfile::tempdir;

    fn op(path: &str) -> Operation {
        Operation::AssignFloat {
            path: vec![path.to_string()],
            value: 1.0,
        }
    }

    #[test]
    fn put_then_get_then_ack_round_trips() {
        let dir = tempdir().unwrap();
        let queue = DiskQueue::open(dir.path(), DEFAULT_MAX_SEGMENT_BYTES).unwrap();

        let v1 = queue.put(op("a")).unwrap();
        let v2 = queue.put(op("b")).unwrap();
        assert_eq!((v1, v2), (1, 2));

        let batch = queue.get_batch(10, usize::MAX).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.operations()[0].version, 1);
        assert_eq!(batch.operations()[1].version, 2);

        queue.ack(batch.highest_version().unwrap()).unwrap();
        assert_eq!(queue.last_ack_version(), 2);
    }

    #[test]
    fn get_batch_respects_max_count() {
        let dir = tempdir().unwrap();
        let queue = DiskQueue::open(dir.path(), DEFAULT_MAX_SEGMENT_BYTES).unwrap();
        for i in 0..5 {
            queue.put(op(&format!("p{i}"))).unwrap();
        }
        let batch = queue.get_batch(2, usize::MAX).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.operations()[1].version, 2);
    }

    #[test]
    fn rotation_spans_segments_transparently() {
        let dir = tempdir().unwrap();
        // Tiny segment size forces a rotation after a couple of records.
        let queue = DiskQueue::open(dir.path(), 64).unwrap();
        for i in 0..20 {
            queue.put(op(&format!("attr-with-a-longer-name-{i}"))).unwrap();
        }

        let batch = queue.get_batch(100, usize::MAX).unwrap();
        assert_eq!(batch.len(), 20);
        for (i, vop) in batch.operations().iter().enumerate() {
            assert_eq!(vop.version, (i + 1) as u64);
        }
    }

    #[test]
    fn reopen_recovers_unacked_operations() {
        let dir = tempdir().unwrap();
        {
            let queue = DiskQueue::open(dir.path(), DEFAULT_MAX_SEGMENT_BYTES).unwrap();
            queue.put(op("a")).unwrap();
            queue.put(op("b")).unwrap();
            queue.put(op("c")).unwrap();
            queue.ack(1).unwrap();
            queue.flush().unwrap();
        }

        let reopened = DiskQueue::open(dir.path(), DEFAULT_MAX_SEGMENT_BYTES).unwrap();
        assert_eq!(reopened.last_put_version(), 3);
        assert_eq!(reopened.last_ack_version(), 1);

        let batch = reopened.get_batch(10, usize::MAX).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.operations()[0].version, 2);
        assert_eq!(batch.operations()[1].version, 3);
    }

    #[test]
    fn recovery_truncates_a_torn_trailing_frame() {
        let dir = tempdir().unwrap();
        {
            let queue = DiskQueue::open(dir.path(), DEFAULT_MAX_SEGMENT_BYTES).unwrap();
            queue.put(op("a")).unwrap();
            queue.put(op("b")).unwrap();
            queue.flush().unwrap();
        }

        // Simulate a crash mid-write: append a few garbage bytes that look
        // like the start of a length-prefixed frame but never complete.
        let segment = segment_path(dir.path(), 0);
        {
            use std::io::Write;
            let mut f = OpenOptions::new().append(true).open(&segment).unwrap();
            f.write_all(&[9, 0, 0, 0, b'{', b'"']).unwrap();
        }

        let queue = DiskQueue::open(dir.path(), DEFAULT_MAX_SEGMENT_BYTES).unwrap();
        assert_eq!(queue.last_put_version(), 2);

        let v3 = queue.put(op("c")).unwrap();
        assert_eq!(v3, 3);
    }

    #[test]
    fn flush_and_wait_for_ack_returns_once_a_concurrent_consumer_acks() {
        let dir = tempdir().unwrap();
        let queue = std::sync::Arc::new(DiskQueue::open(dir.path(), DEFAULT_MAX_SEGMENT_BYTES).unwrap());
        queue.put(op("a")).unwrap();
        queue.put(op("b")).unwrap();

        let consumer = std::sync::Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            let batch = consumer.get_batch(10, usize::MAX).unwrap();
            consumer.ack(batch.highest_version().unwrap()).unwrap();
        });

        let reached = queue
            .flush_and_wait_for_ack(std::time::Duration::from_secs(2))
            .unwrap();
        assert!(reached);
        assert_eq!(queue.last_ack_version(), 2);
        handle.join().unwrap();
    }

    #[test]
    fn flush_and_wait_for_ack_times_out_with_no_consumer() {
        let dir = tempdir().unwrap();
        let queue = DiskQueue::open(dir.path(), DEFAULT_MAX_SEGMENT_BYTES).unwrap();
        queue.put(op("a")).unwrap();

        let reached = queue
            .flush_and_wait_for_ack(std::time::Duration::from_millis(30))
            .unwrap();
        assert!(!reached);
    }

    #[test]
    fn get_round_trips_a_single_operation() {
        let dir = tempdir().unwrap();
        let queue = DiskQueue::open(dir.path(), DEFAULT_MAX_SEGMENT_BYTES).unwrap();
        queue.put(op("solo")).unwrap();

        let (decoded, version) = queue.get().unwrap().expect("one operation was put");
        assert_eq!(version, 1);
        assert_eq!(decoded, op("solo"));
        assert!(queue.get().unwrap().is_none(), "queue has nothing left to read");
    }

    #[test]
    fn corrupt_record_is_skipped_and_acked_rather_than_wedging_the_reader() {
        let dir = tempdir().unwrap();
        {
            let queue = DiskQueue::open(dir.path(), DEFAULT_MAX_SEGMENT_BYTES).unwrap();
            queue.put(op("a")).unwrap();
            queue.flush().unwrap();
        }

        // Overwrite the length-valid payload of what would be version 2 with
        // bytes that parse as neither the frame header nor valid JSON, then
        // append a third, valid record after it.
        let segment = segment_path(dir.path(), 0);
        {
            use std::io::Write;
            let mut f = OpenOptions::new().append(true).open(&segment).unwrap();
            let garbage = b"not valid json";
            let len = garbage.len() as u32;
            f.write_all(&len.to_le_bytes()).unwrap();
            f.write_all(garbage).unwrap();
        }
        let queue = DiskQueue::open(dir.path(), DEFAULT_MAX_SEGMENT_BYTES).unwrap();
        let v3 = queue.put(op("c")).unwrap();
        assert_eq!(v3, 3);

        let batch = queue.get_batch(10, usize::MAX).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.operations()[0].version, 3);
        // The corrupt version-2 slot was acked (dropped) automatically.
        assert_eq!(queue.last_ack_version(), 2);
    }

    #[test]
    fn fully_acked_segments_are_deleted() {
        let dir = tempdir().unwrap();
        let queue = DiskQueue::open(dir.path(), 40).unwrap();
        for i in 0..10 {
            queue.put(op(&format!("attr-{i}"))).unwrap();
        }
        let before = list_segments(dir.path()).unwrap().len();
        assert!(before > 1, "test setup should force multiple segments");

        queue.ack(10).unwrap();
        let after = list_segments(dir.path()).unwrap().len();
        assert_eq!(after, 1, "only the current write segment should remain");
    }
}
