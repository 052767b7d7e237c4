use std::io;
use std::path::PathBuf;

/// Error that occurred while reading or writing the on-disk queue.
///
/// Most variants carry enough context (a path, an `io::Error`, or an offending
/// version) to log usefully without the caller needing to thread in extra
/// context of their own.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A general I/O error occurred while reading, writing, or syncing a segment
    /// or cursor file.
    ///
    /// Raised by almost every `DiskQueue` method; in the async processor this is
    /// retried with backoff rather than surfaced directly, per the consumer's
    /// retry table.
    #[error("queue I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    /// A record could not be encoded to, or decoded from, its on-disk framing.
    ///
    /// Unlike `Io`, this is not transient: re-reading the same bytes will
    /// produce the same error. The async consumer acks the offending record (it
    /// is "dropped", not retried) so that a single malformed record cannot
    /// wedge the queue.
    #[error("failed to (de)serialize queued operation at version {version:?}: {reason}")]
    Serialization {
        version: Option<u64>,
        reason: String,
    },

    /// The record, once encoded, exceeded the configured maximum record size.
    #[error("encoded record of {size} bytes exceeds the maximum record size of {limit} bytes")]
    RecordTooLarge { size: usize, limit: usize },

    /// `cleanup()` was called on a queue that had not been `close()`d first.
    #[error("cannot clean up a disk queue that has not been closed")]
    NotClosed,
}

impl QueueError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        QueueError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Error returned by the processor factory when building a processor from
/// caller-supplied configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `connection_mode` did not match any of `async`, `sync`, or `offline`.
    #[error("unknown connection mode {0:?}; expected one of \"async\", \"sync\", \"offline\"")]
    UnknownConnectionMode(String),

    /// The data directory could not be created.
    #[error("failed to create data directory {path}: {source}")]
    DataDirCreate { path: PathBuf, source: io::Error },
}

/// Transient or permanent failure returned by a [`crate::backend::Backend`]
/// implementation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// A transient transport-level failure (timeout, connection reset, 5xx,
    /// etc). The async consumer retries the same, un-consumed batch with
    /// exponential backoff. The sync processor surfaces this to the caller.
    #[error("transport error submitting batch: {0}")]
    Transport(String),

    /// The backend permanently rejected an individual operation within an
    /// otherwise-accepted batch (e.g. schema violation). The operation is
    /// still considered consumed: it is acked, never retried, and recorded as
    /// a failure by the caller.
    #[error("backend rejected operation at version {version}: {reason}")]
    Rejected { version: u64, reason: String },
}

/// Error surfaced by an [`crate::processor::OperationProcessor`] during
/// construction, `process`, `flush`, or `stop`.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Surfaced only by the Sync variant, which submits directly to the
    /// backend on the caller's thread and does not retry.
    #[error(transparent)]
    Backend(#[from] BackendError),
}
