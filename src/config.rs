//! Tunables collected in one place, with the spec's stated defaults.
//!
//! Mirrors the shape of the teacher's `DiskBufferConfigBuilder`
//! (`disk_v2/common.rs`): a plain struct of knobs with a `Default` impl,
//! rather than a builder with required fields, since every field here has a
//! sensible spec-given default and none are mandatory for the caller to set.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::queue::DEFAULT_MAX_SEGMENT_BYTES;

const DEFAULT_DATA_DIRECTORY: &str = "./.neptune";
const ENV_DATA_DIRECTORY: &str = "NEPTUNE_DATA_DIRECTORY";

/// Default maximum number of operations drained into one batch.
pub const DEFAULT_MAX_BATCH_COUNT: usize = 1000;

/// Default maximum serialized size, in bytes, of one batch.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 1024 * 1024;

/// Default backlog size, in bytes, above which the `Async` processor emits a
/// one-time backpressure warning rather than blocking the caller.
pub const DEFAULT_MAX_QUEUE_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Default period between unconditional flush/drain attempts.
pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_secs(5);

/// Default ceiling on the `ConsumerLoop`'s exponential backoff.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Default number of consecutive transient I/O failures the `Async`
/// processor tolerates before treating the queue as unusable.
pub const DEFAULT_MAX_IO_FAILURES: u32 = 3;

/// Default ceiling on how long `stop()` waits for in-flight work to drain
/// before giving up and returning a `ShutdownTimeout` (logged, not raised).
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// Tunables shared by all three processor variants. Every field has the
/// spec's documented default; callers only need to override what they care
/// about.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub max_segment_bytes: u64,
    pub max_batch_count: usize,
    pub max_batch_bytes: usize,
    pub max_queue_bytes: u64,
    pub flush_period: Duration,
    pub max_backoff: Duration,
    pub max_io_failures: u32,
    pub stop_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            max_batch_count: DEFAULT_MAX_BATCH_COUNT,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_queue_bytes: DEFAULT_MAX_QUEUE_BYTES,
            flush_period: DEFAULT_FLUSH_PERIOD,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_io_failures: DEFAULT_MAX_IO_FAILURES,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Resolves the root directory all `DataPath`s are created under:
/// `NEPTUNE_DATA_DIRECTORY` if set, otherwise `./.neptune`.
///
/// `NEPTUNE_API_TOKEN` and `NEPTUNE_PROJECT` are read by the embedding SDK,
/// not by this crate; it never inspects them.
pub fn data_directory() -> PathBuf {
    match env::var(ENV_DATA_DIRECTORY) {
        Ok(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_DATA_DIRECTORY),
    }
}
