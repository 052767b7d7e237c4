//! The `Async` processor: persists to a [`DiskQueue`] on the caller's thread
//! and drains it to a [`Backend`] on a dedicated background thread.
//!
//! The background thread's `ConsumerLoop` cycles through `Idle` (nothing to
//! do, blocked on the queue's activity condvar), `Draining` (submitting a
//! batch), and `Sleeping` (backing off after a transient failure), and ends
//! in `Stopping`/`Stopped` once `stop()` has been called and every
//! operation that was in the queue at that point has been acked. This
//! generalizes the teacher's `ensure_ready_for_write` wait/retry loop
//! (`disk_v2/writer.rs`) from "wait for reader capacity" to "wait for work,
//! retry the backend with backoff".

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::backend::Backend;
use crate::config::ProcessorConfig;
use crate::error::{BackendError, ConfigError, ProcessorError};
use crate::metadata::MetadataFile;
use crate::operation::Operation;
use crate::path::{self, ConnectionMode, ContainerType, UniqueId};
use crate::queue::DiskQueue;
use crate::storage::OperationStorage;

use super::OperationProcessor;

pub struct AsyncProcessor {
    data_path: PathBuf,
    metadata: MetadataFile,
    storage: OperationStorage,
    queue: Arc<DiskQueue>,
    warned_backpressure: Arc<AtomicBool>,
    max_queue_bytes: u64,
    max_batch_count: usize,
    max_batch_bytes: usize,
    flush_timeout: Duration,
    consumer: Mutex<Option<JoinHandle<()>>>,
    failed: Arc<AtomicBool>,
}

impl AsyncProcessor {
    pub fn new(
        root: &Path,
        container_type: ContainerType,
        container_id: UniqueId,
        backend: Arc<dyn Backend>,
        config: ProcessorConfig,
    ) -> Result<Self, ProcessorError> {
        let data_path =
            path::data_path(root, ConnectionMode::Async, container_type, &container_id);
        fs::create_dir_all(&data_path).map_err(|e| ConfigError::DataDirCreate {
            path: data_path.clone(),
            source: e,
        })?;

        let metadata = MetadataFile::create(
            &data_path,
            ConnectionMode::Async,
            container_type,
            container_id,
        )?;
        let storage = OperationStorage::open(&data_path)?;
        let queue = Arc::new(DiskQueue::open(&data_path, config.max_segment_bytes)?);

        let failed = Arc::new(AtomicBool::new(false));
        let consumer_queue = Arc::clone(&queue);
        let consumer_config = config.clone();
        let consumer_failed = Arc::clone(&failed);
        let handle = thread::spawn(move || {
            ConsumerLoop::new(consumer_queue, backend, consumer_config, consumer_failed).run()
        });

        Ok(Self {
            data_path,
            metadata,
            storage,
            queue,
            warned_backpressure: Arc::new(AtomicBool::new(false)),
            max_queue_bytes: config.max_queue_bytes,
            max_batch_count: config.max_batch_count,
            max_batch_bytes: config.max_batch_bytes,
            flush_timeout: config.stop_timeout,
            consumer: Mutex::new(Some(handle)),
            failed,
        })
    }
}

impl OperationProcessor for AsyncProcessor {
    fn process(&self, op: Operation) -> Result<(), ProcessorError> {
        self.queue.put(op)?;

        // Idle wakeup: don't make a full batch sit queued for up to
        // `flush_period` just because nobody called `flush()` — once the
        // backlog crosses either batch threshold, wake the consumer the same
        // way `flush()` does (`SPEC_FULL.md` §4.6 "Idle").
        if self.queue.pending_count() >= self.max_batch_count as u64
            || self.queue.size() >= self.max_batch_bytes as u64
        {
            self.queue.request_wakeup();
        }

        if self.queue.size() >= self.max_queue_bytes
            && !self.warned_backpressure.swap(true, Ordering::Relaxed)
        {
            warn!(
                queue_bytes = self.queue.size(),
                limit = self.max_queue_bytes,
                "queue backlog exceeds max_queue_bytes; continuing to accept operations"
            );
        }
        Ok(())
    }

    /// Fsyncs the queue and blocks until the consumer has acked everything
    /// that was `put` before this call, or until `flush_timeout` elapses. A
    /// timeout is logged, never raised, per §5 "Cancellation / timeouts".
    fn flush(&self) -> Result<(), ProcessorError> {
        if !self.queue.flush_and_wait_for_ack(self.flush_timeout)? {
            warn!(
                timeout = ?self.flush_timeout,
                "flush() timed out before the consumer drained everything already queued"
            );
        }
        Ok(())
    }

    /// Requests the consumer thread drain everything already in the queue
    /// and exit, waiting up to `timeout`. A timeout is logged as a
    /// `ShutdownTimeout`, not raised: the queue (and whatever is left unacked
    /// in it) survives on disk either way.
    fn stop(&self, timeout: Duration) -> Result<(), ProcessorError> {
        self.queue.request_stop();
        self.queue.flush()?;

        let handle = self.consumer.lock().take();
        if let Some(handle) = handle {
            let deadline = Instant::now() + timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(20));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!(
                    ?timeout,
                    "consumer thread did not finish draining within stop_timeout"
                );
            }
        }

        if self.failed.load(Ordering::Relaxed) {
            warn!(
                data_path = %self.data_path.display(),
                "async consumer previously stopped with an error status (see earlier error log); \
                 unacknowledged operations remain durably queued on disk for a future process"
            );
        }

        self.storage.close()?;
        self.metadata.close()?;
        Ok(())
    }

    fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Whether the background consumer permanently gave up (e.g. after
    /// `MAX_IO_FAILURES` consecutive transient backend failures) rather than
    /// draining cleanly. `SPEC_FULL.md` §7: "fatal after `MAX_IO_FAILURES`
    /// ... consumer transitions to *Stopped* with an error status". A `true`
    /// result means unacknowledged (and possibly unflushed) operations may
    /// still be sitting in the queue with nothing left to drain them.
    fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }
}

/// The background drain loop, factored out of [`AsyncProcessor`] so its
/// states and transitions can be read (and tested) independently of thread
/// spawning.
struct ConsumerLoop {
    queue: Arc<DiskQueue>,
    backend: Arc<dyn Backend>,
    config: ProcessorConfig,
    failed: Arc<AtomicBool>,
}

/// Initial backoff delay after the first transient failure; doubles on each
/// subsequent one, capped at `config.max_backoff`.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

impl ConsumerLoop {
    fn new(
        queue: Arc<DiskQueue>,
        backend: Arc<dyn Backend>,
        config: ProcessorConfig,
        failed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            queue,
            backend,
            config,
            failed,
        }
    }

    /// Marks the loop as having given up with an error status before
    /// returning from `run()`, per `SPEC_FULL.md` §7's "consumer transitions
    /// to *Stopped* with an error status" — as opposed to the clean,
    /// drained-everything return path, which leaves this `false`.
    fn mark_failed(&self) {
        self.failed.store(true, Ordering::Relaxed);
    }

    fn run(self) {
        let mut backoff = INITIAL_BACKOFF;
        let mut consecutive_io_failures = 0u32;

        loop {
            let batch = match self
                .queue
                .get_batch(self.config.max_batch_count, self.config.max_batch_bytes)
            {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "failed to read from disk queue; stopping consumer");
                    self.mark_failed();
                    return;
                }
            };

            if batch.is_empty() {
                if self.queue.is_stopping() {
                    debug!("consumer loop draining complete, stopping");
                    return;
                }
                // Idle: block until a put, an explicit flush wakeup, a stop
                // request, or the flush period elapses, whichever is first.
                self.queue.wait_for_activity(self.config.flush_period);
                continue;
            }

            // Draining: submit the batch to the backend.
            match self.backend.execute(&batch) {
                Ok(outcome) => {
                    consecutive_io_failures = 0;
                    backoff = INITIAL_BACKOFF;

                    for rejected in &outcome.rejected {
                        warn!(
                            version = rejected.version,
                            reason = %rejected.reason,
                            "backend permanently rejected operation"
                        );
                    }
                    if let Some(accepted_up_to) = outcome.accepted_up_to {
                        if let Err(e) = self.queue.ack(accepted_up_to) {
                            error!(error = %e, "failed to durably ack accepted batch; stopping consumer");
                            self.mark_failed();
                            return;
                        }
                    }
                }
                Err(BackendError::Transport(reason)) => {
                    consecutive_io_failures += 1;
                    warn!(
                        attempt = consecutive_io_failures,
                        reason = %reason,
                        backoff = ?backoff,
                        "transient failure submitting batch; retrying with backoff"
                    );

                    if consecutive_io_failures >= self.config.max_io_failures {
                        error!(
                            consecutive_io_failures,
                            "giving up after too many consecutive transient failures; \
                             unacknowledged operations remain durably queued for a future process"
                        );
                        self.mark_failed();
                        return;
                    }

                    // Sleeping: exponential backoff, capped.
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
                Err(BackendError::Rejected { version, reason }) => {
                    // A whole-batch call is never expected to surface a
                    // single-operation rejection directly; treat it as
                    // covering just that operation and keep going.
                    warn!(version, reason = %reason, "backend rejected operation outside outcome reporting");
                    if let Err(e) = self.queue.ack(version) {
                        error!(error = %e, "failed to ack after inline rejection; stopping consumer");
                        self.mark_failed();
                        return;
                    }
                }
            }
        }
    }
}
