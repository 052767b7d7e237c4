//! Durable cursor tracking (`last_put_version` / `last_ack_version`) plus the
//! condition-variable signalling the `ConsumerLoop`'s `Idle` state waits on.
//!
//! This plays the role of the teacher's `Ledger` (`variants/disk_v2/ledger.rs`):
//! a single place that owns "how far have we written" / "how far have we
//! acknowledged" and wakes up whichever side is waiting on progress. The
//! teacher backs this with a memory-mapped, atomics-based archive because it
//! needs lock-free access from both an async reader and writer task; this
//! spec's explicit thread + condvar model (`SPEC_FULL.md` §5) calls for a
//! plain `Mutex`-guarded struct instead, with two small durable sidecar files
//! for the pieces that must survive a crash.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

const LAST_PUT_VERSION_FILE: &str = "last_put_version";
const LAST_ACK_VERSION_FILE: &str = "last_ack_version";

struct LedgerState {
    last_put_version: u64,
    last_ack_version: u64,
    /// Set by `flush()` or by `process` crossing the batch-size threshold, to
    /// wake the consumer out of `Idle` even though `flush_period` hasn't
    /// elapsed yet.
    wake_requested: bool,
    stopping: bool,
}

pub(crate) struct Ledger {
    dir: PathBuf,
    state: Mutex<LedgerState>,
    activity: Condvar,
}

impl Ledger {
    /// Loads durable cursors from `dir`, treating missing sidecar files as
    /// zero (a brand new queue).
    pub(crate) fn load_or_create(dir: &Path) -> io::Result<Self> {
        let last_put_version = read_cursor_file(&dir.join(LAST_PUT_VERSION_FILE))?;
        let last_ack_version = read_cursor_file(&dir.join(LAST_ACK_VERSION_FILE))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            state: Mutex::new(LedgerState {
                last_put_version,
                last_ack_version,
                wake_requested: false,
                stopping: false,
            }),
            activity: Condvar::new(),
        })
    }

    pub(crate) fn last_put_version(&self) -> u64 {
        self.state.lock().last_put_version
    }

    pub(crate) fn last_ack_version(&self) -> u64 {
        self.state.lock().last_ack_version
    }

    /// Overrides the in-memory `last_put_version`, used by recovery after a
    /// truncated trailing frame rewinds it to the last intact record.
    pub(crate) fn set_last_put_version(&self, version: u64) {
        self.state.lock().last_put_version = version;
    }

    /// Records a successful `put`. Durability is deferred to the next
    /// `flush()` call, per the spec: "appends are durable only after
    /// `flush()`".
    pub(crate) fn record_put(&self, version: u64) {
        let mut state = self.state.lock();
        state.last_put_version = version;
        drop(state);
        trace!(version, "ledger recorded put");
        self.activity.notify_one();
    }

    /// Persists `last_put_version` to its sidecar file, with fsync of both the
    /// file and its parent directory.
    pub(crate) fn persist_last_put_version(&self) -> io::Result<()> {
        let version = self.state.lock().last_put_version;
        write_cursor_file(&self.dir, LAST_PUT_VERSION_FILE, version)?;
        trace!(version, "persisted last_put_version");
        Ok(())
    }

    /// Max-preserving, durable acknowledgement: `last_ack_version :=
    /// max(last_ack_version, version)`, fsync'd before returning. Returns
    /// whether the cursor actually advanced (an ack of an already-acked or
    /// lower version is a no-op per `SPEC_FULL.md` §8).
    pub(crate) fn ack(&self, version: u64) -> io::Result<bool> {
        {
            let state = self.state.lock();
            if version <= state.last_ack_version {
                return Ok(false);
            }
        }

        write_cursor_file(&self.dir, LAST_ACK_VERSION_FILE, version)?;

        let mut state = self.state.lock();
        if version > state.last_ack_version {
            state.last_ack_version = version;
        }
        drop(state);
        self.activity.notify_all();
        Ok(true)
    }

    /// Blocks the calling (producer) thread until `last_ack_version` reaches
    /// `target`, or until `timeout` elapses. Returns whether the target was
    /// actually reached. Used by the `Async` processor's `flush()`, per
    /// `SPEC_FULL.md` §4.6's "Wakeup": flush blocks until everything put
    /// before the call has been acked, or gives up after the timeout without
    /// raising.
    pub(crate) fn wait_for_ack_at_least(&self, target: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.last_ack_version < target {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let result = self.activity.wait_for(&mut state, remaining);
            if result.timed_out() && state.last_ack_version < target {
                break;
            }
        }
        state.last_ack_version >= target
    }

    /// Requests that a waiting consumer wake up even though `flush_period`
    /// hasn't elapsed: used by `flush()` and by `process` crossing the
    /// configured batch-size threshold.
    pub(crate) fn request_wakeup(&self) {
        self.state.lock().wake_requested = true;
        self.activity.notify_one();
    }

    pub(crate) fn mark_stopping(&self) {
        self.state.lock().stopping = true;
        debug!("ledger marked stopping");
        self.activity.notify_one();
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.state.lock().stopping
    }

    /// The `Idle` state's wait: blocks until `timeout` elapses, or until a
    /// `put`, an explicit wakeup request, or a stop request occurs — whichever
    /// comes first. Clears the one-shot wakeup flag on return.
    pub(crate) fn wait_idle(&self, last_seen_put_version: u64, timeout: Duration) {
        let mut state = self.state.lock();
        let deadline_check =
            |s: &mut LedgerState| -> bool {
                !s.stopping && !s.wake_requested && s.last_put_version == last_seen_put_version
            };

        if deadline_check(&mut state) {
            let _ = self.activity.wait_for(&mut state, timeout);
        }
        state.wake_requested = false;
    }
}

fn read_cursor_file(path: &Path) -> io::Result<u64> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents.trim().parse().unwrap_or(0)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// Atomically writes a decimal ASCII `u64` to `<dir>/<name>`: write to a
/// `.tmp` sibling, fsync the file, rename over the destination, then fsync
/// the parent directory so the rename itself is durable.
fn write_cursor_file(dir: &Path, name: &str, value: u64) -> io::Result<()> {
    let final_path = dir.join(name);
    let tmp_path = dir.join(format!("{name}.tmp"));

    fs::write(&tmp_path, value.to_string())?;
    let tmp_file = fs::File::open(&tmp_path)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    fs::rename(&tmp_path, &final_path)?;
    sync_dir(dir)?;
    Ok(())
}

/// Best-effort directory fsync; a no-op on platforms where opening a
/// directory for reading isn't meaningful (this will simply fail to open and
/// we treat that as "nothing more we can do").
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    let dir_file = fs::File::open(dir)?;
    dir_file.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn missing_cursor_files_default_to_zero() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load_or_create(dir.path()).unwrap();
        assert_eq!(ledger.last_put_version(), 0);
        assert_eq!(ledger.last_ack_version(), 0);
    }

    #[test]
    fn ack_is_max_preserving() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load_or_create(dir.path()).unwrap();

        assert!(ledger.ack(5).unwrap());
        assert_eq!(ledger.last_ack_version(), 5);

        assert!(!ledger.ack(3).unwrap());
        assert_eq!(ledger.last_ack_version(), 5);

        assert!(ledger.ack(5).unwrap() == false);
        assert_eq!(ledger.last_ack_version(), 5);
    }

    #[test]
    fn wait_for_ack_returns_once_target_is_acked() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(Ledger::load_or_create(dir.path()).unwrap());

        let acker = Arc::clone(&ledger);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            acker.ack(3).unwrap();
        });

        let reached = ledger.wait_for_ack_at_least(3, Duration::from_secs(2));
        assert!(reached);
        handle.join().unwrap();
    }

    #[test]
    fn wait_for_ack_gives_up_after_timeout() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load_or_create(dir.path()).unwrap();
        let reached = ledger.wait_for_ack_at_least(5, Duration::from_millis(30));
        assert!(!reached);
    }

    #[test]
    fn cursors_survive_reload() {
        let dir = tempdir().unwrap();
        {
            let ledger = Ledger::load_or_create(dir.path()).unwrap();
            ledger.record_put(7);
            ledger.persist_last_put_version().unwrap();
            ledger.ack(4).unwrap();
        }

        let reloaded = Ledger::load_or_create(dir.path()).unwrap();
        assert_eq!(reloaded.last_put_version(), 7);
        assert_eq!(reloaded.last_ack_version(), 4);
    }
}
