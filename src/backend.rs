//! The `Backend` capability: the only way this crate talks to the outside
//! world.
//!
//! Keeping this as a trait with a single `execute` method — rather than a
//! concrete HTTP client baked into the processors — mirrors the teacher's
//! `Acker`/pluggable-sink seam (`acknowledgements.rs`): the queueing and
//! retry logic is exercised in tests against an in-memory double, and a real
//! network client is an implementation detail the pipeline doesn't need to
//! know about.

use crate::error::BackendError;
use crate::operation::{Batch, VersionedOperation};

/// A single operation the backend durably rejected, but did not fail the
/// whole batch over. The operation is still considered consumed (acked);
/// this is reported to the caller as a failure rather than retried.
#[derive(Debug, Clone)]
pub struct RejectedOperation {
    pub version: u64,
    pub reason: String,
}

/// Result of submitting one batch to a [`Backend`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOutcome {
    /// The highest version the backend durably processed (accepted or
    /// permanently rejected) from this batch. Every operation up to and
    /// including this version can be acked; `None` means nothing in the
    /// batch was processed at all.
    pub accepted_up_to: Option<u64>,
    /// Permanent, per-operation rejections within the accepted range.
    pub rejected: Vec<RejectedOperation>,
}

/// Submits batches of operations to wherever they ultimately need to go.
///
/// Implementations distinguish two failure modes, matching §7's transient /
/// permanent split:
///
/// - Returning `Err(BackendError::Transport(_))` means nothing in the batch
///   was processed; the caller retries the identical batch with backoff.
/// - Returning `Ok(outcome)` with entries in `outcome.rejected` means the
///   backend looked at those operations and permanently declined them; the
///   caller still acks up to `outcome.accepted_up_to` and surfaces the
///   rejections as failures, it does not retry them.
pub trait Backend: Send + Sync {
    fn execute(&self, batch: &Batch) -> Result<ExecuteOutcome, BackendError>;
}

/// In-memory [`Backend`] double used across this crate's tests: records
/// every batch it was handed, optionally rejecting specific versions or
/// failing outright to exercise retry/backoff paths.
#[cfg(any(test, feature = "test-util"))]
pub mod test_double {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    #[derive(Default)]
    pub struct RecordingBackend {
        state: Mutex<State>,
    }

    #[derive(Default)]
    struct State {
        received: Vec<VersionedOperation>,
        reject_versions: HashSet<u64>,
        fail_next_n: usize,
    }

    impl RecordingBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Causes `execute` to permanently reject this version the next time
        /// it appears in a batch (as opposed to failing the whole batch).
        pub fn reject_version(&self, version: u64) {
            self.state.lock().reject_versions.insert(version);
        }

        /// Causes the next `n` calls to `execute` to return a transient
        /// `TransportError` without consuming anything.
        pub fn fail_next(&self, n: usize) {
            self.state.lock().fail_next_n = n;
        }

        pub fn received(&self) -> Vec<VersionedOperation> {
            self.state.lock().received.clone()
        }
    }

    impl Backend for RecordingBackend {
        fn execute(&self, batch: &Batch) -> Result<ExecuteOutcome, BackendError> {
            let mut state = self.state.lock();
            if state.fail_next_n > 0 {
                state.fail_next_n -= 1;
                return Err(BackendError::Transport("simulated transport failure".into()));
            }

            let mut outcome = ExecuteOutcome::default();
            for vop in batch.operations() {
                if state.reject_versions.remove(&vop.version) {
                    outcome.rejected.push(RejectedOperation {
                        version: vop.version,
                        reason: "rejected by test double".into(),
                    });
                } else {
                    state.received.push(vop.clone());
                }
                outcome.accepted_up_to = Some(vop.version);
            }
            Ok(outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_double::RecordingBackend;
    use super::*;
    use crate::operation::Operation;

    fn batch(versions: &[u64]) -> Batch {
        Batch {
            operations: versions
                .iter()
                .map(|&v| {
                    VersionedOperation::new(
                        v,
                        Operation::DeleteAttribute {
                            path: vec!["x".into()],
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn accepts_everything_by_default() {
        let backend = RecordingBackend::new();
        let outcome = backend.execute(&batch(&[1, 2, 3])).unwrap();
        assert_eq!(outcome.accepted_up_to, Some(3));
        assert!(outcome.rejected.is_empty());
        assert_eq!(backend.received().len(), 3);
    }

    #[test]
    fn rejects_a_specific_version_without_failing_the_batch() {
        let backend = RecordingBackend::new();
        backend.reject_version(2);
        let outcome = backend.execute(&batch(&[1, 2, 3])).unwrap();
        assert_eq!(outcome.accepted_up_to, Some(3));
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].version, 2);
        assert_eq!(backend.received().len(), 2);
    }

    #[test]
    fn transient_failure_consumes_nothing() {
        let backend = RecordingBackend::new();
        backend.fail_next(1);
        let err = backend.execute(&batch(&[1, 2])).unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
        assert!(backend.received().is_empty());
    }
}
