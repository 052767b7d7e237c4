//! A durable, client-side operation pipeline for an experiment-tracking SDK.
//!
//! Callers construct operations describing a mutation to some attribute on a
//! run/project/model/model-version, hand them to an [`OperationProcessor`],
//! and the processor takes care of getting them to a [`Backend`] reliably —
//! synchronously, durably-and-asynchronously, or (for `Offline`) not at all
//! until something else drains the queue later.
//!
//! Three processor variants, selected by [`build_processor`]:
//!
//! - **`sync`**: submits on the caller's thread, no local persistence.
//! - **`async`**: persists to a crash-consistent on-disk queue and drains it
//!   on a background thread with retry and backoff.
//! - **`offline`**: persists to the same on-disk queue but never talks to a
//!   backend; meant to be drained later by an `async` processor pointed at
//!   the same directory.

mod backend;
mod config;
mod error;
mod metadata;
mod operation;
mod path;
mod processor;
mod queue;
mod storage;

pub use backend::{Backend, ExecuteOutcome, RejectedOperation};
#[cfg(any(test, feature = "test-util"))]
pub use backend::test_double;
pub use config::{data_directory, ProcessorConfig};
pub use error::{BackendError, ConfigError, ProcessorError, QueueError};
pub use operation::{AttributePath, Batch, Operation, VersionedOperation};
pub use path::{ConnectionMode, ContainerType, UniqueId};
pub use processor::{build_processor, AsyncProcessor, OfflineProcessor, OperationProcessor, SyncProcessor};
