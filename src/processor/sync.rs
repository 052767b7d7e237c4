//! The `Sync` processor: submits directly to the [`Backend`] on the caller's
//! thread. Never persists an operation — if `process` returns `Ok`, the
//! backend has already durably accepted it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::backend::Backend;
use crate::error::{BackendError, ConfigError, ProcessorError};
use crate::metadata::MetadataFile;
use crate::operation::{Batch, Operation, VersionedOperation};
use crate::path::{self, ConnectionMode, ContainerType, UniqueId};
use crate::storage::OperationStorage;

use super::OperationProcessor;

pub struct SyncProcessor {
    data_path: PathBuf,
    metadata: MetadataFile,
    storage: OperationStorage,
    backend: Arc<dyn Backend>,
    next_version: AtomicU64,
}

impl SyncProcessor {
    pub fn new(
        root: &Path,
        container_type: ContainerType,
        container_id: UniqueId,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, ProcessorError> {
        let data_path = path::data_path(root, ConnectionMode::Sync, container_type, &container_id);
        fs::create_dir_all(&data_path).map_err(|e| ConfigError::DataDirCreate {
            path: data_path.clone(),
            source: e,
        })?;
        let metadata = MetadataFile::create(
            &data_path,
            ConnectionMode::Sync,
            container_type,
            container_id,
        )?;
        // No operation is ever persisted in `Sync` mode, but a blob staged via
        // `upload_path/` before the attribute update that references it still
        // needs somewhere to live (`SPEC_FULL.md` §4.4).
        let storage = OperationStorage::open(&data_path)?;

        Ok(Self {
            data_path,
            metadata,
            storage,
            backend,
            next_version: AtomicU64::new(1),
        })
    }
}

impl OperationProcessor for SyncProcessor {
    fn process(&self, op: Operation) -> Result<(), ProcessorError> {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let batch = Batch {
            operations: vec![VersionedOperation::new(version, op)],
        };

        let outcome = self
            .backend
            .execute(&batch)
            .map_err(ProcessorError::Backend)?;

        if let Some(rejected) = outcome.rejected.into_iter().next() {
            return Err(ProcessorError::Backend(BackendError::Rejected {
                version: rejected.version,
                reason: rejected.reason,
            }));
        }
        Ok(())
    }

    /// No operation is ever buffered, but a staged blob might be; flush it
    /// through.
    fn flush(&self) -> Result<(), ProcessorError> {
        self.storage.flush()?;
        Ok(())
    }

    /// Closes and removes the (by now empty) `upload_path/` directory,
    /// removes the metadata file, and `rmdir`s the data path. A non-empty or
    /// already-gone directory is logged and swallowed, never raised, matching
    /// the reference client's teardown behavior.
    fn stop(&self, _timeout: Duration) -> Result<(), ProcessorError> {
        self.storage.close()?;
        self.storage.cleanup()?;
        self.metadata.cleanup()?;
        if let Err(e) = fs::remove_dir(&self.data_path) {
            warn!(
                path = %self.data_path.display(),
                error = %e,
                "failed to remove data path on stop; leaving it in place"
            );
        }
        Ok(())
    }

    fn data_path(&self) -> &Path {
        &self.data_path
    }
}
