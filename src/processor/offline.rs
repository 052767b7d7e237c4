//! The `Offline` processor: persists operations to a [`DiskQueue`] and never
//! talks to a [`Backend`] at all. Meant for local-only runs that get synced
//! later by pointing an `Async` processor at the same `DataPath`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::ProcessorConfig;
use crate::error::{ConfigError, ProcessorError};
use crate::metadata::MetadataFile;
use crate::operation::Operation;
use crate::path::{self, ConnectionMode, ContainerType, UniqueId};
use crate::queue::DiskQueue;
use crate::storage::OperationStorage;

use super::OperationProcessor;

pub struct OfflineProcessor {
    data_path: PathBuf,
    metadata: MetadataFile,
    storage: OperationStorage,
    queue: DiskQueue,
}

impl OfflineProcessor {
    /// `lock` is an advisory, caller-supplied mutex used to serialize
    /// processor creation within one process — e.g. to coordinate this
    /// constructor's `mkdir`/`DiskQueue::open` with some other subsystem that
    /// also touches `root` (`SPEC_FULL.md` §5 "Cross-processor exclusion").
    /// It is held for the whole of construction and released on return;
    /// passing `None` skips locking entirely.
    pub fn new(
        root: &Path,
        container_type: ContainerType,
        container_id: UniqueId,
        config: ProcessorConfig,
        lock: Option<Arc<Mutex<()>>>,
    ) -> Result<Self, ProcessorError> {
        let _guard = lock.as_ref().map(|l| l.lock().unwrap_or_else(|p| p.into_inner()));

        let data_path =
            path::data_path(root, ConnectionMode::Offline, container_type, &container_id);
        fs::create_dir_all(&data_path).map_err(|e| ConfigError::DataDirCreate {
            path: data_path.clone(),
            source: e,
        })?;

        let metadata = MetadataFile::create(
            &data_path,
            ConnectionMode::Offline,
            container_type,
            container_id,
        )?;
        let storage = OperationStorage::open(&data_path)?;
        let queue = DiskQueue::open(&data_path, config.max_segment_bytes)?;

        Ok(Self {
            data_path,
            metadata,
            storage,
            queue,
        })
    }
}

impl OperationProcessor for OfflineProcessor {
    fn process(&self, op: Operation) -> Result<(), ProcessorError> {
        self.queue.put(op)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), ProcessorError> {
        self.queue.flush()?;
        Ok(())
    }

    /// Flushes and closes the queue and metadata, but leaves the `DataPath`
    /// on disk: an offline run's whole point is that its operations outlive
    /// this process, to be drained later by an `Async` processor pointed at
    /// the same directory.
    fn stop(&self, _timeout: Duration) -> Result<(), ProcessorError> {
        self.queue.close()?;
        self.storage.close()?;
        self.metadata.close()?;
        Ok(())
    }

    fn data_path(&self) -> &Path {
        &self.data_path
    }
}
