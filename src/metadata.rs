//! `MetadataFile`: the small `metadata.json` sidecar written once per
//! `DataPath`, identifying what created it.
//!
//! Written atomically (temp file + fsync + rename + directory fsync) so a
//! reader never observes a half-written file, the same durability idiom the
//! queue's cursor files use (`queue::ledger::write_cursor_file`).

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::path::{ConnectionMode, ContainerType, UniqueId};

const METADATA_FILE_NAME: &str = "metadata.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetadataRecord {
    mode: ConnectionMode,
    #[serde(rename = "containerType")]
    container_type: ContainerType,
    #[serde(rename = "containerId")]
    container_id: UniqueId,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
}

pub(crate) struct MetadataFile {
    path: PathBuf,
}

impl MetadataFile {
    /// Writes `metadata.json` into `data_path`, which must already exist.
    pub(crate) fn create(
        data_path: &Path,
        mode: ConnectionMode,
        container_type: ContainerType,
        container_id: UniqueId,
    ) -> Result<Self, QueueError> {
        let path = data_path.join(METADATA_FILE_NAME);
        let record = MetadataRecord {
            mode,
            container_type,
            container_id,
            created_at: Utc::now(),
        };
        let path = write_atomically(&path, &record)?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// The file is written once at creation and never mutated again, so
    /// there is nothing for `flush()` to do.
    pub(crate) fn flush(&self) -> Result<(), QueueError> {
        Ok(())
    }

    pub(crate) fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }

    pub(crate) fn cleanup(&self) -> Result<(), QueueError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QueueError::io(&self.path, e)),
        }
    }
}

fn write_atomically(path: &Path, record: &MetadataRecord) -> Result<PathBuf, QueueError> {
    let dir = path.parent().expect("metadata path always has a parent");
    let tmp_path = dir.join(format!(
        "{}.tmp",
        path.file_name()
            .expect("metadata path always has a file name")
            .to_string_lossy()
    ));

    let json = serde_json::to_vec_pretty(record).map_err(|e| QueueError::Serialization {
        version: None,
        reason: e.to_string(),
    })?;
    fs::write(&tmp_path, &json).map_err(|e| QueueError::io(&tmp_path, e))?;

    let tmp_file = File::open(&tmp_path).map_err(|e| QueueError::io(&tmp_path, e))?;
    tmp_file.sync_all().map_err(|e| QueueError::io(&tmp_path, e))?;
    drop(tmp_file);

    fs::rename(&tmp_path, path).map_err(|e| QueueError::io(path, e))?;

    #[cfg(unix)]
    {
        let dir_file = File::open(dir).map_err(|e| QueueError::io(dir, e))?;
        dir_file.sync_all().map_err(|e| QueueError::io(dir, e))?;
    }

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_expected_json_shape() {
        let dir = tempdir().unwrap();
        let meta = MetadataFile::create(
            dir.path(),
            ConnectionMode::Async,
            ContainerType::Run,
            UniqueId::new("run-123"),
        )
        .unwrap();

        let contents = fs::read_to_string(meta.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["mode"], "async");
        assert_eq!(value["containerType"], "run");
        assert_eq!(value["containerId"], "run-123");
        assert!(value["createdAt"].is_string());
    }

    #[test]
    fn cleanup_removes_the_file() {
        let dir = tempdir().unwrap();
        let meta = MetadataFile::create(
            dir.path(),
            ConnectionMode::Offline,
            ContainerType::Project,
            UniqueId::new("proj-1"),
        )
        .unwrap();
        meta.cleanup().unwrap();
        assert!(!meta.path().exists());
    }
}
