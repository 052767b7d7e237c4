//! `OperationStorage`: the `upload_path/` directory, a sibling of the
//! `DiskQueue`'s segments, holding auxiliary files (blobs referenced by
//! `UploadFile` operations) staged for later upload.
//!
//! This is a thin handle, not a second storage engine — it exists so
//! `DataPath` layout (§4.2) has one obvious owner of the subdirectory name
//! rather than every processor hardcoding `"upload_path"` inline.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::QueueError;

const UPLOAD_PATH_DIR: &str = "upload_path";

pub(crate) struct OperationStorage {
    dir: PathBuf,
}

impl OperationStorage {
    pub(crate) fn open(data_path: &Path) -> Result<Self, QueueError> {
        let dir = data_path.join(UPLOAD_PATH_DIR);
        fs::create_dir_all(&dir).map_err(|e| QueueError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// No-op: the directory itself needs no flushing, only the `DiskQueue`
    /// rooted inside it does.
    pub(crate) fn flush(&self) -> Result<(), QueueError> {
        Ok(())
    }

    pub(crate) fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }

    /// Recursively removes `upload_path/` and everything under it.
    pub(crate) fn cleanup(&self) -> Result<(), QueueError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QueueError::io(&self.dir, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_upload_path_dir() {
        let root = tempdir().unwrap();
        let storage = OperationStorage::open(root.path()).unwrap();
        assert!(storage.dir().is_dir());
        assert_eq!(storage.dir(), root.path().join(UPLOAD_PATH_DIR));
    }

    #[test]
    fn cleanup_removes_the_directory() {
        let root = tempdir().unwrap();
        let storage = OperationStorage::open(root.path()).unwrap();
        storage.cleanup().unwrap();
        assert!(!storage.dir().exists());
    }
}
