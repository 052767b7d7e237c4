//! Segment file naming and enumeration.
//!
//! Segments are named `operations-<N>.log`, created in ascending order and
//! never modified after being closed (`SPEC_FULL.md` §4.1 "Segmentation").
//! The default rotation threshold mirrors the teacher's
//! `DEFAULT_MAX_DATA_FILE_SIZE`, scaled down to the spec's stated default.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

/// Default maximum size, in bytes, of one segment file before rotation.
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 64 * 1024 * 1024;

const SEGMENT_PREFIX: &str = "operations-";
const SEGMENT_SUFFIX: &str = ".log";

pub(crate) fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{SEGMENT_PREFIX}{index}{SEGMENT_SUFFIX}"))
}

/// Parses `operations-<N>.log` out of a file name, returning `None` for
/// anything that doesn't match (stray files in the data path are ignored
/// rather than treated as corruption).
pub(crate) fn parse_segment_index(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

/// Lists existing segment indices in `dir`, ascending.
pub(crate) fn list_segments(dir: &Path) -> io::Result<Vec<u64>> {
    let mut indices = Vec::new();
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(indices),
        Err(e) => return Err(e),
    };

    for entry in read_dir {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some(idx) = parse_segment_index(name) {
                indices.push(idx);
            }
        }
    }

    indices.sort_unstable();
    trace!(count = indices.len(), "listed segments");
    Ok(indices)
}
