//! Container identity and the per-processor `DataPath` layout scheme.
//!
//! The layout is part of the stable, cross-language on-disk contract (see
//! `SPEC_FULL.md` §6): `<root>/<mode>/<container_type>__<container_id>__<pid>__<rand8>/`.
//! The `<pid>__<rand8>` suffix is what lets two processors for the same
//! container, in the same or different processes, coexist without colliding.

use std::fmt;
use std::path::{Path, PathBuf};

use rand::Rng;

/// Opaque, ASCII identifier for a logical experiment/run/model/model_version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct UniqueId(String);

impl UniqueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UniqueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UniqueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The kind of container an `Operation` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    Run,
    Project,
    Model,
    ModelVersion,
}

impl ContainerType {
    /// The lowercase token used in `MetadataRecord` and `DataPath` segments.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerType::Run => "run",
            ContainerType::Project => "project",
            ContainerType::Model => "model",
            ContainerType::ModelVersion => "model_version",
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The processor variant a `DataPath` was created for; also the `mode` field
/// of `MetadataRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    Async,
    Sync,
    Offline,
}

impl ConnectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::Async => "async",
            ConnectionMode::Sync => "sync",
            ConnectionMode::Offline => "offline",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const RAND_SUFFIX_LEN: usize = 8;
const RAND_SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..RAND_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..RAND_SUFFIX_ALPHABET.len());
            RAND_SUFFIX_ALPHABET[idx] as char
        })
        .collect()
}

/// Resolves the per-processor directory under the configured Neptune data
/// root: `<root>/<mode>/<container_type>__<container_id>__<pid>__<rand8>/`.
///
/// Two processors constructed for the same container never collide because
/// of the trailing `<pid>__<rand8>` suffix, even within the same process
/// (two offline processors for the same run, say).
pub fn data_path(
    root: &Path,
    mode: ConnectionMode,
    container_type: ContainerType,
    container_id: &UniqueId,
) -> PathBuf {
    let pid = std::process::id();
    let suffix = random_suffix();
    root.join(mode.as_str()).join(format!(
        "{container_type}__{container_id}__{pid}__{suffix}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_path_shape() {
        let root = Path::new("/tmp/.neptune");
        let id = UniqueId::new("abcd-1234");
        let path = data_path(root, ConnectionMode::Offline, ContainerType::Run, &id);

        let rel = path.strip_prefix(root).unwrap();
        let name = rel.file_name().unwrap().to_str().unwrap();
        assert_eq!(rel.parent().unwrap(), Path::new("offline"));

        let parts: Vec<&str> = name.split("__").collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "run");
        assert_eq!(parts[1], "abcd-1234");
        assert_eq!(parts[2], std::process::id().to_string());
        assert_eq!(parts[3].len(), 8);
        assert!(parts[3].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn two_calls_never_collide() {
        let root = Path::new("/tmp/.neptune");
        let id = UniqueId::new("same-run");
        let a = data_path(root, ConnectionMode::Async, ContainerType::Run, &id);
        let b = data_path(root, ConnectionMode::Async, ContainerType::Run, &id);
        assert_ne!(a, b);
    }
}
