//! The `Operation` data model: one immutable mutation to an attribute path.
//!
//! This is the tagged-variant replacement for the old dynamic polymorphic
//! operation class hierarchy (see `SPEC_FULL.md` §9): dispatch is a `match`
//! over `OperationPayload::type`, serialized with a `"type"` discriminator
//! field rather than relying on a class name.

use serde::{Deserialize, Serialize};

/// An ordered sequence of string segments identifying an attribute, e.g.
/// `["train", "loss"]`.
pub type AttributePath = Vec<String>;

/// One immutable mutation to an attribute on a container.
///
/// Operations are constructed by the (out-of-scope) attribute API surface and
/// handed to a processor's `process` call; the pipeline never constructs or
/// mutates one itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    #[serde(rename = "assign_float")]
    AssignFloat { path: AttributePath, value: f64 },

    #[serde(rename = "assign_string")]
    AssignString { path: AttributePath, value: String },

    #[serde(rename = "assign_bool")]
    AssignBool { path: AttributePath, value: bool },

    #[serde(rename = "log_float_series")]
    LogFloatSeries {
        path: AttributePath,
        value: f64,
        step: Option<f64>,
        timestamp: Option<f64>,
    },

    #[serde(rename = "log_string_series")]
    LogStringSeries {
        path: AttributePath,
        value: String,
        step: Option<f64>,
        timestamp: Option<f64>,
    },

    #[serde(rename = "add_strings")]
    AddStrings {
        path: AttributePath,
        values: Vec<String>,
    },

    #[serde(rename = "remove_strings")]
    RemoveStrings {
        path: AttributePath,
        values: Vec<String>,
    },

    #[serde(rename = "upload_file")]
    UploadFile {
        path: AttributePath,
        local_path: String,
    },

    #[serde(rename = "delete_attribute")]
    DeleteAttribute { path: AttributePath },
}

impl Operation {
    /// The attribute path this operation targets.
    ///
    /// The pipeline does not interpret this beyond using it for diagnostics;
    /// it does not reorder or group operations by path (see `SPEC_FULL.md`'s
    /// Non-goals).
    pub fn path(&self) -> &AttributePath {
        match self {
            Operation::AssignFloat { path, .. }
            | Operation::AssignString { path, .. }
            | Operation::AssignBool { path, .. }
            | Operation::LogFloatSeries { path, .. }
            | Operation::LogStringSeries { path, .. }
            | Operation::AddStrings { path, .. }
            | Operation::RemoveStrings { path, .. }
            | Operation::UploadFile { path, .. }
            | Operation::DeleteAttribute { path } => path,
        }
    }

    /// The `"type"` discriminator string, matching the external JSON framing.
    pub fn type_name(&self) -> &'static str {
        match self {
            Operation::AssignFloat { .. } => "assign_float",
            Operation::AssignString { .. } => "assign_string",
            Operation::AssignBool { .. } => "assign_bool",
            Operation::LogFloatSeries { .. } => "log_float_series",
            Operation::LogStringSeries { .. } => "log_string_series",
            Operation::AddStrings { .. } => "add_strings",
            Operation::RemoveStrings { .. } => "remove_strings",
            Operation::UploadFile { .. } => "upload_file",
            Operation::DeleteAttribute { .. } => "delete_attribute",
        }
    }
}

/// `(version, op)`: the unit the `DiskQueue` durably stores and the unit the
/// `Backend` acknowledges by sequence number.
///
/// `version` is assigned by the queue on enqueue and is strictly increasing
/// starting at 1, with no gaps in the durable log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedOperation {
    pub version: u64,
    pub op: Operation,
}

impl VersionedOperation {
    pub fn new(version: u64, op: Operation) -> Self {
        Self { version, op }
    }
}

/// An ordered, non-empty group of `VersionedOperation`s drained from the head
/// of a `DiskQueue`, bounded by both a maximum count and a maximum total
/// serialized byte size.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub(crate) operations: Vec<VersionedOperation>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn operations(&self) -> &[VersionedOperation] {
        &self.operations
    }

    /// The highest version present in the batch; `ack`-ing this value acks
    /// every operation in the batch, since versions are contiguous.
    pub fn highest_version(&self) -> Option<u64> {
        self.operations.last().map(|v| v.version)
    }

    pub fn into_vec(self) -> Vec<VersionedOperation> {
        self.operations
    }
}

impl IntoIterator for Batch {
    type Item = VersionedOperation;
    type IntoIter = std::vec::IntoIter<VersionedOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}
