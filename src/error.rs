//! Error types for operation decoding and snapshot loading.

use thiserror::Error;

use crate::identifier::Path;

/// A remote operation that cannot be applied.
///
/// Rejected operations never touch the document.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("malformed operation payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown operation type: {0:?}")]
    UnknownKind(String),

    #[error("operation is missing field `{0}`")]
    MissingField(&'static str),

    #[error("insert must carry exactly one character, got {0:?}")]
    InvalidChar(String),

    #[error("operation path is empty")]
    EmptyPath,

    #[error("operation targets unassigned identifier at {0}")]
    SentinelTarget(Path),

    #[error("operation path {0} lies outside the document bounds")]
    OutOfBounds(Path),
}

/// A snapshot that does not describe a well-formed tree.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot root must not carry an id")]
    RootHasId,

    #[error("node at depth {depth} has no id")]
    MissingId { depth: usize },

    #[error("children of {path} are not strictly sorted")]
    UnsortedChildren { path: Path },

    #[error("node {path} holds {value:?}, expected at most one character")]
    InvalidValue { path: Path, value: String },

    #[error("node {path} records size {encoded} but holds {actual} live characters")]
    SizeMismatch {
        path: Path,
        encoded: usize,
        actual: usize,
    },

    #[error("snapshot root is missing its start or end sentinel")]
    MissingSentinels,

    #[error("node {path} lies outside the document bounds")]
    OutOfBounds { path: Path },
}
