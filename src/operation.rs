//! Operations exchanged between replicas.
//!
//! On the wire an operation is a JSON object tagged by `type`:
//!
//! ```text
//! {"type":"insert","path":[{"position":17,"site":"a","clock":0}],"char":"x"}
//! {"type":"delete","path":[{"position":17,"site":"a","clock":0}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::OperationError;
use crate::identifier::{Identifier, Path};

/// A single replicated edit.
///
/// Deserialization validates the payload the same way
/// [`Operation::from_json`] does, so an `Operation` embedded in a larger
/// message cannot carry an unknown kind or a multi-character insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", try_from = "RawOperation")]
pub enum Operation {
    /// Place `ch` at `path`.
    Insert {
        /// Where the character lives.
        path: Path,
        /// The character.
        #[serde(rename = "char")]
        ch: char,
    },
    /// Tombstone the character at `path`.
    Delete {
        /// Where the character lives.
        path: Path,
    },
}

impl Operation {
    /// The path this operation addresses.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Insert { path, .. } | Self::Delete { path } => path,
        }
    }

    /// Decode a wire payload.
    pub fn from_json(payload: &str) -> Result<Self, OperationError> {
        let raw: RawOperation = serde_json::from_str(payload)?;
        raw.try_into()
    }

    /// Encode as a wire payload.
    pub fn to_json(&self) -> Result<String, OperationError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Structural checks shared by every entry point.
    pub(crate) fn validate(&self) -> Result<(), OperationError> {
        let path = self.path();
        let (Some(first), Some(target)) = (path.first(), path.target()) else {
            return Err(OperationError::EmptyPath);
        };
        if target.is_unassigned() {
            return Err(OperationError::SentinelTarget(path.clone()));
        }
        // Everything must sit between the two sentinels. Nothing may hang
        // below the end sentinel, it would be laid out after it.
        let past_end = path.len() > 1 && *first == Identifier::end();
        if !path.iter().all(Identifier::is_in_bounds)
            || *first < Identifier::start()
            || *first > Identifier::end()
            || past_end
        {
            return Err(OperationError::OutOfBounds(path.clone()));
        }
        Ok(())
    }
}

/// Loosely typed operation as it arrives from the wire.
#[derive(Debug, Deserialize)]
struct RawOperation {
    #[serde(rename = "type")]
    kind: String,
    path: Option<Path>,
    #[serde(rename = "char")]
    ch: Option<String>,
}

impl TryFrom<RawOperation> for Operation {
    type Error = OperationError;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        match raw.kind.as_str() {
            "insert" => {
                let path = raw.path.ok_or(OperationError::MissingField("path"))?;
                let text = raw.ch.ok_or(OperationError::MissingField("char"))?;
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Ok(Self::Insert { path, ch }),
                    _ => Err(OperationError::InvalidChar(text)),
                }
            }
            "delete" => {
                let path = raw.path.ok_or(OperationError::MissingField("path"))?;
                Ok(Self::Delete { path })
            }
            _ => Err(OperationError::UnknownKind(raw.kind)),
        }
    }
}

/// What applying a remote operation did to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Applied {
    /// A character became visible.
    Inserted,
    /// A visible character was removed.
    Deleted,
    /// The operation was already reflected in the document.
    Duplicate,
    /// The delete arrived before its insert and was parked.
    Deferred,
    /// The insert met a parked delete; the character never appears.
    Cancelled,
}

impl Applied {
    /// Whether the visible text changed.
    #[must_use]
    pub fn changed(self) -> bool {
        matches!(self, Self::Inserted | Self::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::MAX_POSITION;

    fn path() -> Path {
        Path::from(vec![Identifier::new(17, "a", 0)])
    }

    #[test]
    fn insert_wire_format() {
        let op = Operation::Insert {
            path: path(),
            ch: 'x',
        };
        let json = op.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"type":"insert","path":[{"position":17,"site":"a","clock":0}],"char":"x"}"#
        );
        assert_eq!(Operation::from_json(&json).unwrap(), op);
    }

    #[test]
    fn delete_wire_format() {
        let op = Operation::Delete { path: path() };
        let json = op.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"type":"delete","path":[{"position":17,"site":"a","clock":0}]}"#
        );
        assert_eq!(Operation::from_json(&json).unwrap(), op);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = Operation::from_json(r#"{"type":"move","path":[]}"#).unwrap_err();
        assert!(matches!(err, OperationError::UnknownKind(kind) if kind == "move"));
    }

    #[test]
    fn missing_fields_are_rejected() {
        let err = Operation::from_json(r#"{"type":"insert","char":"x"}"#).unwrap_err();
        assert!(matches!(err, OperationError::MissingField("path")));

        let err = Operation::from_json(r#"{"type":"insert","path":[]}"#).unwrap_err();
        assert!(matches!(err, OperationError::MissingField("char")));

        let err = Operation::from_json(r#"{"path":[]}"#).unwrap_err();
        assert!(matches!(err, OperationError::Json(_)));
    }

    #[test]
    fn insert_needs_exactly_one_char() {
        let err = Operation::from_json(r#"{"type":"insert","path":[],"char":"ab"}"#).unwrap_err();
        assert!(matches!(err, OperationError::InvalidChar(text) if text == "ab"));

        let err = Operation::from_json(r#"{"type":"insert","path":[],"char":""}"#).unwrap_err();
        assert!(matches!(err, OperationError::InvalidChar(_)));
    }

    #[test]
    fn serde_deserialize_validates_too() {
        let result: Result<Operation, _> = serde_json::from_str(r#"{"type":"nope"}"#);
        assert!(result.is_err());

        let op: Operation = serde_json::from_str(r#"{"type":"delete","path":[]}"#).unwrap();
        assert_eq!(op, Operation::Delete { path: Path::new() });
    }

    #[test]
    fn validate_rejects_structural_problems() {
        let empty = Operation::Delete { path: Path::new() };
        assert!(matches!(empty.validate(), Err(OperationError::EmptyPath)));

        let sentinel = Operation::Delete {
            path: Path::from(vec![Identifier::start()]),
        };
        assert!(matches!(
            sentinel.validate(),
            Err(OperationError::SentinelTarget(_))
        ));

        let below = Operation::Delete {
            path: Path::from(vec![Identifier::new(0, "a", 0)]),
        };
        assert!(matches!(below.validate(), Err(OperationError::OutOfBounds(_))));

        let past_end = Operation::Delete {
            path: Path::from(vec![Identifier::new(MAX_POSITION, "a", 0)]),
        };
        assert!(matches!(
            past_end.validate(),
            Err(OperationError::OutOfBounds(_))
        ));

        let under_end = Operation::Delete {
            path: Path::from(vec![Identifier::end(), Identifier::new(5, "z", 0)]),
        };
        assert!(matches!(
            under_end.validate(),
            Err(OperationError::OutOfBounds(_))
        ));

        let spent_clock = Operation::Delete {
            path: Path::from(vec![Identifier::new(5, "a", u64::MAX)]),
        };
        assert!(matches!(
            spent_clock.validate(),
            Err(OperationError::OutOfBounds(_))
        ));

        let under_start = Operation::Delete {
            path: Path::from(vec![Identifier::start(), Identifier::new(9, "a", 0)]),
        };
        assert!(under_start.validate().is_ok());

        let fine = Operation::Delete { path: path() };
        assert!(fine.validate().is_ok());
    }
}
