//! Crate-wide error taxonomy.
//!
//! This is intentionally decoupled from `anyhow` so downstream libraries
//! aren't forced to adopt `anyhow` in their own public APIs. Binaries
//! still use `anyhow` with `.context()` at I/O boundaries and convert into
//! this taxonomy (or straight to an HTTP status) only at the outermost
//! call boundary.

use std::fmt;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type, matching the taxonomy: validation errors are
/// user-recoverable and field-scoped; decoding errors are user-recoverable
/// but not field-scoped; cancellation is nobody's fault; everything else is
/// internal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A single bad field in a recognition request.
    #[error("invalid value for field '{field}': {message}")]
    Validation { field: String, message: String },

    /// Several simultaneous field violations, collected before reporting
    /// (§8 S6: a request can fail validation on more than one field at
    /// once; the caller gets both, not just the first).
    #[error("{} invalid field(s)", .0.len())]
    ValidationMulti(Vec<FieldViolation>),

    /// Audio could not be decoded or resampled. Carries one summary
    /// message; detail belongs in logs.
    #[error("audio decode failed: {0}")]
    AudioDecode(String),

    /// A URI scheme outside the configured allow-list.
    #[error("unsupported URI scheme: {scheme}")]
    UriUnsupported { scheme: String },

    /// Client disconnected or a write back to the client failed. Never
    /// logged at error level.
    #[error("call cancelled")]
    Cancelled,

    /// Empty result where one was expected, failed alignment, or anything
    /// else unexpected. Detail goes to logs; the message here stays
    /// generic.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl fmt::Display) -> Self {
        Error::Internal(message.to_string())
    }

    /// True for errors that are the caller's fault rather than ours.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. }
                | Error::ValidationMulti(_)
                | Error::AudioDecode(_)
                | Error::UriUnsupported { .. }
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<symphonia::core::errors::Error> for Error {
    fn from(err: symphonia::core::errors::Error) -> Self {
        Error::AudioDecode(err.to_string())
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Error::AudioDecode(err.to_string())
    }
}

/// One field-level violation, as surfaced alongside `INVALID_ARGUMENT`
/// responses.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl Error {
    /// Extracts a [`FieldViolation`] when this error is single-field-scoped.
    pub fn field_violation(&self) -> Option<FieldViolation> {
        match self {
            Error::Validation { field, message } => Some(FieldViolation {
                field: field.clone(),
                message: message.clone(),
            }),
            _ => None,
        }
    }

    /// Every violation this error carries, whether single or multiple.
    pub fn field_violations(&self) -> Vec<FieldViolation> {
        match self {
            Error::Validation { field, message } => vec![FieldViolation {
                field: field.clone(),
                message: message.clone(),
            }],
            Error::ValidationMulti(violations) => violations.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_client_fault() {
        let e = Error::validation("language_code", "required");
        assert!(e.is_client_fault());
        assert!(!Error::Internal("boom".into()).is_client_fault());
    }

    #[test]
    fn field_violation_extracted_only_from_validation() {
        let e = Error::validation("encoding", "unspecified");
        assert_eq!(e.field_violation().unwrap().field, "encoding");
        assert!(Error::Cancelled.field_violation().is_none());
    }

    #[test]
    fn multi_validation_carries_every_violation() {
        let e = Error::ValidationMulti(vec![
            FieldViolation {
                field: "encoding".into(),
                message: "unspecified".into(),
            },
            FieldViolation {
                field: "language_code".into(),
                message: "required".into(),
            },
        ]);
        assert!(e.is_client_fault());
        let violations = e.field_violations();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].field, "encoding");
        assert_eq!(violations[1].field, "language_code");
    }
}
