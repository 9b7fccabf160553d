//! Crate-wide error type.
//!
//! Every fallible operation returns a [`WebauthnError`]. Each variant is
//! emitted by a specific layer (config/registry validation, parsers, format
//! plugins, the audit engine, MDS lookups) and carries a human-readable
//! message.

use thiserror::Error;

/// Coarse classification of a [`WebauthnError`], for callers that want to
/// match on kind without parsing the `Display` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ArgType,
    ArgRange,
    ArgMissing,
    ArgInvalid,
    Duplicate,
    ParseError,
    ProtocolError,
    AlgMismatch,
    SigInvalid,
    TrustPath,
    AuditIncomplete,
    NoMds,
    Unsupported,
}

/// The single error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum WebauthnError {
    #[error("{0}")]
    ArgType(String),

    #[error("{0}")]
    ArgRange(String),

    #[error("{0}")]
    ArgMissing(String),

    #[error("{0}")]
    ArgInvalid(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    ParseError(String),

    #[error("{0}")]
    ProtocolError(String),

    #[error("{0}")]
    AlgMismatch(String),

    #[error("{0}")]
    SigInvalid(String),

    #[error("{0}")]
    TrustPath(String),

    #[error("{0}")]
    AuditIncomplete(String),

    #[error("{0}")]
    NoMds(String),

    #[error("{0}")]
    Unsupported(String),
}

impl WebauthnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WebauthnError::ArgType(_) => ErrorKind::ArgType,
            WebauthnError::ArgRange(_) => ErrorKind::ArgRange,
            WebauthnError::ArgMissing(_) => ErrorKind::ArgMissing,
            WebauthnError::ArgInvalid(_) => ErrorKind::ArgInvalid,
            WebauthnError::Duplicate(_) => ErrorKind::Duplicate,
            WebauthnError::ParseError(_) => ErrorKind::ParseError,
            WebauthnError::ProtocolError(_) => ErrorKind::ProtocolError,
            WebauthnError::AlgMismatch(_) => ErrorKind::AlgMismatch,
            WebauthnError::SigInvalid(_) => ErrorKind::SigInvalid,
            WebauthnError::TrustPath(_) => ErrorKind::TrustPath,
            WebauthnError::AuditIncomplete(_) => ErrorKind::AuditIncomplete,
            WebauthnError::NoMds(_) => ErrorKind::NoMds,
            WebauthnError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    /// Builds an `ArgType` error with a standard message shape:
    /// `"expected <expected>, got: <got>"`.
    pub fn arg_type(expected: impl std::fmt::Display, got: impl std::fmt::Display) -> Self {
        WebauthnError::ArgType(format!("expected {expected}, got: {got}"))
    }

    pub fn arg_range(msg: impl Into<String>) -> Self {
        WebauthnError::ArgRange(msg.into())
    }

    pub fn arg_missing(field: impl std::fmt::Display) -> Self {
        WebauthnError::ArgMissing(format!("missing required field: {field}"))
    }

    pub fn arg_invalid(msg: impl Into<String>) -> Self {
        WebauthnError::ArgInvalid(msg.into())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        WebauthnError::ParseError(msg.into())
    }

    pub fn protocol_error(msg: impl Into<String>) -> Self {
        WebauthnError::ProtocolError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, WebauthnError>;
