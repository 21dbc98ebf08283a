//! Typed errors for the sync engine.
//!
//! Adapter-level errors ([`DecodeError`], [`FetchError`]) are recoverable:
//! the orchestrator downgrades them to a per-source failure. Storage errors
//! ([`StoreError`]) are fatal for the current refresh cycle and propagate to
//! the caller unchanged.
//!
//! Transport-level errors live next to the capability traits in
//! [`crate::transport`].

use thiserror::Error;

use crate::transport::{ExecError, TransportError};

/// A provider payload was reachable but could not be turned into items.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(String),

    #[error("record is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("field '{field}' has invalid value '{value}'")]
    InvalidField { field: &'static str, value: String },
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Json(err.to_string())
    }
}

/// Why a single source adapter produced no items this cycle.
///
/// Wraps the capability's own error type so the orchestrator can classify it
/// without the adapter ever swallowing it.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("command: {0}")]
    Exec(#[from] ExecError),

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
}

/// The integrity rule a write violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Check => "check",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by [`crate::store::Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not initialized; call initialize() first")]
    NotInitialized,

    #[error("{kind} constraint violated: {message}")]
    Constraint {
        kind: ConstraintKind,
        message: String,
    },

    #[error("migration {version} ({description}) failed: {source}")]
    Migration {
        version: i64,
        description: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_constraint(&self) -> bool {
        matches!(self, StoreError::Constraint { .. })
    }

    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            StoreError::Constraint { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        if let sqlx::Error::Database(db_err) = &err {
            let kind = match db_err.kind() {
                ErrorKind::UniqueViolation => Some(ConstraintKind::Unique),
                ErrorKind::ForeignKeyViolation => Some(ConstraintKind::ForeignKey),
                ErrorKind::NotNullViolation => Some(ConstraintKind::NotNull),
                ErrorKind::CheckViolation => Some(ConstraintKind::Check),
                _ => None,
            };
            if let Some(kind) = kind {
                return StoreError::Constraint {
                    kind,
                    message: db_err.message().to_string(),
                };
            }
        }
        StoreError::Storage(err)
    }
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
