//! Domain-level errors.
//!
//! These errors represent business rule violations. They are independent of
//! infrastructure concerns (HTTP, database, Redis).

use thiserror::Error;

use crate::identifier::IdentifierKind;

/// Domain-specific errors for business rule violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// An identifier failed normalization or format checks
    #[error("Invalid {kind}: {reason}")]
    InvalidIdentifier {
        kind: IdentifierKind,
        reason: String,
    },

    /// Unknown role name
    #[error("Invalid role '{0}'. Must be one of: admin, editor, viewer")]
    InvalidRole(String),

    /// Password-related errors
    #[error("Password error: {0}")]
    Password(String),

    /// Internal domain error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Create an identifier error
    pub fn invalid_identifier(kind: IdentifierKind, reason: impl Into<String>) -> Self {
        DomainError::InvalidIdentifier {
            kind,
            reason: reason.into(),
        }
    }

    /// Create a password error
    pub fn password(msg: impl Into<String>) -> Self {
        DomainError::Password(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        DomainError::Internal(msg.into())
    }
}

/// Result type alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
