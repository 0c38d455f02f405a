//! Unique identifier value object.
//!
//! Usernames and email addresses are stored, hashed into membership filters
//! and compared only in their normalized form: trimmed and lower-cased.
//! Constructing an [`Identifier`] is the single place that normalization
//! happens.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_EMAIL_LENGTH, MAX_USERNAME_LENGTH, MIN_USERNAME_LENGTH};
use crate::error::{DomainError, DomainResult};

/// Which unique field of a user record an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Username,
    Email,
}

impl IdentifierKind {
    /// Field label used in error messages ("Username already exists").
    pub fn label(&self) -> &'static str {
        match self {
            IdentifierKind::Username => "Username",
            IdentifierKind::Email => "Email",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Username => "username",
            IdentifierKind::Email => "email",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized unique identifier, validated unless read back from storage.
///
/// Immutable once built. Two raw inputs that differ only in case or
/// surrounding whitespace produce equal identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    kind: IdentifierKind,
    value: String,
}

impl Identifier {
    /// Normalize and validate a raw identifier.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidIdentifier`] when the normalized value is
    /// empty or violates the format rules of its kind.
    pub fn parse(kind: IdentifierKind, raw: &str) -> DomainResult<Self> {
        let value = raw.trim().to_lowercase();

        if value.is_empty() {
            return Err(DomainError::invalid_identifier(kind, "must not be empty"));
        }

        match kind {
            IdentifierKind::Username => validate_username(&value)?,
            IdentifierKind::Email => validate_email(&value)?,
        }

        Ok(Self { kind, value })
    }

    /// Normalize a value read back from the user store without applying
    /// the format rules, which may have tightened since it was written.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidIdentifier`] only when the value is
    /// empty after normalization.
    pub fn from_stored(kind: IdentifierKind, stored: &str) -> DomainResult<Self> {
        let value = stored.trim().to_lowercase();
        if value.is_empty() {
            return Err(DomainError::invalid_identifier(kind, "must not be empty"));
        }
        Ok(Self { kind, value })
    }

    /// Shorthand for `Identifier::parse(IdentifierKind::Username, raw)`.
    pub fn username(raw: &str) -> DomainResult<Self> {
        Self::parse(IdentifierKind::Username, raw)
    }

    /// Shorthand for `Identifier::parse(IdentifierKind::Email, raw)`.
    pub fn email(raw: &str) -> DomainResult<Self> {
        Self::parse(IdentifierKind::Email, raw)
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

fn validate_username(value: &str) -> DomainResult<()> {
    let len = value.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(DomainError::invalid_identifier(
            IdentifierKind::Username,
            format!(
                "must be between {} and {} characters",
                MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
            ),
        ));
    }

    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || "_.-".contains(c);
    if !value.chars().all(allowed) {
        return Err(DomainError::invalid_identifier(
            IdentifierKind::Username,
            "may only contain letters, digits, '_', '.' and '-'",
        ));
    }

    Ok(())
}

fn validate_email(value: &str) -> DomainResult<()> {
    if value.len() > MAX_EMAIL_LENGTH {
        return Err(DomainError::invalid_identifier(
            IdentifierKind::Email,
            format!("must be at most {} characters", MAX_EMAIL_LENGTH),
        ));
    }

    let mut parts = value.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !value.contains(char::is_whitespace)
        }
        _ => false,
    };

    if !valid {
        return Err(DomainError::invalid_identifier(
            IdentifierKind::Email,
            "is not a valid email address",
        ));
    }

    Ok(())
}
