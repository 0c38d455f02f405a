//! Domain layer - Core business entities and value objects.
//!
//! This crate contains pure domain logic with no infrastructure dependencies.
//! Identifiers are normalized here so that every layer (membership filters,
//! the record store, HTTP handlers) agrees on their canonical form.

pub mod constants;
pub mod error;
pub mod identifier;
pub mod password;
pub mod user;

pub use constants::*;
pub use error::{DomainError, DomainResult};
pub use identifier::{Identifier, IdentifierKind};
pub use password::Password;
pub use user::{NewUser, User, UserPatch, UserResponse, UserRole};
