//! Domain-level constants.
//!
//! These constants define business rules and validation requirements.

// =============================================================================
// User Roles
// =============================================================================

/// Administrator role, may change roles and delete accounts
pub const ROLE_ADMIN: &str = "admin";

/// Editor role, may update profiles
pub const ROLE_EDITOR: &str = "editor";

/// Default role assigned to new users
pub const ROLE_VIEWER: &str = "viewer";

// =============================================================================
// Validation
// =============================================================================

/// Minimum password length requirement
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Username length bounds (after normalization)
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 32;

/// Upper bound for email addresses (RFC 5321 path limit)
pub const MAX_EMAIL_LENGTH: usize = 254;

// =============================================================================
// Membership Filters
// =============================================================================

/// Default expected number of identifiers per filter
pub const DEFAULT_FILTER_CAPACITY: u64 = 100_000;

/// Default target false-positive rate (1%)
pub const DEFAULT_FILTER_ERROR_RATE: f64 = 0.01;

/// Default filter key for usernames
pub const DEFAULT_USERNAME_FILTER_KEY: &str = "usernames_bloom_filter";

/// Default filter key for email addresses
pub const DEFAULT_EMAIL_FILTER_KEY: &str = "emails_bloom_filter";
