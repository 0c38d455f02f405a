//! Service layer - business logic.

mod user_service;
mod validator;

pub use user_service::{UserManager, UserService};
pub use validator::{Availability, UniquenessValidator};

#[cfg(any(test, feature = "test-utils"))]
pub use user_service::MockUserService;
