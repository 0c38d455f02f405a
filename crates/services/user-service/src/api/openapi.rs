//! OpenAPI documentation.

use utoipa::OpenApi;

use crate::api::handlers::auth_handler::{LoginRequest, SignupRequest};
use crate::api::handlers::health_handler::{FilterHealth, HealthResponse, ServiceHealth, ServiceStatus};
use crate::api::handlers::user_handler::{UpdateRoleRequest, UpdateUserRequest};
use crate::service::Availability;
use domain::{UserResponse, UserRole};

/// API documentation struct.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health_handler::health_check,
        crate::api::handlers::validation_handler::check_username,
        crate::api::handlers::validation_handler::check_email,
        crate::api::handlers::auth_handler::signup,
        crate::api::handlers::auth_handler::login,
        crate::api::handlers::user_handler::list_users,
        crate::api::handlers::user_handler::get_user,
        crate::api::handlers::user_handler::update_user,
        crate::api::handlers::user_handler::update_role,
        crate::api::handlers::user_handler::delete_user,
    ),
    components(
        schemas(
            Availability,
            SignupRequest,
            LoginRequest,
            UpdateUserRequest,
            UpdateRoleRequest,
            UserResponse,
            UserRole,
            HealthResponse,
            ServiceStatus,
            ServiceHealth,
            FilterHealth,
        )
    ),
    tags(
        (name = "Health", description = "Dependency health"),
        (name = "Validation", description = "Username and email availability"),
        (name = "Authentication", description = "Signup and credential checks"),
        (name = "Users", description = "User management endpoints"),
    )
)]
pub struct ApiDoc;
