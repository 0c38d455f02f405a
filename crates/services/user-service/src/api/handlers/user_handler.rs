//! User management handlers.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, patch},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use common::AppResult;
use domain::{Identifier, UserResponse, UserRole};

use crate::api::extractors::ValidatedJson;
use crate::api::state::AppState;

/// Profile update request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    /// New display name
    #[validate(length(min = 1, max = 100, message = "Full name must be 1-100 characters"))]
    #[schema(example = "Jane Doe")]
    pub full_name: String,
}

/// Role change request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRoleRequest {
    /// One of admin, editor, viewer
    #[validate(length(min = 1, message = "Role is required"))]
    #[schema(example = "editor")]
    pub role: String,
}

/// Create user routes
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/all", get(list_users))
        .route(
            "/:username",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/:username/role", patch(update_role))
}

/// List all users
#[utoipa::path(
    get,
    path = "/users/all",
    tag = "Users",
    responses(
        (status = 200, description = "List of all users", body = Vec<UserResponse>)
    )
)]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    let users = state.user_service.list_users().await?;
    Ok(Json(users))
}

/// Get a user profile
#[utoipa::path(
    get,
    path = "/users/{username}",
    tag = "Users",
    params(
        ("username" = String, Path, description = "Username")
    ),
    responses(
        (status = 200, description = "User profile", body = UserResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<UserResponse>> {
    let username = Identifier::username(&username)?;
    let user = state.user_service.get_profile(&username).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Update a user's display name
#[utoipa::path(
    patch,
    path = "/users/{username}",
    tag = "Users",
    params(
        ("username" = String, Path, description = "Username")
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Validation error"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let username = Identifier::username(&username)?;
    let user = state.user_service.update_user(&username, req.full_name).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Change a user's role
#[utoipa::path(
    patch,
    path = "/users/{username}/role",
    tag = "Users",
    params(
        ("username" = String, Path, description = "Username")
    ),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserResponse),
        (status = 400, description = "Unknown role"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_role(
    State(state): State<AppState>,
    Path(username): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> AppResult<Json<UserResponse>> {
    let username = Identifier::username(&username)?;
    let role: UserRole = req.role.parse()?;
    let user = state.user_service.update_role(&username, role).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Permanently delete a user
#[utoipa::path(
    delete,
    path = "/users/{username}",
    tag = "Users",
    params(
        ("username" = String, Path, description = "Username")
    ),
    responses(
        (status = 200, description = "Deleted user", body = UserResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<UserResponse>> {
    let username = Identifier::username(&username)?;
    let user = state.user_service.delete_user(&username).await?;
    Ok(Json(UserResponse::from(user)))
}
