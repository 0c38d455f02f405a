//! Identifier availability endpoints.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};

use common::AppResult;

use crate::api::state::AppState;
use crate::service::Availability;

/// Create validation routes
pub fn validation_routes() -> Router<AppState> {
    Router::new()
        .route("/username/:username", get(check_username))
        .route("/email/:email", get(check_email))
}

/// Check whether a username is free
#[utoipa::path(
    get,
    path = "/validation/username/{username}",
    tag = "Validation",
    params(
        ("username" = String, Path, description = "Username to check (case-insensitive)")
    ),
    responses(
        (status = 200, description = "Availability", body = Availability),
        (status = 400, description = "Malformed username"),
        (status = 503, description = "Membership filter unavailable")
    )
)]
pub async fn check_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<Availability>> {
    let availability = state.usernames.check_availability(&username).await?;
    Ok(Json(availability))
}

/// Check whether an email address is free
#[utoipa::path(
    get,
    path = "/validation/email/{email}",
    tag = "Validation",
    params(
        ("email" = String, Path, description = "Email address to check (case-insensitive)")
    ),
    responses(
        (status = 200, description = "Availability", body = Availability),
        (status = 400, description = "Malformed email address"),
        (status = 503, description = "Membership filter unavailable")
    )
)]
pub async fn check_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> AppResult<Json<Availability>> {
    let availability = state.emails.check_availability(&email).await?;
    Ok(Json(availability))
}
