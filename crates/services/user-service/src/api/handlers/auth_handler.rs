//! Signup and login handlers.

use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use common::AppResult;
use domain::{Identifier, NewUser, Password, UserResponse};

use crate::api::extractors::ValidatedJson;
use crate::api::state::AppState;

/// Signup request with validation
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    #[schema(example = "alice")]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "correct-horse-battery")]
    pub password: String,
    #[validate(length(max = 100, message = "Full name must be at most 100 characters"))]
    #[schema(example = "Alice Liddell")]
    pub full_name: Option<String>,
}

/// Login request. The identifier is read as an email when it contains `@`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username or email is required"))]
    #[schema(example = "alice")]
    pub username_or_email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "correct-horse-battery")]
    pub password: String,
}

impl LoginRequest {
    fn identifier(&self) -> AppResult<Identifier> {
        let identifier = if self.username_or_email.contains('@') {
            Identifier::email(&self.username_or_email)?
        } else {
            Identifier::username(&self.username_or_email)?
        };
        Ok(identifier)
    }
}

/// Create auth routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "Authentication",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Username or email already exists"),
        (status = 503, description = "Membership filter unavailable")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let username = Identifier::username(&req.username)?;
    let email = Identifier::email(&req.email)?;
    let password = Password::new(&req.password)?;

    let user = state
        .user_service
        .create_user(NewUser::new(username, email, password, req.full_name))
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Check credentials and return the matching user. No session or token is issued.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted", body = UserResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unknown user or wrong password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> AppResult<Json<UserResponse>> {
    let login = req.identifier()?;
    let user = state.user_service.authenticate(&login, &req.password).await?;

    Ok(Json(UserResponse::from(user)))
}
