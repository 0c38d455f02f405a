//! Health check handler.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::state::AppState;
use crate::filter::MembershipFilter;

const HEALTHY: &str = "healthy";
const UNHEALTHY: &str = "unhealthy";

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub services: ServiceStatus,
}

/// Per-dependency status
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceStatus {
    pub database: ServiceHealth,
    pub cache: ServiceHealth,
    pub username_filter: FilterHealth,
    pub email_filter: FilterHealth,
}

/// Service health with optional error message
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    fn from_result<E: std::fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self {
                status: HEALTHY.to_string(),
                error: None,
            },
            Err(e) => Self {
                status: UNHEALTHY.to_string(),
                error: Some(e.to_string()),
            },
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == HEALTHY
    }
}

/// Membership filter health
#[derive(Debug, Serialize, ToSchema)]
pub struct FilterHealth {
    #[serde(flatten)]
    pub health: ServiceHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,
    /// More items than the filter was sized for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturated: Option<bool>,
}

impl FilterHealth {
    async fn check(filter: &MembershipFilter) -> Self {
        match filter.status().await {
            Ok(info) => Self {
                health: ServiceHealth::from_result::<String>(Ok(())),
                items: Some(info.items),
                capacity: Some(info.metadata.capacity),
                saturated: Some(info.is_saturated()),
            },
            Err(e) => Self {
                health: ServiceHealth::from_result(Err(e)),
                items: None,
                capacity: None,
                saturated: None,
            },
        }
    }
}

/// Create health routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

/// Health check - verifies database, cache and filter stores
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "All dependencies healthy", body = HealthResponse),
        (status = 503, description = "At least one dependency unhealthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let (database, cache, username_filter, email_filter) = tokio::join!(
        state.database.ping(),
        state.cache.ping(),
        FilterHealth::check(state.usernames.filter()),
        FilterHealth::check(state.emails.filter()),
    );

    let services = ServiceStatus {
        database: ServiceHealth::from_result(database),
        cache: ServiceHealth::from_result(cache),
        username_filter,
        email_filter,
    };

    let all_healthy = services.database.is_healthy()
        && services.cache.is_healthy()
        && services.username_filter.health.is_healthy()
        && services.email_filter.health.is_healthy();

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        services,
    };

    if all_healthy {
        (StatusCode::OK, Json(response)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response)).into_response()
    }
}
