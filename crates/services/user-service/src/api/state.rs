//! Application state for dependency injection.

use std::sync::Arc;

use async_trait::async_trait;

use common::AppResult;

use crate::cache::ResultCache;
use crate::service::{UniquenessValidator, UserService};

/// Database connectivity check used by the health endpoint.
#[async_trait]
pub trait DatabaseHealth: Send + Sync {
    async fn ping(&self) -> AppResult<()>;
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<dyn UserService>,
    pub usernames: Arc<UniquenessValidator>,
    pub emails: Arc<UniquenessValidator>,
    pub cache: ResultCache,
    pub database: Arc<dyn DatabaseHealth>,
}

impl AppState {
    pub fn new(
        user_service: Arc<dyn UserService>,
        usernames: Arc<UniquenessValidator>,
        emails: Arc<UniquenessValidator>,
        cache: ResultCache,
        database: Arc<dyn DatabaseHealth>,
    ) -> Self {
        Self {
            user_service,
            usernames,
            emails,
            cache,
            database,
        }
    }
}
