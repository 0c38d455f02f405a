//! User Service Library
//!
//! User management over HTTP, with username and email availability answered
//! by membership filters in front of the database.

pub mod api;
pub mod cache;
pub mod config;
pub mod filter;
pub mod infra;
pub mod repository;
pub mod service;

use std::sync::Arc;

use tracing::{info, warn};

use common::{AppError, FilterBackend};
use domain::{Identifier, IdentifierKind};

use crate::api::{create_router, AppState};
use crate::cache::{CacheStore, MemoryCacheStore, RedisCacheStore, ResultCache};
use crate::config::UserServiceConfig;
use crate::filter::{FilterStore, LocalFilterStore, MembershipFilter, RedisFilterStore};
use crate::infra::Database;
use crate::repository::{UserRepository, UserStore};
use crate::service::{UniquenessValidator, UserManager};

type BoxError = Box<dyn std::error::Error>;

/// Run the HTTP server until Ctrl+C.
pub async fn run_server(config: UserServiceConfig) -> Result<(), BoxError> {
    let db = Database::connect(&config.database).await?;
    let backends = Backends::open(&config).await?;
    let repo: Arc<dyn UserRepository> = Arc::new(UserStore::new(db.get_connection()));

    // Startup aborts here if either filter cannot be provisioned
    let (username_filter, email_filter) = match config.filter.backend {
        FilterBackend::Redis => (
            MembershipFilter::initialize(IdentifierKind::Username, backends.usernames, &config.filter).await?,
            MembershipFilter::initialize(IdentifierKind::Email, backends.emails, &config.filter).await?,
        ),
        // In-process filters start empty; seed them from existing records
        FilterBackend::Memory => {
            let users = repo.list().await?;
            info!(users = users.len(), "Seeding in-process membership filters");
            (
                MembershipFilter::reprovision(
                    IdentifierKind::Username,
                    backends.usernames,
                    &config.filter,
                    stored_identifiers(IdentifierKind::Username, users.iter().map(|u| u.username.as_str())),
                )
                .await?,
                MembershipFilter::reprovision(
                    IdentifierKind::Email,
                    backends.emails,
                    &config.filter,
                    stored_identifiers(IdentifierKind::Email, users.iter().map(|u| u.email.as_str())),
                )
                .await?,
            )
        }
    };

    let usernames = Arc::new(UniquenessValidator::new(Arc::new(username_filter), repo.clone()));
    let emails = Arc::new(UniquenessValidator::new(Arc::new(email_filter), repo.clone()));
    let cache = ResultCache::new(backends.cache);

    let user_service = Arc::new(UserManager::new(
        repo,
        usernames.clone(),
        emails.clone(),
        cache.clone(),
    ));
    let state = AppState::new(user_service, usernames, emails, cache, Arc::new(db));
    let app = create_router(state);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("User service listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal, draining connections...");
        })
        .await?;

    info!("User service stopped");
    Ok(())
}

/// Run migrations (for CLI commands).
pub async fn run_migrations(config: UserServiceConfig, action: MigrateAction) -> Result<(), BoxError> {
    let db = Database::connect_without_migrations(&config.database).await?;

    match action {
        MigrateAction::Up => {
            db.run_migrations().await?;
            info!("Migrations applied successfully");
        }
        MigrateAction::Down => {
            db.rollback_migration().await?;
            info!("Rolled back last migration");
        }
        MigrateAction::Status => {
            let status = db.migration_status().await?;
            for (name, applied) in status {
                let marker = if applied { "[x]" } else { "[ ]" };
                println!("{} {}", marker, name);
            }
        }
        MigrateAction::Fresh => {
            db.fresh_migrations().await?;
            info!("Database reset and migrations applied");
        }
    }

    Ok(())
}

/// Migration action type.
#[derive(Debug, Clone, Copy)]
pub enum MigrateAction {
    Up,
    Down,
    Status,
    Fresh,
}

/// Filter maintenance action type.
#[derive(Debug, Clone, Copy)]
pub enum FilterAction {
    /// Print layout, item count and saturation of both filters
    Status,
    /// Re-provision both filters from the users table
    Rebuild,
}

/// Run filter maintenance (for CLI commands).
pub async fn run_filter_command(config: UserServiceConfig, action: FilterAction) -> Result<(), BoxError> {
    if config.filter.backend == FilterBackend::Memory {
        return Err(AppError::validation(
            "filter maintenance needs FILTER_BACKEND=redis; in-memory filters live inside the server process",
        )
        .into());
    }
    let backends = Backends::open(&config).await?;

    match action {
        FilterAction::Status => {
            for (kind, store, key) in [
                (IdentifierKind::Username, &backends.usernames, &config.filter.username_key),
                (IdentifierKind::Email, &backends.emails, &config.filter.email_key),
            ] {
                match store.probe().await? {
                    Some(info) => println!(
                        "{} filter '{}': {} items / {} capacity, m={} k={}, target p={}, estimated p={:.6}, saturated={}, created {}",
                        kind,
                        key,
                        info.items,
                        info.metadata.capacity,
                        info.metadata.params.bits,
                        info.metadata.params.hashes,
                        info.metadata.error_rate,
                        info.estimated_error_rate(),
                        info.is_saturated(),
                        info.metadata.created_at.to_rfc3339(),
                    ),
                    None => println!("{} filter '{}': not provisioned", kind, key),
                }
            }
        }
        FilterAction::Rebuild => {
            let db = Database::connect_without_migrations(&config.database).await?;
            let users = UserStore::new(db.get_connection()).list().await?;
            info!(users = users.len(), "Rebuilding membership filters");

            let usernames = stored_identifiers(IdentifierKind::Username, users.iter().map(|u| u.username.as_str()));
            let emails = stored_identifiers(IdentifierKind::Email, users.iter().map(|u| u.email.as_str()));

            MembershipFilter::reprovision(IdentifierKind::Username, backends.usernames, &config.filter, usernames)
                .await?;
            MembershipFilter::reprovision(IdentifierKind::Email, backends.emails, &config.filter, emails).await?;
        }
    }

    Ok(())
}

/// Identifiers as stored. Rows written under older format rules are still
/// loaded; only empty values are skipped.
fn stored_identifiers<'a>(kind: IdentifierKind, values: impl Iterator<Item = &'a str>) -> Vec<Identifier> {
    values
        .filter_map(|value| match Identifier::from_stored(kind, value) {
            Ok(identifier) => Some(identifier),
            Err(e) => {
                warn!(%kind, error = %e, "Skipping empty stored identifier while loading filter");
                None
            }
        })
        .collect()
}

/// Filter and cache stores for the configured backend.
struct Backends {
    usernames: Arc<dyn FilterStore>,
    emails: Arc<dyn FilterStore>,
    cache: Arc<dyn CacheStore>,
}

impl Backends {
    async fn open(config: &UserServiceConfig) -> Result<Self, redis::RedisError> {
        match config.filter.backend {
            FilterBackend::Redis => {
                let connection = infra::redis::connect(&config.cache.url).await?;
                Ok(Self {
                    usernames: Arc::new(RedisFilterStore::new(connection.clone(), &config.filter.username_key)),
                    emails: Arc::new(RedisFilterStore::new(connection.clone(), &config.filter.email_key)),
                    cache: Arc::new(RedisCacheStore::new(connection, &config.cache.key_prefix)),
                })
            }
            FilterBackend::Memory => {
                warn!("Using in-process filters and cache; state is not shared and is lost on restart");
                Ok(Self {
                    usernames: Arc::new(LocalFilterStore::new()),
                    emails: Arc::new(LocalFilterStore::new()),
                    cache: Arc::new(MemoryCacheStore::new()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_identifiers_keep_legacy_values() {
        let loaded = stored_identifiers(
            IdentifierKind::Username,
            ["alice", "Not Valid Today", "", "bob"].into_iter(),
        );
        let values: Vec<_> = loaded.iter().map(|id| id.as_str()).collect();
        assert_eq!(values, vec!["alice", "not valid today", "bob"]);
    }
}
