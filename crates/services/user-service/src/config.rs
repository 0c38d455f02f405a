//! User service configuration.

use std::env;
use std::str::FromStr;

use common::{CacheConfig, DatabaseConfig, FilterBackend, FilterConfig, ServiceConfig};

/// User service configuration, assembled from environment variables.
#[derive(Debug, Clone, Default)]
pub struct UserServiceConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub filter: FilterConfig,
}

impl UserServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to defaults; unparsable values are logged
    /// and also fall back.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            service: ServiceConfig {
                host: env::var("USER_SERVICE_HOST").unwrap_or(defaults.service.host),
                port: parsed("USER_SERVICE_PORT", defaults.service.port),
            },
            database: DatabaseConfig {
                url: env::var("USER_SERVICE_DATABASE_URL")
                    .or_else(|_| env::var("DATABASE_URL"))
                    .unwrap_or(defaults.database.url),
                max_connections: parsed("DATABASE_MAX_CONNECTIONS", defaults.database.max_connections),
                min_connections: parsed("DATABASE_MIN_CONNECTIONS", defaults.database.min_connections),
            },
            cache: CacheConfig {
                url: env::var("USER_SERVICE_REDIS_URL")
                    .or_else(|_| env::var("REDIS_URL"))
                    .unwrap_or(defaults.cache.url),
                key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(defaults.cache.key_prefix),
            },
            filter: FilterConfig {
                backend: parsed::<FilterBackend>("FILTER_BACKEND", defaults.filter.backend),
                username_key: env::var("USERNAME_FILTER_KEY").unwrap_or(defaults.filter.username_key),
                email_key: env::var("EMAIL_FILTER_KEY").unwrap_or(defaults.filter.email_key),
                capacity: parsed("FILTER_CAPACITY", defaults.filter.capacity),
                error_rate: parsed("FILTER_ERROR_RATE", defaults.filter.error_rate),
                timeout_ms: parsed("FILTER_TIMEOUT_MS", defaults.filter.timeout_ms),
                init_attempts: parsed("FILTER_INIT_ATTEMPTS", defaults.filter.init_attempts),
                init_backoff_ms: parsed("FILTER_INIT_BACKOFF_MS", defaults.filter.init_backoff_ms),
            },
        }
    }

    /// Address the HTTP server binds to.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.service.host, self.service.port)
    }
}

/// Read and parse an environment variable, keeping `default` when it is
/// unset or malformed.
fn parsed<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            tracing::warn!(variable = name, value = %raw, error = %e, "Ignoring invalid configuration value");
            default
        }),
        Err(_) => default,
    }
}
