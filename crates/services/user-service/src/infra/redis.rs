//! Redis connection shared by the result cache and the filter stores.

use redis::{aio::ConnectionManager, Client, RedisError};

/// Open a managed connection that reconnects on its own after failures.
pub async fn connect(url: &str) -> Result<ConnectionManager, RedisError> {
    let client = Client::open(url)?;
    let connection = ConnectionManager::new(client).await?;
    tracing::info!("Redis connected");
    Ok(connection)
}
