use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use super::RedisConfig;
use crate::common::{RetryConfig, retry_with_backoff};

/// Open a multiplexed, auto-reconnecting connection and verify it with `PING`.
pub async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Connected to Redis");
    Ok(manager)
}

/// A client for opening further dedicated connections, such as stream readers.
pub fn client_from_config(config: &RedisConfig) -> redis::RedisResult<Client> {
    Client::open(config.build_url())
}

pub async fn connect_from_config(config: &RedisConfig) -> redis::RedisResult<ConnectionManager> {
    connect(&config.build_url()).await
}

/// Connect, retrying with exponential back-off. `None` uses [`RetryConfig::default`].
pub async fn connect_from_config_with_retry(
    config: &RedisConfig,
    retry_config: Option<RetryConfig>,
) -> redis::RedisResult<ConnectionManager> {
    let url = config.build_url();
    retry_with_backoff(|| connect(&url), retry_config.unwrap_or_default()).await
}
