//! Configuration for Products API

use axum_helpers::JwtConfig;
use core_config::{
    AppInfo, ConfigError, Environment, FromEnv, app_info, env_flag, env_or_default, env_parse,
    server::ServerConfig,
};
use database::postgres::PostgresConfig;
use database::redis::RedisConfig;
use domain_products::CacheConfig;

/// Inventory worker settings.
///
/// - `INVENTORY_WORKER_ENABLED` (true)
/// - `INVENTORY_BATCH_SIZE` (10) - entries per `XREADGROUP`
/// - `INVENTORY_MAX_CONCURRENT` (8) - in-flight messages per stream
/// - `INVENTORY_BLOCK_MS` (5000) - `XREADGROUP BLOCK` timeout, at least 1; each worker's
///   read connection waits this long plus a margin for a response
#[derive(Clone, Debug)]
pub struct InventoryConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub max_concurrent_jobs: usize,
    pub block_ms: u64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 10,
            max_concurrent_jobs: 8,
            block_ms: 5000,
        }
    }
}

impl FromEnv for InventoryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            enabled: env_flag("INVENTORY_WORKER_ENABLED", defaults.enabled),
            batch_size: env_parse("INVENTORY_BATCH_SIZE", defaults.batch_size)?,
            max_concurrent_jobs: env_parse("INVENTORY_MAX_CONCURRENT", defaults.max_concurrent_jobs)?,
            block_ms: env_parse("INVENTORY_BLOCK_MS", defaults.block_ms)?,
        };

        if config.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid {
                key: "INVENTORY_MAX_CONCURRENT".to_string(),
                details: "must be at least 1".to_string(),
            });
        }
        if config.block_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "INVENTORY_BLOCK_MS".to_string(),
                details: "must be at least 1; 0 would block forever".to_string(),
            });
        }
        Ok(config)
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub environment: Environment,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub cache: CacheConfig,
    pub inventory: InventoryConfig,
    /// Role required by the create, update and delete routes
    pub privileged_role: String,
    pub run_migrations: bool,
}

impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            app: app_info!(),
            environment: Environment::from_env(),
            server: ServerConfig::from_env()?,
            postgres: PostgresConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            jwt: JwtConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            inventory: InventoryConfig::from_env()?,
            privileged_role: env_or_default("PRIVILEGED_ROLE", "Director"),
            run_migrations: env_flag("RUN_MIGRATIONS", true),
        })
    }
}
