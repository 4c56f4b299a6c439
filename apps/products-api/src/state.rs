//! Application state management

use database::redis::ConnectionManager;
use domain_products::{CatalogService, PgProductRepository, RedisProductCache};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;

pub type ProductCatalog = CatalogService<PgProductRepository, RedisProductCache>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DatabaseConnection,
    pub redis: ConnectionManager,
    pub catalog: Arc<ProductCatalog>,
}

impl AppState {
    pub fn new(config: Config, db: DatabaseConnection, redis: ConnectionManager) -> Self {
        let catalog = CatalogService::new(
            PgProductRepository::new(db.clone()),
            RedisProductCache::new(redis.clone(), &config.cache),
        );

        Self {
            config,
            db,
            redis,
            catalog: Arc::new(catalog),
        }
    }
}
