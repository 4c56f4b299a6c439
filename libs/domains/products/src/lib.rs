//! Products Domain
//!
//! Catalog CRUD over a relational store with a Redis cache in front, plus the inventory
//! workers that reserve and release stock on behalf of order services.
//!
//! # Architecture
//!
//! ```text
//! Handlers                InventoryProcessor     ← HTTP requests / stream requests
//!    │                            │
//! CatalogService ──────▶ InventoryAdjuster       ← CRUD and stock rules
//!    │                            │
//! ProductRepository  +  CatalogCache             ← store (source of truth) and cache
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_products::{
//!     CacheConfig, CatalogService, PgProductRepository, RedisProductCache, handlers,
//! };
//!
//! let repository = PgProductRepository::new(db);
//! let cache = RedisProductCache::new(redis, &CacheConfig::default());
//! let service = CatalogService::new(repository, cache);
//!
//! let router = handlers::router(service);
//! ```

pub mod cache;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod inventory;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;
pub mod streams;

// Re-export commonly used types
pub use cache::{
    ALL_PRODUCTS_KEY, CacheConfig, CatalogCache, InMemoryProductCache, ProductCache,
    RedisProductCache, product_key,
};
pub use error::{ProductError, ProductResult};
pub use handlers::ApiDoc;
pub use inventory::{
    AdjustmentOutcome, InventoryAdjuster, InventoryChannel, InventoryProcessor, InventoryReply,
    InventoryRequest,
};
pub use models::{CreateProduct, Product, UpdateProduct};
pub use postgres::PgProductRepository;
pub use repository::{InMemoryProductRepository, ProductRepository, StockAdjustment};
pub use service::CatalogService;
pub use streams::{OrderCreatedStream, OrderDeletedStream, OrderUpdatedStream};
