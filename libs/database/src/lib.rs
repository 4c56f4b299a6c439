//! Connectors for the catalog's backing stores.
//!
//! # Features
//!
//! - `postgres` (default): SeaORM pool, migrations runner, `SELECT 1` health check
//! - `redis` (default): `ConnectionManager` with `PING` health check
//! - `config`: `core_config::FromEnv` for both config types
//!
//! ```ignore
//! use database::{postgres, redis};
//!
//! let db = postgres::connect_from_config_with_retry(pg_config, None).await?;
//! postgres::run_migrations::<migration::Migrator>(&db, "products-api").await?;
//! let cache = redis::connect_from_config_with_retry(&redis_config, None).await?;
//! ```

pub mod common;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;

pub use common::{DatabaseError, DatabaseResult};
