//! Container-backed test infrastructure shared by the catalog crates.
//!
//! - `TestDatabase`: PostgreSQL 18 with the catalog migrations applied (feature `postgres`)
//! - `TestRedis`: Redis 8 with a ready `ConnectionManager` (feature `redis`)
//! - `TestDataBuilder`: deterministic names and ids derived from the test name
//!
//! ```rust,ignore
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! async fn creates_product() {
//!     let db = TestDatabase::new().await;
//!     let data = TestDataBuilder::from_test_name("creates_product");
//!     let repo = PgProductRepository::new(db.connection());
//!     let name = data.name("product", "widget");
//! }
//! ```

use uuid::Uuid;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

/// Seeded generator so a test produces the same data on every run.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed from a hash of `name`, normally the test function's name.
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// A deterministic UUID, distinct per `index`.
    pub fn uuid(&self, index: u64) -> Uuid {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.seed.to_le_bytes());
        bytes[8..].copy_from_slice(&index.to_le_bytes());
        Uuid::from_bytes(bytes)
    }

    /// `test-{prefix}-{seed}-{suffix}`
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// Stream or key name unique to this test, e.g. for reply streams.
    pub fn key(&self, prefix: &str) -> String {
        format!("{}:{}", prefix, self.seed)
    }
}
