use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{ProductError, ProductResult};
use crate::models::Product;

/// Result of a stock adjustment performed under the store's lock.
#[derive(Debug, Clone, PartialEq)]
pub enum StockAdjustment {
    /// The new quantity was written; carries the updated product.
    Applied(Product),
    /// A reservation exceeded the stock on hand; carries the unchanged product.
    Insufficient(Product),
    /// No product with that id.
    Missing,
}

/// Repository trait for Product persistence
///
/// The store is the only source of truth; every method acquires and releases its own
/// connection or transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// All products, oldest first
    async fn list_all(&self) -> ProductResult<Vec<Product>>;

    async fn get_by_id(&self, id: &str) -> ProductResult<Option<Product>>;

    async fn insert(&self, product: Product) -> ProductResult<Product>;

    /// Overwrite every field of an existing product; `None` when the id is unknown.
    async fn update(&self, product: Product) -> ProductResult<Option<Product>>;

    /// `true` when a row was removed.
    async fn delete(&self, id: &str) -> ProductResult<bool>;

    /// Add `delta` to the stock of `id`, checking and writing under one lock.
    async fn adjust_stock(&self, id: &str, delta: i32) -> ProductResult<StockAdjustment>;
}

/// Stock level after applying `delta`; `None` when it would drop below zero.
///
/// Fails when an increase overflows.
pub fn adjusted_quantity(current: i32, delta: i32) -> ProductResult<Option<i32>> {
    match current.checked_add(delta) {
        Some(quantity) if quantity >= 0 => Ok(Some(quantity)),
        Some(_) => Ok(None),
        None if delta < 0 => Ok(None),
        None => Err(ProductError::Validation(format!(
            "Stock overflow: {} + {}",
            current, delta
        ))),
    }
}

/// In-memory repository for tests and local runs.
///
/// Products are keyed by id; ids are UUIDv7 strings, so key order is creation order.
#[derive(Clone, Default)]
pub struct InMemoryProductRepository {
    products: Arc<RwLock<BTreeMap<String, Product>>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn list_all(&self) -> ProductResult<Vec<Product>> {
        Ok(self.products.read().await.values().cloned().collect())
    }

    async fn get_by_id(&self, id: &str) -> ProductResult<Option<Product>> {
        Ok(self.products.read().await.get(id).cloned())
    }

    async fn insert(&self, product: Product) -> ProductResult<Product> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Err(ProductError::Database(format!(
                "duplicate key: {}",
                product.id
            )));
        }
        products.insert(product.id.clone(), product.clone());
        Ok(product)
    }

    async fn update(&self, product: Product) -> ProductResult<Option<Product>> {
        let mut products = self.products.write().await;
        match products.get_mut(&product.id) {
            Some(existing) => {
                *existing = product.clone();
                Ok(Some(product))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> ProductResult<bool> {
        Ok(self.products.write().await.remove(id).is_some())
    }

    async fn adjust_stock(&self, id: &str, delta: i32) -> ProductResult<StockAdjustment> {
        let mut products = self.products.write().await;
        let Some(product) = products.get_mut(id) else {
            return Ok(StockAdjustment::Missing);
        };

        match adjusted_quantity(product.quantity_in_stock, delta)? {
            Some(quantity) => {
                product.quantity_in_stock = quantity;
                Ok(StockAdjustment::Applied(product.clone()))
            }
            None => Ok(StockAdjustment::Insufficient(product.clone())),
        }
    }
}
