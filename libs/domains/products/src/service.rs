use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::cache::{CatalogCache, ProductCache};
use crate::error::{ProductError, ProductResult};
use crate::inventory::InventoryAdjuster;
use crate::models::{CreateProduct, Product, UpdateProduct};
use crate::repository::ProductRepository;

/// CRUD over the catalog, keeping the per-id and collection cache entries in step with the store.
///
/// Store writes happen first; cache updates follow and never fail the operation.
pub struct CatalogService<R: ProductRepository, C: ProductCache> {
    repository: Arc<R>,
    cache: CatalogCache<C>,
}

impl<R: ProductRepository, C: ProductCache> Clone for CatalogService<R, C> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            cache: self.cache.clone(),
        }
    }
}

impl<R: ProductRepository, C: ProductCache> CatalogService<R, C> {
    pub fn new(repository: R, cache: C) -> Self {
        Self {
            repository: Arc::new(repository),
            cache: CatalogCache::new(cache),
        }
    }

    /// Stock adjuster sharing this service's store and cache.
    pub fn inventory(&self) -> InventoryAdjuster<R, C> {
        InventoryAdjuster::new(Arc::clone(&self.repository), self.cache.clone())
    }

    /// All products, served from the collection entry when present
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> ProductResult<Vec<Product>> {
        if let Some(products) = self.cache.collection().await {
            return Ok(products);
        }

        let products = self.repository.list_all().await?;
        self.cache.put_collection(&products).await;
        Ok(products)
    }

    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_by_id(&self, id: &str) -> ProductResult<Product> {
        if let Some(product) = self.cache.product(id).await {
            return Ok(product);
        }

        let product = self
            .repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| ProductError::NotFound(id.to_string()))?;

        self.cache.put_product(&product).await;
        Ok(product)
    }

    /// Create a product under a fresh UUIDv7 id
    #[instrument(skip(self, input), fields(product_name = %input.name))]
    pub async fn create(&self, input: CreateProduct) -> ProductResult<Product> {
        input
            .validate()
            .map_err(|e| ProductError::Validation(e.to_string()))?;

        let product = Product::from_create(Uuid::now_v7().to_string(), input);
        let product = self.repository.insert(product).await?;

        self.cache.put_product(&product).await;
        self.cache.append_to_collection(&product).await;

        info!(product_id = %product.id, "Created product");
        Ok(product)
    }

    /// Replace every field of an existing product
    #[instrument(skip(self, input), fields(product_id = %id))]
    pub async fn update(&self, id: &str, input: UpdateProduct) -> ProductResult<Product> {
        input
            .validate()
            .map_err(|e| ProductError::Validation(e.to_string()))?;

        let mut product = self
            .repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| ProductError::NotFound(id.to_string()))?;
        product.apply_update(input);

        let product = self
            .repository
            .update(product)
            .await?
            .ok_or_else(|| ProductError::NotFound(id.to_string()))?;

        self.cache.put_product(&product).await;
        self.cache.replace_in_collection(&product).await;

        info!(product_id = %product.id, "Updated product");
        Ok(product)
    }

    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete(&self, id: &str) -> ProductResult<bool> {
        if !self.repository.delete(id).await? {
            return Err(ProductError::NotFound(id.to_string()));
        }

        self.cache.evict_product(id).await;
        self.cache.remove_from_collection(id).await;

        info!(product_id = %id, "Deleted product");
        Ok(true)
    }
}
