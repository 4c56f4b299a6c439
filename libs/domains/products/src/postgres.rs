use async_trait::async_trait;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, QuerySelect, TransactionTrait,
};

use crate::{
    entity,
    error::ProductResult,
    models::Product,
    repository::{ProductRepository, StockAdjustment, adjusted_quantity},
};

pub struct PgProductRepository {
    db: DatabaseConnection,
}

impl PgProductRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn list_all(&self) -> ProductResult<Vec<Product>> {
        let models = entity::Entity::find()
            .order_by_asc(entity::Column::CreatedAt)
            .order_by_asc(entity::Column::Id)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn get_by_id(&self, id: &str) -> ProductResult<Option<Product>> {
        let model = entity::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;

        Ok(model.map(Into::into))
    }

    async fn insert(&self, product: Product) -> ProductResult<Product> {
        let active_model: entity::ActiveModel = product.into();
        let model = active_model.insert(&self.db).await?;

        tracing::info!(product_id = %model.id, "Inserted product");
        Ok(model.into())
    }

    async fn update(&self, product: Product) -> ProductResult<Option<Product>> {
        let Some(model) = entity::Entity::find_by_id(product.id.clone())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let mut active_model: entity::ActiveModel = model.into();
        active_model.name = Set(product.name);
        active_model.description = Set(product.description);
        active_model.price = Set(product.price);
        active_model.quantity_in_stock = Set(product.quantity_in_stock);
        active_model.updated_at = Set(chrono::Utc::now().into());

        let updated = active_model.update(&self.db).await?;

        tracing::info!(product_id = %updated.id, "Updated product");
        Ok(Some(updated.into()))
    }

    async fn delete(&self, id: &str) -> ProductResult<bool> {
        let result = entity::Entity::delete_by_id(id.to_string())
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            tracing::info!(product_id = %id, "Deleted product");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn adjust_stock(&self, id: &str, delta: i32) -> ProductResult<StockAdjustment> {
        let txn = self.db.begin().await?;

        // SELECT ... FOR UPDATE: concurrent adjustments of this row queue here.
        let Some(model) = entity::Entity::find_by_id(id.to_string())
            .lock_exclusive()
            .one(&txn)
            .await?
        else {
            txn.rollback().await?;
            return Ok(StockAdjustment::Missing);
        };

        let quantity = match adjusted_quantity(model.quantity_in_stock, delta) {
            Ok(Some(quantity)) => quantity,
            Ok(None) => {
                txn.rollback().await?;
                return Ok(StockAdjustment::Insufficient(model.into()));
            }
            Err(e) => {
                txn.rollback().await?;
                return Err(e);
            }
        };

        let mut active_model: entity::ActiveModel = model.into();
        active_model.quantity_in_stock = Set(quantity);
        active_model.updated_at = Set(chrono::Utc::now().into());

        let updated = active_model.update(&txn).await?;
        txn.commit().await?;

        tracing::debug!(product_id = %id, delta, quantity, "Adjusted stock");
        Ok(StockAdjustment::Applied(updated.into()))
    }
}
