//! Stock adjustments driven by order messages.
//!
//! Order creation and amendment reserve stock; order cancellation releases it. Each request
//! arrives on its own stream and is answered with a reply carrying a success flag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stream_worker::{StreamJob, StreamProcessor, StreamReply};
use strum::Display;
use tracing::{error, info, instrument, warn};

use crate::cache::{CatalogCache, ProductCache};
use crate::error::{ProductError, ProductResult};
use crate::models::Product;
use crate::repository::{ProductRepository, StockAdjustment};

/// Result of a reserve or release.
#[derive(Debug, Clone, PartialEq)]
pub enum AdjustmentOutcome {
    /// Stock was changed; carries the updated product.
    Adjusted(Product),
    /// Not enough stock to reserve; carries the unchanged product.
    InsufficientStock(Product),
    NotFound,
}

impl AdjustmentOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Adjusted(_))
    }

    pub fn product(&self) -> Option<&Product> {
        match self {
            Self::Adjusted(product) | Self::InsufficientStock(product) => Some(product),
            Self::NotFound => None,
        }
    }
}

/// Applies stock changes to the store and re-syncs both cache entries.
pub struct InventoryAdjuster<R: ProductRepository, C: ProductCache> {
    repository: Arc<R>,
    cache: CatalogCache<C>,
}

impl<R: ProductRepository, C: ProductCache> Clone for InventoryAdjuster<R, C> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            cache: self.cache.clone(),
        }
    }
}

impl<R: ProductRepository, C: ProductCache> InventoryAdjuster<R, C> {
    pub fn new(repository: Arc<R>, cache: CatalogCache<C>) -> Self {
        Self { repository, cache }
    }

    /// Take `quantity` units out of stock if at least that many are on hand.
    #[instrument(skip(self))]
    pub async fn reserve(&self, product_id: &str, quantity: i32) -> ProductResult<AdjustmentOutcome> {
        let delta = -checked_quantity(quantity)?;
        self.adjust(product_id, delta).await
    }

    /// Put `quantity` units back into stock.
    #[instrument(skip(self))]
    pub async fn release(&self, product_id: &str, quantity: i32) -> ProductResult<AdjustmentOutcome> {
        let delta = checked_quantity(quantity)?;
        self.adjust(product_id, delta).await
    }

    async fn adjust(&self, product_id: &str, delta: i32) -> ProductResult<AdjustmentOutcome> {
        match self.repository.adjust_stock(product_id, delta).await? {
            StockAdjustment::Applied(product) => {
                self.cache.put_product(&product).await;
                self.cache.replace_in_collection(&product).await;
                info!(
                    product_id = %product.id,
                    delta,
                    quantity_in_stock = product.quantity_in_stock,
                    "Adjusted stock"
                );
                Ok(AdjustmentOutcome::Adjusted(product))
            }
            StockAdjustment::Insufficient(product) => {
                self.cache.put_product(&product).await;
                info!(
                    product_id = %product.id,
                    requested = -delta,
                    quantity_in_stock = product.quantity_in_stock,
                    "Insufficient stock"
                );
                Ok(AdjustmentOutcome::InsufficientStock(product))
            }
            StockAdjustment::Missing => {
                info!(product_id, "Stock adjustment for unknown product");
                Ok(AdjustmentOutcome::NotFound)
            }
        }
    }
}

fn checked_quantity(quantity: i32) -> ProductResult<i32> {
    if quantity < 0 {
        return Err(ProductError::Validation(format!(
            "Quantity must not be negative: {}",
            quantity
        )));
    }
    Ok(quantity)
}

/// Payload of every inventory request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRequest {
    #[serde(alias = "id")]
    pub product_id: String,
    pub quantity: i32,
}

impl StreamJob for InventoryRequest {
    fn job_id(&self) -> String {
        self.product_id.clone()
    }
}

/// Reply body. Order-created requests get the product name back; the others only the flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InventoryReply {
    Created { name: String, success: bool },
    Adjusted { success: bool },
}

impl StreamReply for InventoryReply {
    fn succeeded(&self) -> bool {
        match self {
            Self::Created { success, .. } | Self::Adjusted { success } => *success,
        }
    }
}

/// The request stream a processor answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum InventoryChannel {
    Create,
    Update,
    Delete,
}

impl InventoryChannel {
    fn reply(&self, product: Option<&Product>, success: bool) -> InventoryReply {
        match self {
            Self::Create => InventoryReply::Created {
                name: product.map(|p| p.name.clone()).unwrap_or_default(),
                success,
            },
            Self::Update | Self::Delete => InventoryReply::Adjusted { success },
        }
    }
}

/// Answers the requests of one [`InventoryChannel`].
pub struct InventoryProcessor<R: ProductRepository, C: ProductCache> {
    adjuster: InventoryAdjuster<R, C>,
    channel: InventoryChannel,
}

impl<R: ProductRepository, C: ProductCache> InventoryProcessor<R, C> {
    pub fn new(adjuster: InventoryAdjuster<R, C>, channel: InventoryChannel) -> Self {
        Self { adjuster, channel }
    }

    pub fn channel(&self) -> InventoryChannel {
        self.channel
    }
}

#[async_trait]
impl<R, C> StreamProcessor<InventoryRequest> for InventoryProcessor<R, C>
where
    R: ProductRepository + 'static,
    C: ProductCache + 'static,
{
    type Reply = InventoryReply;

    async fn process(&self, job: InventoryRequest) -> InventoryReply {
        let result = match self.channel {
            InventoryChannel::Create | InventoryChannel::Update => {
                self.adjuster.reserve(&job.product_id, job.quantity).await
            }
            InventoryChannel::Delete => self.adjuster.release(&job.product_id, job.quantity).await,
        };

        match result {
            Ok(outcome) => self.channel.reply(outcome.product(), outcome.succeeded()),
            Err(ProductError::Validation(msg)) => {
                warn!(product_id = %job.product_id, channel = %self.channel, %msg, "Rejected inventory request");
                self.channel.reply(None, false)
            }
            Err(e) => {
                error!(
                    product_id = %job.product_id,
                    channel = %self.channel,
                    error = %e,
                    "Inventory request failed"
                );
                self.channel.reply(None, false)
            }
        }
    }

    fn rejected(&self) -> InventoryReply {
        self.channel.reply(None, false)
    }

    fn name(&self) -> &'static str {
        match self.channel {
            InventoryChannel::Create => "inventory-create",
            InventoryChannel::Update => "inventory-update",
            InventoryChannel::Delete => "inventory-delete",
        }
    }
}
