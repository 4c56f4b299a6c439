//! Inventory stream workers

use database::redis::{Client, ConnectionManager};
use domain_products::{
    CatalogService, InventoryChannel, InventoryProcessor, InventoryRequest, OrderCreatedStream,
    OrderDeletedStream, OrderUpdatedStream, ProductCache, ProductRepository,
};
use stream_worker::{StreamDef, StreamError, StreamWorker, WorkerConfig};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::info;

use crate::config::InventoryConfig;

fn worker_config<S: StreamDef>(config: &InventoryConfig) -> WorkerConfig {
    WorkerConfig::from_stream_def::<S>()
        .with_batch_size(config.batch_size)
        .with_blocking(Some(config.block_ms))
        .with_max_concurrent_jobs(config.max_concurrent_jobs)
}

async fn spawn_worker<S, R, C>(
    workers: &mut JoinSet<Result<(), StreamError>>,
    client: &Client,
    redis: &ConnectionManager,
    catalog: &CatalogService<R, C>,
    channel: InventoryChannel,
    config: &InventoryConfig,
    shutdown: &watch::Receiver<bool>,
) -> Result<(), StreamError>
where
    S: StreamDef,
    R: ProductRepository + 'static,
    C: ProductCache + 'static,
{
    let worker = StreamWorker::<InventoryRequest, _>::connect(
        client.clone(),
        redis.clone(),
        InventoryProcessor::new(catalog.inventory(), channel),
        worker_config::<S>(config),
    )
    .await?;
    let shutdown = shutdown.clone();

    info!(stream = S::STREAM_NAME, channel = %channel, "Spawning inventory worker");
    workers.spawn(async move { worker.run(shutdown).await });
    Ok(())
}

/// Start one consumer loop per inventory stream.
///
/// Every loop reads through its own connection opened from `client`, so its blocking
/// `XREADGROUP` never holds up the cache traffic on `redis`. Replies and acknowledgements go
/// through `redis`. Each loop stops reading once `shutdown` flips to `true` and returns after
/// its in-flight messages finish.
pub async fn spawn_inventory_workers<R, C>(
    client: &Client,
    redis: &ConnectionManager,
    catalog: &CatalogService<R, C>,
    config: &InventoryConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinSet<Result<(), StreamError>>, StreamError>
where
    R: ProductRepository + 'static,
    C: ProductCache + 'static,
{
    let mut workers = JoinSet::new();
    spawn_worker::<OrderCreatedStream, _, _>(
        &mut workers,
        client,
        redis,
        catalog,
        InventoryChannel::Create,
        config,
        &shutdown,
    )
    .await?;
    spawn_worker::<OrderUpdatedStream, _, _>(
        &mut workers,
        client,
        redis,
        catalog,
        InventoryChannel::Update,
        config,
        &shutdown,
    )
    .await?;
    spawn_worker::<OrderDeletedStream, _, _>(
        &mut workers,
        client,
        redis,
        catalog,
        InventoryChannel::Delete,
        config,
        &shutdown,
    )
    .await?;
    Ok(workers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_from_inventory_settings() {
        let config = InventoryConfig {
            enabled: true,
            batch_size: 25,
            max_concurrent_jobs: 3,
            block_ms: 750,
        };

        let worker = worker_config::<OrderDeletedStream>(&config);
        assert_eq!(worker.stream_name, "delete-queue");
        assert_eq!(worker.consumer_group, "product-inventory");
        assert_eq!(worker.batch_size, 25);
        assert_eq!(worker.max_concurrent_jobs, 3);
        assert_eq!(worker.blocking_timeout_ms, Some(750));
    }

    #[test]
    fn test_reader_timeout_outlives_default_block() {
        let config = InventoryConfig::default();
        let worker = worker_config::<OrderCreatedStream>(&config);

        let timeout = worker.read_response_timeout().unwrap();
        assert!(timeout > std::time::Duration::from_millis(config.block_ms));
    }
}
