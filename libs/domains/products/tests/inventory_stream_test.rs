//! Request/reply round trips through the inventory streams on a real Redis.

use async_trait::async_trait;
use domain_products::*;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use stream_worker::{
    StreamConsumer, StreamJob, StreamProcessor, StreamProducer, StreamWorker, WorkerConfig,
};
use test_utils::{TestDataBuilder, TestRedis};
use tokio::sync::watch;

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

type Service = CatalogService<InMemoryProductRepository, InMemoryProductCache>;

async fn seeded_service() -> (Service, Product) {
    let service = CatalogService::new(InMemoryProductRepository::new(), InMemoryProductCache::new());
    let product = service
        .create(CreateProduct {
            name: "Widget".to_string(),
            description: String::new(),
            price: Decimal::new(1000, 2),
            quantity_in_stock: 5,
        })
        .await
        .unwrap();
    (service, product)
}

/// Runs the wrapped processor, then dies on the first delivery before the ACK can happen.
struct DiesAfterFirstAdjustment<P> {
    inner: P,
    calls: AtomicUsize,
}

impl<P> DiesAfterFirstAdjustment<P> {
    fn new(inner: P) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl<J, P> StreamProcessor<J> for DiesAfterFirstAdjustment<P>
where
    J: StreamJob,
    P: StreamProcessor<J>,
{
    type Reply = <P as StreamProcessor<J>>::Reply;

    async fn process(&self, job: J) -> Self::Reply {
        let reply = self.inner.process(job).await;
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("worker died before acknowledging");
        }
        reply
    }

    fn rejected(&self) -> Self::Reply {
        self.inner.rejected()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

fn worker_config<S: stream_worker::StreamDef>() -> WorkerConfig {
    WorkerConfig::from_stream_def::<S>()
        .with_blocking(Some(200))
        .with_max_concurrent_jobs(4)
}

#[tokio::test]
async fn test_reserve_and_release_over_streams() {
    let redis = TestRedis::new().await;
    let builder = TestDataBuilder::from_test_name("reserve_and_release_over_streams");
    let reply_to = builder.key("order-replies");
    let (service, product) = seeded_service().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let create_worker = StreamWorker::<InventoryRequest, _>::connect(
        redis.client(),
        redis.connection(),
        InventoryProcessor::new(service.inventory(), InventoryChannel::Create),
        worker_config::<OrderCreatedStream>(),
    )
    .await
    .unwrap();
    let delete_worker = StreamWorker::<InventoryRequest, _>::connect(
        redis.client(),
        redis.connection(),
        InventoryProcessor::new(service.inventory(), InventoryChannel::Delete),
        worker_config::<OrderDeletedStream>(),
    )
    .await
    .unwrap();
    let create_handle = {
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { create_worker.run(rx).await })
    };
    let delete_handle = tokio::spawn(async move { delete_worker.run(shutdown_rx).await });

    let creates = StreamProducer::from_stream_def::<OrderCreatedStream>(redis.connection());
    let deletes = StreamProducer::from_stream_def::<OrderDeletedStream>(redis.connection());

    let request = InventoryRequest {
        product_id: product.id.clone(),
        quantity: 3,
    };
    creates.send_request(&request, "c-1", &reply_to).await.unwrap();
    let reply: Option<InventoryReply> = creates
        .wait_for_reply(&reply_to, "c-1", REPLY_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(
        reply,
        Some(InventoryReply::Created { name: "Widget".to_string(), success: true })
    );

    let request = InventoryRequest {
        product_id: product.id.clone(),
        quantity: 5,
    };
    creates.send_request(&request, "c-2", &reply_to).await.unwrap();
    let reply: Option<InventoryReply> = creates
        .wait_for_reply(&reply_to, "c-2", REPLY_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(
        reply,
        Some(InventoryReply::Created { name: "Widget".to_string(), success: false })
    );

    let request = InventoryRequest {
        product_id: product.id.clone(),
        quantity: 4,
    };
    deletes.send_request(&request, "d-1", &reply_to).await.unwrap();
    let reply: Option<InventoryReply> = deletes
        .wait_for_reply(&reply_to, "d-1", REPLY_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(reply, Some(InventoryReply::Adjusted { success: true }));

    assert_eq!(service.get_by_id(&product.id).await.unwrap().quantity_in_stock, 6);

    shutdown_tx.send(true).unwrap();
    create_handle.await.unwrap().unwrap();
    delete_handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_malformed_request_gets_failure_reply() {
    let redis = TestRedis::new().await;
    let builder = TestDataBuilder::from_test_name("malformed_request_gets_failure_reply");
    let reply_to = builder.key("order-replies");
    let (service, product) = seeded_service().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = StreamWorker::<InventoryRequest, _>::connect(
        redis.client(),
        redis.connection(),
        InventoryProcessor::new(service.inventory(), InventoryChannel::Update),
        worker_config::<OrderUpdatedStream>(),
    )
    .await
    .unwrap();
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    let updates = StreamProducer::from_stream_def::<OrderUpdatedStream>(redis.connection());
    let negative = format!(r#"{{"productId":"{}","quantity":-2}}"#, product.id);

    updates
        .send_raw(&[
            ("job", "null"),
            ("correlation_id", "u-1"),
            ("reply_to", reply_to.as_str()),
        ])
        .await
        .unwrap();
    updates
        .send_raw(&[
            ("job", negative.as_str()),
            ("correlation_id", "u-2"),
            ("reply_to", reply_to.as_str()),
        ])
        .await
        .unwrap();

    for correlation_id in ["u-1", "u-2"] {
        let reply: Option<InventoryReply> = updates
            .wait_for_reply(&reply_to, correlation_id, REPLY_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(reply, Some(InventoryReply::Adjusted { success: false }));
    }

    assert_eq!(service.get_by_id(&product.id).await.unwrap().quantity_in_stock, 5);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reservation_is_applied_once_across_redelivery() {
    let redis = TestRedis::new().await;
    let builder = TestDataBuilder::from_test_name("reservation_applied_once");
    let reply_to = builder.key("order-replies");
    let (service, product) = seeded_service().await;
    let config = worker_config::<OrderCreatedStream>().with_consumer_id("inventory-create-1");
    let observer = StreamConsumer::new(redis.connection(), redis.connection(), config.clone());

    let creates = StreamProducer::from_stream_def::<OrderCreatedStream>(redis.connection());
    let request = InventoryRequest {
        product_id: product.id.clone(),
        quantity: 3,
    };
    creates.send_request(&request, "c-once", &reply_to).await.unwrap();

    // First delivery reserves the stock, then the worker dies before acknowledging.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = StreamWorker::<InventoryRequest, _>::connect(
        redis.client(),
        redis.connection(),
        DiesAfterFirstAdjustment::new(InventoryProcessor::new(
            service.inventory(),
            InventoryChannel::Create,
        )),
        config.clone(),
    )
    .await
    .unwrap();
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    let deadline = Instant::now() + REPLY_TIMEOUT;
    while service.get_by_id(&product.id).await.unwrap().quantity_in_stock != 2 {
        assert!(Instant::now() < deadline, "reservation was never applied");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(observer.pending_ids(10).await.unwrap().len(), 1);

    // A restarted worker re-reads the unacknowledged entry without reserving again.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = StreamWorker::<InventoryRequest, _>::connect(
        redis.client(),
        redis.connection(),
        InventoryProcessor::new(service.inventory(), InventoryChannel::Create),
        config,
    )
    .await
    .unwrap();
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    let deadline = Instant::now() + REPLY_TIMEOUT;
    while !observer.pending_ids(10).await.unwrap().is_empty() {
        assert!(Instant::now() < deadline, "entry was never acknowledged");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(service.get_by_id(&product.id).await.unwrap().quantity_in_stock, 2);
}
