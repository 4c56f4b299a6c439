//! The production wiring on real Postgres and Redis: inventory workers with their default
//! settings alongside a catalog whose cache, replies and acknowledgements share one Redis
//! connection.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum_helpers::{JwtAuth, JwtConfig, RequiredRole};
use database::redis::AsyncCommands;
use domain_products::{
    CacheConfig, CatalogService, CreateProduct, InventoryReply, InventoryRequest,
    OrderCreatedStream, OrderDeletedStream, OrderUpdatedStream, PgProductRepository, Product,
    ProductRepository, RedisProductCache, product_key,
};
use http_body_util::BodyExt;
use products_api::config::InventoryConfig;
use products_api::state::ProductCatalog;
use products_api::worker::spawn_inventory_workers;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stream_worker::{StreamConsumer, StreamDef, StreamProducer, WorkerConfig};
use test_utils::{TestDataBuilder, TestDatabase, TestRedis};
use tokio::sync::watch;
use tower::ServiceExt; // For oneshot()

const SECRET: &str = "wiring-test-secret-at-least-32-characters";
const REPLY_TIMEOUT: Duration = Duration::from_secs(15);

fn auth() -> JwtAuth {
    JwtAuth::new(&JwtConfig::new(SECRET))
}

fn app(catalog: Arc<ProductCatalog>) -> Router {
    temp_env::with_var("CORS_ALLOWED_ORIGIN", Some("http://localhost:3000"), || {
        products_api::build_api(
            catalog,
            auth(),
            RequiredRole::new("Director"),
            Duration::from_secs(5),
        )
        .unwrap()
    })
}

fn get(uri: &str) -> Request<Body> {
    let token = auth()
        .create_token("user-1", "user@example.com", "Test User", &[], 300)
        .unwrap();
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn assert_no_pending<S: StreamDef>(redis: &TestRedis) {
    let consumer = StreamConsumer::new(
        redis.connection(),
        redis.connection(),
        WorkerConfig::from_stream_def::<S>(),
    );
    assert!(consumer.pending_ids(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_default_workers_share_redis_with_cache() {
    let db = TestDatabase::new().await;
    let redis = TestRedis::new().await;
    let reply_to = TestDataBuilder::from_test_name("default_workers_share_redis").key("order-replies");

    let catalog: Arc<ProductCatalog> = Arc::new(CatalogService::new(
        PgProductRepository::new(db.connection()),
        RedisProductCache::new(redis.connection(), &CacheConfig::default()),
    ));
    let product = catalog
        .create(CreateProduct {
            name: "Widget".to_string(),
            description: String::new(),
            price: Decimal::new(1000, 2),
            quantity_in_stock: 5,
        })
        .await
        .unwrap();

    let config = InventoryConfig::default();
    assert_eq!(config.block_ms, 5000);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = spawn_inventory_workers(
        &redis.client(),
        &redis.connection(),
        &catalog,
        &config,
        shutdown_rx,
    )
    .await
    .unwrap();

    // All three workers are now parked in XREADGROUP BLOCK 5000.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = Instant::now();
    let response = app(catalog.clone())
        .oneshot(get(&format!("/api/products/{}", product.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut conn = redis.connection();
    let cached: Option<String> = conn.get(product_key(&product.id)).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    let cached: Product = serde_json::from_str(&cached.unwrap()).unwrap();
    assert_eq!(cached.quantity_in_stock, 5);

    let creates = StreamProducer::from_stream_def::<OrderCreatedStream>(redis.connection());
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

    let stored = PgProductRepository::new(db.connection())
        .get_by_id(&product.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.quantity_in_stock, 2);
    let cached: Option<String> = conn.get(product_key(&product.id)).await.unwrap();
    let cached: Product = serde_json::from_str(&cached.unwrap()).unwrap();
    assert_eq!(cached.quantity_in_stock, 2);

    // Outlast one full BLOCK window; the next requests must still be answered.
    tokio::time::sleep(Duration::from_millis(5_500)).await;

    let updates = StreamProducer::from_stream_def::<OrderUpdatedStream>(redis.connection());
    let request = InventoryRequest {
        product_id: product.id.clone(),
        quantity: 1,
    };
    updates.send_request(&request, "u-1", &reply_to).await.unwrap();
    let reply: Option<InventoryReply> = updates
        .wait_for_reply(&reply_to, "u-1", REPLY_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(reply, Some(InventoryReply::Adjusted { success: true }));

    let deletes = StreamProducer::from_stream_def::<OrderDeletedStream>(redis.connection());
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

    let response = app(catalog.clone())
        .oneshot(get(&format!("/api/products/{}", product.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Product = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.quantity_in_stock, 5);

    assert_no_pending::<OrderCreatedStream>(&redis).await;
    assert_no_pending::<OrderUpdatedStream>(&redis).await;
    assert_no_pending::<OrderDeletedStream>(&redis).await;

    shutdown_tx.send(true).unwrap();
    while let Some(joined) = workers.join_next().await {
        joined.unwrap().unwrap();
    }
}
