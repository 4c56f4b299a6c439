//! Integration tests for the Products domain
//!
//! These use real PostgreSQL and Redis via testcontainers to check:
//! - sea-orm queries and the table's CHECK constraints
//! - row-locked stock adjustments under concurrency
//! - the Redis cache entries written by the service

use domain_products::*;
use redis::AsyncCommands;
use rust_decimal::Decimal;
use test_utils::{TestDataBuilder, TestDatabase, TestRedis};

fn product(id: String, name: String, quantity: i32) -> Product {
    Product {
        id,
        name,
        description: "Integration test product".to_string(),
        price: Decimal::new(1999, 2),
        quantity_in_stock: quantity,
    }
}

// ============================================================================
// Repository Tests
// ============================================================================

#[tokio::test]
async fn test_insert_and_get_product() {
    let db = TestDatabase::new().await;
    let repo = PgProductRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("insert_and_get");

    let input = product(builder.uuid(1).to_string(), builder.name("product", "main"), 5);
    let created = repo.insert(input.clone()).await.unwrap();
    assert_eq!(created, input);

    let fetched = repo.get_by_id(&input.id).await.unwrap().expect("product should exist");
    assert_eq!(fetched, input);
    assert_eq!(fetched.price, Decimal::new(1999, 2));
}

#[tokio::test]
async fn test_list_update_delete() {
    let db = TestDatabase::new().await;
    let repo = PgProductRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("list_update_delete");

    let a = repo
        .insert(product(builder.uuid(1).to_string(), builder.name("product", "a"), 1))
        .await
        .unwrap();
    let b = repo
        .insert(product(builder.uuid(2).to_string(), builder.name("product", "b"), 2))
        .await
        .unwrap();

    let all = repo.list_all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.contains(&a) && all.contains(&b));

    let mut changed = a.clone();
    changed.name = builder.name("product", "renamed");
    changed.quantity_in_stock = 40;
    let updated = repo.update(changed.clone()).await.unwrap().expect("row should exist");
    assert_eq!(updated, changed);

    assert!(repo.delete(&a.id).await.unwrap());
    assert!(!repo.delete(&a.id).await.unwrap());
    assert!(repo.get_by_id(&a.id).await.unwrap().is_none());
    assert!(repo.update(a).await.unwrap().is_none());
}

#[tokio::test]
async fn test_negative_stock_rejected_by_table() {
    let db = TestDatabase::new().await;
    let repo = PgProductRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("negative_stock");

    let result = repo
        .insert(product(builder.uuid(1).to_string(), builder.name("product", "bad"), -1))
        .await;
    assert!(matches!(result, Err(ProductError::Database(_))));
}

#[tokio::test]
async fn test_adjust_stock_outcomes() {
    let db = TestDatabase::new().await;
    let repo = PgProductRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("adjust_stock");
    let id = builder.uuid(1).to_string();

    repo.insert(product(id.clone(), builder.name("product", "stock"), 5))
        .await
        .unwrap();

    match repo.adjust_stock(&id, -3).await.unwrap() {
        StockAdjustment::Applied(p) => assert_eq!(p.quantity_in_stock, 2),
        other => panic!("expected Applied, got {:?}", other),
    }
    match repo.adjust_stock(&id, -5).await.unwrap() {
        StockAdjustment::Insufficient(p) => assert_eq!(p.quantity_in_stock, 2),
        other => panic!("expected Insufficient, got {:?}", other),
    }
    match repo.adjust_stock(&id, 4).await.unwrap() {
        StockAdjustment::Applied(p) => assert_eq!(p.quantity_in_stock, 6),
        other => panic!("expected Applied, got {:?}", other),
    }
    assert_eq!(
        repo.adjust_stock("missing", -1).await.unwrap(),
        StockAdjustment::Missing
    );
}

#[tokio::test]
async fn test_concurrent_reservations_never_oversell() {
    let db = TestDatabase::new().await;
    let repo = std::sync::Arc::new(PgProductRepository::new(db.connection()));
    let builder = TestDataBuilder::from_test_name("concurrent_reservations");
    let id = builder.uuid(1).to_string();

    repo.insert(product(id.clone(), builder.name("product", "hot"), 10))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let repo = repo.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move { repo.adjust_stock(&id, -1).await }));
    }

    let mut applied = 0;
    for handle in handles {
        if let StockAdjustment::Applied(_) = handle.await.unwrap().unwrap() {
            applied += 1;
        }
    }

    assert_eq!(applied, 10);
    let remaining = repo.get_by_id(&id).await.unwrap().unwrap();
    assert_eq!(remaining.quantity_in_stock, 0);
}

// ============================================================================
// Service + Redis cache
// ============================================================================

#[tokio::test]
async fn test_service_writes_both_cache_entries() {
    let db = TestDatabase::new().await;
    let redis = TestRedis::new().await;
    let builder = TestDataBuilder::from_test_name("service_cache_entries");

    let service = CatalogService::new(
        PgProductRepository::new(db.connection()),
        RedisProductCache::new(redis.connection(), &CacheConfig { ttl_secs: 60 }),
    );

    let created = service
        .create(CreateProduct {
            name: builder.name("product", "cached"),
            description: String::new(),
            price: Decimal::new(1000, 2),
            quantity_in_stock: 5,
        })
        .await
        .unwrap();

    let mut conn = redis.connection();
    let cached: String = conn.get(product_key(&created.id)).await.unwrap();
    let cached: Product = serde_json::from_str(&cached).unwrap();
    assert_eq!(cached, created);

    // No collection entry until someone lists.
    let exists: bool = conn.exists(ALL_PRODUCTS_KEY).await.unwrap();
    assert!(!exists);

    service.get_all().await.unwrap();
    let ttl: i64 = conn.ttl(ALL_PRODUCTS_KEY).await.unwrap();
    assert!(ttl > 0 && ttl <= 60);

    service.inventory().reserve(&created.id, 2).await.unwrap();
    let collection: String = conn.get(ALL_PRODUCTS_KEY).await.unwrap();
    let collection: Vec<Product> = serde_json::from_str(&collection).unwrap();
    assert_eq!(collection[0].quantity_in_stock, 3);

    service.delete(&created.id).await.unwrap();
    let exists: bool = conn.exists(product_key(&created.id)).await.unwrap();
    assert!(!exists);
    let collection: String = conn.get(ALL_PRODUCTS_KEY).await.unwrap();
    assert_eq!(collection, "[]");
}
