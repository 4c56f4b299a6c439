use redis::Client;
use redis::aio::ConnectionManager;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

/// Redis 8 container; stopped and removed on drop.
pub struct TestRedis {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    manager: ConnectionManager,
    pub connection_string: String,
}

impl TestRedis {
    pub async fn new() -> Self {
        let container = Redis::default()
            .with_tag("8-alpine")
            .start()
            .await
            .expect("Failed to start Redis container");

        let host_port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");

        let connection_string = format!("redis://127.0.0.1:{}", host_port);

        let client = Client::open(connection_string.clone()).expect("Failed to create Redis client");
        let manager = ConnectionManager::new(client)
            .await
            .expect("Failed to connect to Redis");

        tracing::info!(port = host_port, "Test Redis ready (Redis 8-alpine)");

        Self {
            container,
            manager,
            connection_string,
        }
    }

    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// A client for opening further connections, e.g. a dedicated stream reader.
    pub fn client(&self) -> Client {
        Client::open(self.connection_string.clone()).expect("Failed to create Redis client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::AsyncCommands;

    #[tokio::test]
    async fn test_redis_set_get_del() {
        let redis = TestRedis::new().await;
        let mut conn = redis.connection();

        conn.set::<_, _, ()>("Product_1", "{}").await.unwrap();
        let value: String = conn.get("Product_1").await.unwrap();
        assert_eq!(value, "{}");

        conn.del::<_, ()>("Product_1").await.unwrap();
        let exists: bool = conn.exists("Product_1").await.unwrap();
        assert!(!exists);
    }
}
