//! Per-entry markers that keep a redelivered stream entry from being processed twice.
//!
//! Before processing, a worker claims the entry with `SET key in-progress NX EX ttl`. Once
//! the reply is computed it overwrites the marker with the reply body. A later delivery of
//! the same entry (a pending re-read after a failed `XACK`, or a restart) finds the marker
//! and re-sends the stored reply instead of running the processor again.

use crate::config::WorkerConfig;
use crate::error::StreamError;
use redis::aio::ConnectionManager;

const IN_PROGRESS: &str = "in-progress";

/// Result of claiming an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// First delivery; process it.
    Fresh,
    /// An earlier delivery claimed the entry but never recorded a reply.
    InProgress,
    /// Already handled; carries the reply body sent at the time.
    Replied(String),
}

#[derive(Clone)]
pub struct HandledLedger {
    redis: ConnectionManager,
    prefix: String,
    ttl_secs: u64,
}

impl HandledLedger {
    pub fn new(redis: ConnectionManager, config: &WorkerConfig) -> Self {
        Self {
            redis,
            prefix: format!("{}:{}:handled", config.stream_name, config.consumer_group),
            ttl_secs: config.handled_ttl_secs,
        }
    }

    /// `{stream}:{group}:handled:{stream_id}`
    pub fn key(&self, stream_id: &str) -> String {
        format!("{}:{}", self.prefix, stream_id)
    }

    pub async fn claim(&self, stream_id: &str) -> Result<Claim, StreamError> {
        let key = self.key(stream_id);
        let mut conn = self.redis.clone();

        let created: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(IN_PROGRESS)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await?;
        if created.is_some() {
            return Ok(Claim::Fresh);
        }

        let existing: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
        Ok(match existing {
            Some(body) if body != IN_PROGRESS => Claim::Replied(body),
            _ => Claim::InProgress,
        })
    }

    /// Store the reply body for a claimed entry.
    pub async fn record(&self, stream_id: &str, body: &str) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let _: Option<String> = redis::cmd("SET")
            .arg(self.key(stream_id))
            .arg(body)
            .arg("XX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
