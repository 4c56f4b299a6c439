//! Request side of a stream: enqueue jobs and collect correlated replies.
//!
//! ```rust,ignore
//! let producer = StreamProducer::from_stream_def::<OrderCreatedStream>(redis);
//! let correlation_id = Uuid::new_v4().to_string();
//! producer.send_request(&job, &correlation_id, "orders:replies").await?;
//! let reply: Option<OrderCreatedReply> = producer
//!     .wait_for_reply("orders:replies", &correlation_id, Duration::from_secs(5))
//!     .await?;
//! ```

use crate::error::StreamError;
use crate::registry::{MessageKey, StreamDef};
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::debug;

const REPLY_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct StreamProducer {
    redis: ConnectionManager,
    stream_name: String,
    max_length: i64,
}

impl StreamProducer {
    pub fn new(redis: ConnectionManager, stream_name: impl Into<String>) -> Self {
        Self {
            redis,
            stream_name: stream_name.into(),
            max_length: 100_000,
        }
    }

    pub fn from_stream_def<S: StreamDef>(redis: ConnectionManager) -> Self {
        Self {
            redis,
            stream_name: S::STREAM_NAME.to_string(),
            max_length: S::MAX_LENGTH,
        }
    }

    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Append a fire-and-forget job. Returns the entry id.
    pub async fn send<J: Serialize>(&self, job: &J) -> Result<String, StreamError> {
        let job_json = serde_json::to_string(job)?;
        self.append(&[(MessageKey::Job.as_ref(), job_json.as_str())]).await
    }

    /// Append a job that expects a reply on `reply_to` tagged with `correlation_id`.
    pub async fn send_request<J: Serialize>(
        &self,
        job: &J,
        correlation_id: &str,
        reply_to: &str,
    ) -> Result<String, StreamError> {
        let job_json = serde_json::to_string(job)?;
        self.append(&[
            (MessageKey::Job.as_ref(), job_json.as_str()),
            (MessageKey::CorrelationId.as_ref(), correlation_id),
            (MessageKey::ReplyTo.as_ref(), reply_to),
        ])
        .await
    }

    /// Append an entry with arbitrary fields, including malformed ones.
    pub async fn send_raw(&self, fields: &[(&str, &str)]) -> Result<String, StreamError> {
        self.append(fields).await
    }

    /// Poll `reply_to` until an entry tagged with `correlation_id` shows up or `timeout` passes.
    pub async fn wait_for_reply<R: DeserializeOwned>(
        &self,
        reply_to: &str,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<Option<R>, StreamError> {
        let deadline = Instant::now() + timeout;

        loop {
            let mut conn = self.redis.clone();
            let entries: Vec<(String, Vec<(String, String)>)> = redis::cmd("XRANGE")
                .arg(reply_to)
                .arg("-")
                .arg("+")
                .query_async(&mut conn)
                .await?;

            for (_, fields) in entries {
                let value = |key: MessageKey| {
                    fields
                        .iter()
                        .find(|(k, _)| k == key.as_ref())
                        .map(|(_, v)| v.as_str())
                };

                if value(MessageKey::CorrelationId) == Some(correlation_id) {
                    let raw = value(MessageKey::Reply).ok_or_else(|| {
                        StreamError::Serialization("reply entry without 'reply' field".into())
                    })?;
                    return Ok(Some(serde_json::from_str(raw)?));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(REPLY_POLL_INTERVAL).await;
        }
    }

    async fn append(&self, fields: &[(&str, &str)]) -> Result<String, StreamError> {
        let mut conn = self.redis.clone();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream_name)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*");
        for (key, value) in fields {
            cmd.arg(*key).arg(*value);
        }

        let stream_id: String = cmd.query_async(&mut conn).await?;

        debug!(stream = %self.stream_name, stream_id = %stream_id, "Enqueued job");
        Ok(stream_id)
    }
}
