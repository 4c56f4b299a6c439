use crate::error::StreamError;
use crate::registry::{MessageKey, StreamReply};
use redis::aio::ConnectionManager;
use tracing::debug;

/// Appends replies to the stream named by a request's `reply_to`.
#[derive(Clone)]
pub struct ReplyPublisher {
    redis: ConnectionManager,
    max_length: i64,
}

impl ReplyPublisher {
    pub fn new(redis: ConnectionManager, max_length: i64) -> Self {
        Self { redis, max_length }
    }

    /// `XADD reply_to MAXLEN ~ n * reply <json> [correlation_id <id>]`
    pub async fn publish<R: StreamReply>(
        &self,
        reply_to: &str,
        correlation_id: Option<&str>,
        reply: &R,
    ) -> Result<String, StreamError> {
        let body = serde_json::to_string(reply)?;
        self.publish_body(reply_to, correlation_id, &body).await
    }

    /// Append an already encoded reply.
    pub async fn publish_body(
        &self,
        reply_to: &str,
        correlation_id: Option<&str>,
        body: &str,
    ) -> Result<String, StreamError> {
        let mut conn = self.redis.clone();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(reply_to)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg(MessageKey::Reply.as_ref())
            .arg(body);
        if let Some(id) = correlation_id {
            cmd.arg(MessageKey::CorrelationId.as_ref()).arg(id);
        }

        let entry_id: String = cmd.query_async(&mut conn).await?;
        debug!(reply_to = %reply_to, entry_id = %entry_id, "Published reply");
        Ok(entry_id)
    }
}
