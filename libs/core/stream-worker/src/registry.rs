//! Stream definitions and the traits domain code implements to plug into a [`StreamWorker`].
//!
//! [`StreamWorker`]: crate::StreamWorker

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use strum::{AsRefStr, Display};

use crate::error::StreamError;

/// Field names used in stream entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum MessageKey {
    /// JSON request payload.
    Job,
    /// Opaque id echoed back on the reply.
    CorrelationId,
    /// Stream the reply is appended to.
    ReplyTo,
    /// JSON reply payload.
    Reply,
}

/// Static description of one request stream.
///
/// ```rust,ignore
/// pub struct OrderCreatedStream;
///
/// impl StreamDef for OrderCreatedStream {
///     const STREAM_NAME: &'static str = "create-queue";
///     const CONSUMER_GROUP: &'static str = "product-inventory";
/// }
/// ```
pub trait StreamDef: Send + Sync {
    const STREAM_NAME: &'static str;

    const CONSUMER_GROUP: &'static str;

    /// Approximate `MAXLEN` applied when appending.
    const MAX_LENGTH: i64 = 100_000;

    fn stream_name() -> &'static str {
        Self::STREAM_NAME
    }

    fn consumer_group() -> &'static str {
        Self::CONSUMER_GROUP
    }
}

/// A request payload carried in the `job` field.
pub trait StreamJob: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Identifier used in logs.
    fn job_id(&self) -> String;
}

/// A reply payload published back to the requester.
pub trait StreamReply: Serialize + Send + Sync + 'static {
    /// Whether the reply reports success; drives metrics only.
    fn succeeded(&self) -> bool;
}

/// Handles one request and produces the reply to publish.
///
/// Failures are part of the reply, never a `Result`: every delivered request gets exactly one
/// reply and is then acknowledged.
#[async_trait]
pub trait StreamProcessor<J: StreamJob>: Send + Sync {
    type Reply: StreamReply;

    async fn process(&self, job: J) -> Self::Reply;

    /// Reply sent for entries whose payload is missing or cannot be decoded.
    fn rejected(&self) -> Self::Reply;

    fn name(&self) -> &'static str;

    async fn health_check(&self) -> Result<bool, StreamError> {
        Ok(true)
    }
}
