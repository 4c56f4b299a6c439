//! Request/reply workers on Redis Streams.
//!
//! A requester appends an entry with `job`, `correlation_id` and `reply_to` fields to a request
//! stream. A [`StreamWorker`] reads it through a consumer group, hands the decoded job to a
//! [`StreamProcessor`], appends the processor's reply to `reply_to` (tagged with the same
//! `correlation_id`) and acknowledges the entry. Each entry is processed at most once: a
//! redelivered entry gets the reply recorded for its first delivery.
//!
//! ```ignore
//! use stream_worker::{StreamDef, StreamWorker, WorkerConfig};
//!
//! struct OrderCreatedStream;
//! impl StreamDef for OrderCreatedStream {
//!     const STREAM_NAME: &'static str = "create-queue";
//!     const CONSUMER_GROUP: &'static str = "product-inventory";
//! }
//!
//! let config = WorkerConfig::from_stream_def::<OrderCreatedStream>().with_max_concurrent_jobs(8);
//! let worker = StreamWorker::connect(client, redis, processor, config).await?;
//! worker.run(shutdown_rx).await?;
//! ```

mod config;
mod consumer;
mod error;
mod event;
mod ledger;
pub mod metrics;
mod producer;
mod registry;
mod reply;
mod worker;

pub use config::{READ_TIMEOUT_MARGIN_MS, WorkerConfig};
pub use consumer::{StreamConsumer, connect_reader};
pub use error::StreamError;
pub use event::StreamEvent;
pub use ledger::{Claim, HandledLedger};
pub use metrics::{StreamMetrics, init_metrics, render_metrics};
pub use producer::StreamProducer;
pub use registry::{MessageKey, StreamDef, StreamJob, StreamProcessor, StreamReply};
pub use reply::ReplyPublisher;
pub use worker::{StreamWorker, reply_for};
