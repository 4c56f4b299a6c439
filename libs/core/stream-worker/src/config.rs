use crate::registry::StreamDef;
use std::time::Duration;
use uuid::Uuid;

/// Headroom between a `BLOCK` timeout and the read connection's response timeout.
pub const READ_TIMEOUT_MARGIN_MS: u64 = 2_000;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub stream_name: String,

    pub consumer_group: String,

    /// Unique within the group; generated unless set explicitly.
    pub consumer_id: String,

    /// Entries requested per `XREADGROUP`.
    pub batch_size: usize,

    /// `BLOCK` timeout for new entries; `None` polls.
    pub blocking_timeout_ms: Option<u64>,

    /// Poll interval when not blocking.
    pub poll_interval_ms: u64,

    /// Messages handled at the same time by one worker.
    pub max_concurrent_jobs: usize,

    /// Approximate `MAXLEN` for reply streams.
    pub reply_max_length: i64,

    /// Lifetime of the per-entry handled marker that stops a redelivered entry from being
    /// processed twice.
    pub handled_ttl_secs: u64,
}

impl WorkerConfig {
    pub fn from_stream_def<S: StreamDef>() -> Self {
        Self::new(S::STREAM_NAME, S::CONSUMER_GROUP)
    }

    pub fn new(stream_name: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            consumer_group: consumer_group.into(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            batch_size: 10,
            blocking_timeout_ms: Some(5000),
            poll_interval_ms: 250,
            max_concurrent_jobs: 1,
            reply_max_length: 10_000,
            handled_ttl_secs: 86_400,
        }
    }

    /// Response timeout for the connection that issues `XREADGROUP`.
    ///
    /// Always longer than the `BLOCK` timeout; `None` (wait forever) for `BLOCK 0`.
    pub fn read_response_timeout(&self) -> Option<Duration> {
        match self.blocking_timeout_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms.saturating_add(READ_TIMEOUT_MARGIN_MS))),
            None => Some(Duration::from_millis(READ_TIMEOUT_MARGIN_MS)),
        }
    }

    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_blocking(mut self, timeout_ms: Option<u64>) -> Self {
        self.blocking_timeout_ms = timeout_ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, interval: u64) -> Self {
        self.poll_interval_ms = interval;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, count: usize) -> Self {
        self.max_concurrent_jobs = count.max(1);
        self
    }

    pub fn with_reply_max_length(mut self, max_length: i64) -> Self {
        self.reply_max_length = max_length;
        self
    }

    pub fn with_handled_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.handled_ttl_secs = ttl_secs.max(1);
        self
    }
}
