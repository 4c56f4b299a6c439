//! The consumer loop that turns stream entries into replies.

use crate::config::WorkerConfig;
use crate::consumer::{self, StreamConsumer};
use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::ledger::{Claim, HandledLedger};
use crate::metrics::StreamMetrics;
use crate::registry::{StreamJob, StreamProcessor, StreamReply};
use crate::reply::ReplyPublisher;
use redis::Client;
use redis::aio::ConnectionManager;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

const MAX_BACKOFF_SECS: u64 = 30;
const ACK_ATTEMPTS: u32 = 3;
const ACK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Reads a request stream through a consumer group and answers every entry.
///
/// Each entry runs on its own task, at most `max_concurrent_jobs` at a time. A task claims
/// the entry in the [`HandledLedger`], computes the reply, records it, publishes it to the
/// entry's `reply_to`, then acknowledges the entry. Tasks are never cancelled: on shutdown
/// the loop stops reading and waits for them.
///
/// Reads use a dedicated connection; replies, markers and acks use the shared one.
pub struct StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J>,
{
    consumer: StreamConsumer,
    handler: Handler<P>,
    config: WorkerConfig,
    concurrency: Arc<Semaphore>,
    _phantom: PhantomData<J>,
}

impl<J, P> StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J> + 'static,
{
    /// `reader` carries only `XREADGROUP`; open it with [`consumer::connect_reader`].
    pub fn new(
        reader: ConnectionManager,
        redis: ConnectionManager,
        processor: P,
        config: WorkerConfig,
    ) -> Self {
        Self::with_arc_processor(reader, redis, Arc::new(processor), config)
    }

    pub fn with_arc_processor(
        reader: ConnectionManager,
        redis: ConnectionManager,
        processor: Arc<P>,
        config: WorkerConfig,
    ) -> Self {
        let handler = Handler {
            publisher: ReplyPublisher::new(redis.clone(), config.reply_max_length),
            ledger: HandledLedger::new(redis.clone(), &config),
            metrics: StreamMetrics::new(&config.stream_name, processor.name()),
            rescan_pending: Arc::new(AtomicBool::new(false)),
            redis: redis.clone(),
            config: config.clone(),
            processor,
        };

        Self {
            consumer: StreamConsumer::new(reader, redis, config.clone()),
            concurrency: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            handler,
            config,
            _phantom: PhantomData,
        }
    }

    /// Open a reader connection from `client` and build the worker around it.
    pub async fn connect(
        client: Client,
        redis: ConnectionManager,
        processor: P,
        config: WorkerConfig,
    ) -> Result<Self, StreamError> {
        let reader = consumer::connect_reader(client, &config).await?;
        Ok(Self::new(reader, redis, processor, config))
    }

    pub fn consumer(&self) -> &StreamConsumer {
        &self.consumer
    }

    /// Run until `shutdown` flips to `true`, then drain in-flight messages.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            processor = %self.handler.processor.name(),
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            batch_size = self.config.batch_size,
            "Starting stream worker"
        );

        self.consumer.ensure_consumer_group().await?;

        let mut tasks: JoinSet<()> = JoinSet::new();
        // Some(cursor) while re-reading entries delivered to this consumer but never acked.
        let mut pending_cursor: Option<String> = Some("0".to_string());
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                info!(stream = %self.config.stream_name, "Received shutdown signal, stopping worker");
                break;
            }

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Message task panicked");
                }
            }

            if pending_cursor.is_none() && self.handler.rescan_pending.swap(false, Ordering::SeqCst)
            {
                debug!(stream = %self.config.stream_name, "Re-reading unacknowledged entries");
                drain(&mut tasks).await;
                pending_cursor = Some("0".to_string());
            }

            let read = match pending_cursor.as_deref() {
                Some(cursor) => self.consumer.read_pending::<J>(cursor).await,
                None => {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                warn!("Shutdown sender dropped, stopping worker");
                                break;
                            }
                            continue;
                        }
                        read = self.consumer.read_new::<J>() => read,
                    }
                }
            };

            match read {
                Ok(events) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Stream connection recovered");
                        consecutive_errors = 0;
                    }

                    if pending_cursor.is_some() {
                        pending_cursor = events.last().map(|e| e.stream_id.clone());
                        if pending_cursor.is_none() {
                            debug!(stream = %self.config.stream_name, "No pending entries left");
                        }
                    }

                    let idle = events.is_empty();
                    for event in events {
                        self.dispatch(&mut tasks, event).await;
                    }

                    if idle && !self.consumer.is_blocking() {
                        let poll = Duration::from_millis(self.config.poll_interval_ms);
                        tokio::select! {
                            _ = shutdown.changed() => {}
                            _ = tokio::time::sleep(poll) => {}
                        }
                    }
                }
                Err(e) if e.is_timeout() => {
                    // The abandoned read may still have claimed entries for this consumer.
                    warn!(error = %e, "Read timed out, re-reading pending entries");
                    drain(&mut tasks).await;
                    pending_cursor = Some("0".to_string());
                }
                Err(e) if e.is_nogroup_error() => {
                    warn!("Consumer group missing, recreating");
                    if let Err(create_err) = self.consumer.ensure_consumer_group().await {
                        error!(error = %create_err, "Failed to recreate consumer group");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    let backoff = if e.is_connection_error() {
                        let secs = 2u64.pow(consecutive_errors.min(5)).min(MAX_BACKOFF_SECS);
                        warn!(
                            error = %e,
                            consecutive_errors,
                            backoff_secs = secs,
                            "Redis connection error, backing off"
                        );
                        Duration::from_secs(secs)
                    } else {
                        error!(error = %e, "Error reading stream");
                        Duration::from_secs(1)
                    };

                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        drain(&mut tasks).await;
        info!(stream = %self.config.stream_name, "Stream worker stopped");
        Ok(())
    }

    async fn dispatch(&self, tasks: &mut JoinSet<()>, event: StreamEvent<J>) {
        let Ok(permit) = Arc::clone(&self.concurrency).acquire_owned().await else {
            error!("Concurrency semaphore closed, dropping message");
            return;
        };

        let handler = self.handler.clone();
        let concurrency = Arc::clone(&self.concurrency);
        let max_concurrent_jobs = self.config.max_concurrent_jobs;
        let span = info_span!(
            "stream_message",
            stream = %self.config.stream_name,
            stream_id = %event.stream_id,
            correlation_id = event.correlation_id.as_deref().unwrap_or_default()
        );

        tasks.spawn(
            async move {
                let metrics = handler.metrics.clone();
                metrics.in_flight(max_concurrent_jobs - concurrency.available_permits());
                handler.handle(event).await;
                drop(permit);
                metrics.in_flight(max_concurrent_jobs - concurrency.available_permits());
            }
            .instrument(span),
        );
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Message task panicked");
        }
    }
}

/// Reply for one decoded (or undecodable) payload.
pub async fn reply_for<J, P>(processor: &P, payload: Option<J>) -> P::Reply
where
    J: StreamJob,
    P: StreamProcessor<J> + ?Sized,
{
    match payload {
        Some(job) => {
            debug!(job_id = %job.job_id(), processor = processor.name(), "Processing job");
            processor.process(job).await
        }
        None => processor.rejected(),
    }
}

/// Everything a message task needs, cloned into each task.
struct Handler<P> {
    processor: Arc<P>,
    publisher: ReplyPublisher,
    ledger: HandledLedger,
    redis: ConnectionManager,
    config: WorkerConfig,
    metrics: StreamMetrics,
    /// Set when an entry was left unacknowledged; the loop then re-reads pending entries.
    rescan_pending: Arc<AtomicBool>,
}

impl<P> Clone for Handler<P> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            publisher: self.publisher.clone(),
            ledger: self.ledger.clone(),
            redis: self.redis.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            rescan_pending: Arc::clone(&self.rescan_pending),
        }
    }
}

impl<P> Handler<P> {
    async fn handle<J>(&self, mut event: StreamEvent<J>)
    where
        J: StreamJob,
        P: StreamProcessor<J>,
    {
        self.metrics.job_received();
        let start = Instant::now();

        match self.ledger.claim(&event.stream_id).await {
            Ok(Claim::Fresh) => {}
            Ok(Claim::Replied(body)) => {
                info!("Entry already handled, re-sending recorded reply");
                self.metrics.job_redelivered();
                self.deliver(&event, Some(&body)).await;
                self.acknowledge(&event.stream_id).await;
                return;
            }
            Ok(Claim::InProgress) => {
                // The earlier delivery may or may not have applied its effects.
                warn!("Entry claimed by an earlier delivery that never finished, acknowledging without reply");
                self.metrics.job_redelivered();
                self.metrics.reply_undeliverable();
                self.acknowledge(&event.stream_id).await;
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to claim entry, leaving it pending");
                self.rescan_pending.store(true, Ordering::SeqCst);
                return;
            }
        }

        let payload = event.payload.take();
        if payload.is_none() {
            self.metrics.job_rejected();
        }
        let reply = reply_for(self.processor.as_ref(), payload).await;
        let succeeded = reply.succeeded();

        let body = match serde_json::to_string(&reply) {
            Ok(body) => Some(body),
            Err(e) => {
                error!(error = %e, "Failed to encode reply");
                None
            }
        };
        if let Some(body) = &body {
            if let Err(e) = self.ledger.record(&event.stream_id, body).await {
                warn!(error = %e, "Failed to record reply for entry");
            }
        }

        self.deliver(&event, body.as_deref()).await;
        // Acked even when the reply was lost; the ledger stops a redelivery from reapplying it.
        self.acknowledge(&event.stream_id).await;

        self.metrics.job_replied(succeeded, start.elapsed());
    }

    async fn deliver<J: StreamJob>(&self, event: &StreamEvent<J>, body: Option<&str>) {
        let (Some(reply_to), Some(body)) = (event.reply_to.as_deref(), body) else {
            if event.reply_to.is_none() {
                warn!("Request has no reply destination, dropping reply");
            }
            self.metrics.reply_undeliverable();
            return;
        };

        if let Err(e) = self
            .publisher
            .publish_body(reply_to, event.correlation_id.as_deref(), body)
            .await
        {
            error!(reply_to = %reply_to, error = %e, "Failed to publish reply");
            self.metrics.reply_undeliverable();
        }
    }

    async fn acknowledge(&self, stream_id: &str) {
        for attempt in 1..=ACK_ATTEMPTS {
            match consumer::ack(&self.redis, &self.config, stream_id).await {
                Ok(()) => return,
                Err(e) if attempt < ACK_ATTEMPTS => {
                    warn!(attempt, error = %e, "Failed to ACK message, retrying");
                    tokio::time::sleep(ACK_RETRY_DELAY * attempt).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to ACK message, leaving it pending");
                    self.rescan_pending.store(true, Ordering::SeqCst);
                }
            }
        }
    }
}
