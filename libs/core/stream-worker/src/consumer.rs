//! Consumer-group reads and acknowledgements.
//!
//! Reads go through their own connection. Redis answers one connection's commands in order,
//! so an outstanding `XREADGROUP ... BLOCK` would stall every command queued behind it on a
//! shared connection.

use crate::config::WorkerConfig;
use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::registry::StreamJob;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, RedisResult};
use tracing::{debug, info};

type StreamEntries = Vec<(String, Vec<(String, String)>)>;
type StreamReadReply = Vec<(String, StreamEntries)>;

/// Open a connection reserved for `XREADGROUP`, with a response timeout longer than the
/// configured `BLOCK`.
pub async fn connect_reader(
    client: Client,
    config: &WorkerConfig,
) -> Result<ConnectionManager, StreamError> {
    let manager_config =
        ConnectionManagerConfig::new().set_response_timeout(config.read_response_timeout());
    let reader = ConnectionManager::new_with_config(client, manager_config).await?;

    debug!(
        stream = %config.stream_name,
        consumer_id = %config.consumer_id,
        "Opened stream reader connection"
    );
    Ok(reader)
}

pub struct StreamConsumer {
    /// Only ever carries `XREADGROUP`.
    reader: ConnectionManager,
    redis: ConnectionManager,
    config: WorkerConfig,
}

impl StreamConsumer {
    /// `reader` must not be shared with other traffic; see [`connect_reader`].
    pub fn new(reader: ConnectionManager, redis: ConnectionManager, config: WorkerConfig) -> Self {
        Self {
            reader,
            redis,
            config,
        }
    }

    pub fn redis(&self) -> ConnectionManager {
        self.redis.clone()
    }

    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    pub fn consumer_group(&self) -> &str {
        &self.config.consumer_group
    }

    pub fn is_blocking(&self) -> bool {
        self.config.blocking_timeout_ms.is_some()
    }

    /// `XGROUP CREATE … 0 MKSTREAM`, tolerating an existing group.
    ///
    /// A new group starts from the beginning of the stream, so requests published before the
    /// first consumer came up are still answered.
    pub async fn ensure_consumer_group(&self) -> Result<(), StreamError> {
        let mut conn = self.redis.clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
                Ok(())
            }
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Entries delivered to this consumer but never acknowledged, with ids after `after`.
    pub async fn read_pending<J: StreamJob>(
        &self,
        after: &str,
    ) -> Result<Vec<StreamEvent<J>>, StreamError> {
        let mut conn = self.reader.clone();

        let streams: StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(after)
            .query_async(&mut conn)
            .await?;

        Ok(Self::into_events(streams))
    }

    /// New entries, blocking up to `blocking_timeout_ms` when configured.
    pub async fn read_new<J: StreamJob>(&self) -> Result<Vec<StreamEvent<J>>, StreamError> {
        let mut conn = self.reader.clone();

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id);

        if let Some(timeout) = self.config.blocking_timeout_ms {
            cmd.arg("BLOCK").arg(timeout);
        }

        cmd.arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">");

        let streams: Option<StreamReadReply> = cmd.query_async(&mut conn).await?;

        Ok(streams.map(Self::into_events).unwrap_or_default())
    }

    pub async fn ack(&self, stream_id: &str) -> Result<(), StreamError> {
        ack(&self.redis, &self.config, stream_id).await
    }

    /// Ids of entries delivered to any consumer of the group but not yet acknowledged.
    pub async fn pending_ids(&self, limit: usize) -> Result<Vec<String>, StreamError> {
        let mut conn = self.redis.clone();

        let entries: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        Ok(entries.into_iter().map(|(id, ..)| id).collect())
    }

    fn into_events<J: StreamJob>(streams: StreamReadReply) -> Vec<StreamEvent<J>> {
        streams
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .map(|(stream_id, fields)| StreamEvent::from_fields(stream_id, &fields))
            .collect()
    }
}

/// `XACK` one entry; shared with the per-message tasks spawned by the worker.
pub(crate) async fn ack(
    redis: &ConnectionManager,
    config: &WorkerConfig,
    stream_id: &str,
) -> Result<(), StreamError> {
    let mut conn = redis.clone();

    let _: i64 = redis::cmd("XACK")
        .arg(&config.stream_name)
        .arg(&config.consumer_group)
        .arg(stream_id)
        .query_async(&mut conn)
        .await?;

    debug!(stream_id = %stream_id, "Acknowledged message");
    Ok(())
}
