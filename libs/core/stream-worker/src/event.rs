//! A stream entry decoded into request metadata and (when valid) a typed job.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::registry::{MessageKey, StreamJob};

#[derive(Debug, Clone)]
pub struct StreamEvent<J: StreamJob> {
    /// Redis entry id, e.g. `1700000000000-0`.
    pub stream_id: String,

    pub correlation_id: Option<String>,

    pub reply_to: Option<String>,

    /// `None` when the `job` field is absent, `null`, or not valid for `J`.
    pub payload: Option<J>,

    /// Enqueue time, taken from the millisecond part of `stream_id`.
    pub timestamp: DateTime<Utc>,
}

impl<J: StreamJob> StreamEvent<J> {
    /// Build an event from the raw field/value pairs of one entry.
    pub fn from_fields(stream_id: String, fields: &[(String, String)]) -> Self {
        let field = |key: MessageKey| {
            fields
                .iter()
                .find(|(k, _)| k == key.as_ref())
                .map(|(_, v)| v.clone())
                .filter(|v| !v.is_empty())
        };

        let payload = match field(MessageKey::Job) {
            Some(json) => match serde_json::from_str::<Option<J>>(&json) {
                Ok(job) => job,
                Err(e) => {
                    warn!(stream_id = %stream_id, error = %e, "Undecodable job payload");
                    None
                }
            },
            None => {
                warn!(
                    stream_id = %stream_id,
                    fields = ?fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
                    "Missing 'job' field in message"
                );
                None
            }
        };

        Self {
            timestamp: parse_timestamp(&stream_id),
            correlation_id: field(MessageKey::CorrelationId),
            reply_to: field(MessageKey::ReplyTo),
            payload,
            stream_id,
        }
    }

    pub fn job_id(&self) -> Option<String> {
        self.payload.as_ref().map(StreamJob::job_id)
    }

    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.timestamp).num_milliseconds()
    }
}

fn parse_timestamp(stream_id: &str) -> DateTime<Utc> {
    stream_id
        .split('-')
        .next()
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}
