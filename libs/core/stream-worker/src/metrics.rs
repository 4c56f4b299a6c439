//! Prometheus metrics for request/reply workers.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

use crate::error::StreamError;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder. Later calls return the existing handle.
pub fn init_metrics() -> Result<&'static PrometheusHandle, StreamError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| StreamError::Config(format!("Prometheus recorder: {}", e)))?;
        info!("Prometheus metrics initialized");
        Ok(handle)
    })
}

/// Text exposition of all metrics; empty before [`init_metrics`].
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE.get().map(|h| h.render()).unwrap_or_default()
}

/// Labelled counters for one worker.
#[derive(Clone)]
pub struct StreamMetrics {
    stream_name: String,
    processor_name: String,
}

impl StreamMetrics {
    pub fn new(stream_name: impl Into<String>, processor_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            processor_name: processor_name.into(),
        }
    }

    pub fn job_received(&self) {
        counter!(
            "stream_worker_jobs_received_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .increment(1);
    }

    /// A reply was produced; `succeeded` mirrors the reply's own flag.
    pub fn job_replied(&self, succeeded: bool, duration: Duration) {
        counter!(
            "stream_worker_jobs_processed_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone(),
            "status" => if succeeded { "success" } else { "failed" }
        )
        .increment(1);

        histogram!(
            "stream_worker_job_duration_seconds",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .record(duration.as_secs_f64());
    }

    /// Payload missing or undecodable.
    pub fn job_rejected(&self) {
        counter!(
            "stream_worker_jobs_rejected_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .increment(1);
    }

    /// Reply could not be delivered (no `reply_to`, or the append failed).
    pub fn reply_undeliverable(&self) {
        counter!(
            "stream_worker_replies_undeliverable_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .increment(1);
    }

    /// An entry arrived again after it had already been claimed.
    pub fn job_redelivered(&self) {
        counter!(
            "stream_worker_jobs_redelivered_total",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .increment(1);
    }

    pub fn in_flight(&self, count: usize) {
        gauge!(
            "stream_worker_in_flight_jobs",
            "stream" => self.stream_name.clone(),
            "processor" => self.processor_name.clone()
        )
        .set(count as f64);
    }
}
