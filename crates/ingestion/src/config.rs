//! Backpressure configuration and metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub use contracts::DropPolicy;
use contracts::IngestionConfig;

/// Backpressure configuration
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    pub channel_capacity: usize,

    /// Policy when the channel is full
    pub drop_policy: DropPolicy,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            drop_policy: DropPolicy::DropNewest,
        }
    }
}

impl BackpressureConfig {
    pub fn new(channel_capacity: usize, drop_policy: DropPolicy) -> Self {
        Self {
            channel_capacity,
            drop_policy,
        }
    }
}

impl From<&IngestionConfig> for BackpressureConfig {
    fn from(config: &IngestionConfig) -> Self {
        Self::new(config.channel_capacity, config.drop_policy)
    }
}

/// Ingestion metrics, shared by every adapter of a pipeline
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    pub samples_received: AtomicU64,

    /// Samples lost to backpressure (either end of the queue)
    pub samples_dropped: AtomicU64,

    /// Queue length observed at the last send
    pub queue_len: AtomicUsize,

    pub parse_errors: AtomicU64,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.samples_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("stream_syncer_ingest_dropped_total").increment(1);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub samples_received: u64,
    pub samples_dropped: u64,
    pub queue_len: usize,
    pub parse_errors: u64,
}
