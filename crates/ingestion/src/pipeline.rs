//! Ingestion Pipeline main entry

use std::collections::HashMap;
use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender};
use contracts::{SampleEvent, SampleSource, StreamId};
use tracing::{debug, info, instrument};

use crate::adapter::SourceAdapter;
use crate::config::{BackpressureConfig, IngestionMetrics};
use crate::error::{IngestionError, Result};
use crate::sender::EventSender;

/// Ingestion Pipeline
///
/// Fans every registered source into one bounded channel of `SampleEvent`s.
pub struct IngestionPipeline {
    adapters: HashMap<StreamId, (SourceAdapter, BackpressureConfig)>,

    metrics: Arc<IngestionMetrics>,

    /// Shared by all adapters
    tx: Sender<SampleEvent>,

    /// Ingestion's own receiver, shared with every sender: `DropOldest`
    /// evicts through it, and it is the only one left once the consumer
    /// drops the receiver from `take_receiver`
    rx_handle: Arc<Receiver<SampleEvent>>,

    rx: Option<Receiver<SampleEvent>>,

    default_config: BackpressureConfig,
}

impl IngestionPipeline {
    pub fn new(channel_capacity: usize) -> Self {
        Self::with_config(BackpressureConfig {
            channel_capacity,
            ..Default::default()
        })
    }

    pub fn with_config(config: BackpressureConfig) -> Self {
        let (tx, rx) = bounded(config.channel_capacity.max(1));

        Self {
            adapters: HashMap::new(),
            metrics: Arc::new(IngestionMetrics::new()),
            tx,
            rx_handle: Arc::new(rx.clone()),
            rx: Some(rx),
            default_config: config,
        }
    }

    /// Register the source feeding `stream_id`.
    ///
    /// `config` overrides the pipeline's drop policy for this stream; the
    /// channel capacity is shared and cannot be overridden.
    #[instrument(
        name = "ingestion_register_source",
        skip(self, source, config),
        fields(stream_id = %stream_id)
    )]
    pub fn register_source(
        &mut self,
        stream_id: StreamId,
        source: Box<dyn SampleSource>,
        config: Option<BackpressureConfig>,
    ) -> Result<()> {
        if self.adapters.contains_key(&stream_id) {
            return Err(IngestionError::DuplicateSource {
                stream_id: stream_id.to_string(),
            });
        }
        let config = config.unwrap_or_else(|| self.default_config.clone());
        let adapter = SourceAdapter::new(stream_id.clone(), source);
        debug!(stream_id = %stream_id, policy = ?config.drop_policy, "registered sample source");
        self.adapters.insert(stream_id, (adapter, config));
        Ok(())
    }

    #[instrument(name = "ingestion_start_all", skip(self))]
    pub fn start_all(&self) {
        info!(count = self.adapters.len(), "starting all sample sources");
        for (adapter, config) in self.adapters.values() {
            if !adapter.is_listening() {
                let sender = EventSender::new(self.tx.clone(), &self.rx_handle, config.drop_policy);
                adapter.start(sender, self.metrics.clone());
            }
        }
    }

    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&self) {
        info!(count = self.adapters.len(), "stopping all sample sources");
        for (adapter, _) in self.adapters.values() {
            adapter.stop();
        }
    }

    /// Get the event stream receiver
    ///
    /// Note: Can only be called once, subsequent calls return None. Dropping
    /// the returned receiver closes the channel on the next send and the
    /// sources stop counting as active.
    pub fn take_receiver(&mut self) -> Option<Receiver<SampleEvent>> {
        self.rx.take()
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    pub fn source_count(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_source_listening(&self, stream_id: &str) -> bool {
        self.adapters
            .get(stream_id)
            .map(|(a, _)| a.is_listening())
            .unwrap_or(false)
    }

    /// Number of sources still producing
    pub fn active_sources(&self) -> usize {
        self.adapters
            .values()
            .filter(|(a, _)| a.is_listening())
            .count()
    }

    /// All sources finished and nothing left in the channel
    pub fn is_exhausted(&self) -> bool {
        self.active_sources() == 0 && self.tx.is_empty()
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop_all();
        self.tx.close();
    }
}
