//! Pipeline orchestrator - coordinates all components.
//!
//! sources → ingestion channel → `SessionChunker` → dispatcher → sinks

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chunk_engine::SessionChunker;
use contracts::{Chunk, SessionBlueprint};
use ingestion::{source_from_config, BackpressureConfig, IngestionPipeline};
use observability::{record_chunk_metrics, record_queue_depth};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{PipelineStats, StopReason};
use crate::error::CliError;

/// How often the loop checks whether every source has finished
const EXHAUSTION_POLL: Duration = Duration::from_millis(50);

/// How long to wait for sinks to flush on shutdown
const DISPATCHER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The session blueprint
    pub blueprint: SessionBlueprint,

    /// Maximum number of chunks to emit (None = unlimited)
    pub max_chunks: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Chunk channel buffer size
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the sources are exhausted, the chunk limit is hit, the
    /// timeout expires, or `shutdown` resolves.
    ///
    /// Partial chunks are flushed on every stop except the chunk limit.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Mock sources share one virtual clock origin
        let start_wallclock = blueprint
            .session_begin_epoch()?
            .unwrap_or_else(wallclock_now);

        info!("Setting up ingestion pipeline...");
        let mut ingestion =
            IngestionPipeline::with_config(BackpressureConfig::from(&blueprint.ingestion));
        for stream in &blueprint.streams {
            let source = source_from_config(stream, Some(start_wallclock))
                .map_err(|e| CliError::source_setup(stream.id.as_str(), e.to_string()))?;
            ingestion
                .register_source(stream.id.clone(), source, None)
                .map_err(|e| CliError::source_setup(stream.id.as_str(), e.to_string()))?;
        }

        info!(
            streams = ingestion.source_count(),
            drop_policy = ?blueprint.ingestion.drop_policy,
            "Ingestion pipeline configured"
        );

        let mut chunker = SessionChunker::new(blueprint.chunker_configs()?)
            .context("Failed to configure chunk engine")?;

        info!(
            chunk_duration_s = blueprint.session.chunk_duration_s,
            session_begin = ?blueprint.session_begin_epoch()?,
            "Chunk engine configured"
        );

        let (chunk_tx, chunk_rx) = mpsc::channel::<Chunk>(self.config.buffer_size.max(1));

        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - chunks will be dropped");
        }

        let dispatcher = dispatcher::Dispatcher::from_configs(&blueprint.sinks, chunk_rx)
            .context("Failed to create dispatcher")?;
        let dispatcher_handle = dispatcher.spawn();

        let mut stats = PipelineStats {
            active_streams: blueprint.streams.len(),
            active_sinks: blueprint.sinks.len(),
            ..Default::default()
        };

        ingestion.start_all();
        let samples_rx = ingestion
            .take_receiver()
            .ok_or_else(|| CliError::pipeline_execution("ingestion receiver already taken"))?;

        let max_chunks = self.config.max_chunks;
        info!(max_chunks = ?max_chunks, timeout = ?self.config.timeout, "Pipeline running");

        let deadline = async {
            match self.config.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);
        tokio::pin!(shutdown);
        let mut poll = tokio::time::interval(EXHAUSTION_POLL);

        let reason = loop {
            tokio::select! {
                event = samples_rx.recv() => {
                    let Ok(event) = event else {
                        break StopReason::SourcesExhausted;
                    };
                    stats.samples_received += 1;

                    if let Some(chunk) = chunker.push(event) {
                        if !forward_chunk(chunk, &chunk_tx, &mut stats).await {
                            break StopReason::DispatcherClosed;
                        }
                        if max_chunks.is_some_and(|max| stats.chunks_emitted >= max) {
                            info!(chunks = stats.chunks_emitted, "Reached max chunks limit");
                            break StopReason::MaxChunks;
                        }
                    }
                }
                _ = poll.tick() => {
                    record_queue_depth("ingestion", samples_rx.len());
                    if ingestion.is_exhausted() && samples_rx.is_empty() {
                        info!("All sources exhausted");
                        break StopReason::SourcesExhausted;
                    }
                }
                _ = &mut deadline => {
                    warn!(timeout = ?self.config.timeout, "Pipeline timed out");
                    break StopReason::Timeout;
                }
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping pipeline...");
                    break StopReason::Shutdown;
                }
            }
        };

        info!(reason = ?reason, "Shutting down pipeline...");
        ingestion.stop_all();

        if reason != StopReason::MaxChunks {
            for chunk in chunker.drain_all() {
                stats.chunks_drained += 1;
                if !forward_chunk(chunk, &chunk_tx, &mut stats).await {
                    break;
                }
            }
        }
        drop(chunk_tx);

        match tokio::time::timeout(DISPATCHER_FLUSH_TIMEOUT, dispatcher_handle).await {
            Ok(Ok(sink_metrics)) => stats.sink_metrics = sink_metrics,
            Ok(Err(e)) => warn!(error = %e, "Dispatcher task failed"),
            Err(_) => warn!("Timed out waiting for sinks to flush"),
        }

        stats.stop_reason = reason;
        stats.samples_dropped = ingestion.metrics().snapshot().samples_dropped;
        stats.unknown_events = chunker.unknown_events();
        stats.assembler_stats = chunker
            .stream_ids()
            .iter()
            .filter_map(|id| chunker.stats(id).map(|s| (id.to_string(), s)))
            .collect();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            chunks = stats.chunks_emitted,
            samples = stats.samples_received,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Record and hand one chunk to the dispatcher. Returns false once the
/// dispatcher is gone.
async fn forward_chunk(chunk: Chunk, tx: &mpsc::Sender<Chunk>, stats: &mut PipelineStats) -> bool {
    record_chunk_metrics(&chunk);
    stats.chunk_metrics.update(&chunk);
    stats.chunks_emitted += 1;

    info!(
        stream_id = %chunk.stream_id,
        chunk_id = chunk.chunk_id,
        boundary = format!("{:.3}", chunk.boundary),
        samples = chunk.len(),
        "Chunk emitted"
    );

    if tx.send(chunk).await.is_err() {
        warn!("Dispatcher channel closed");
        return false;
    }
    true
}

fn wallclock_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}
