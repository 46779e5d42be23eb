//! Pipeline statistics and metrics.

use std::time::Duration;

use chunk_engine::AssemblerStats;
use observability::ChunkMetricsAggregator;

/// Why the pipeline loop ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// Every source finished and the channel was empty
    #[default]
    SourcesExhausted,
    MaxChunks,
    Timeout,
    Shutdown,
    DispatcherClosed,
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Chunks handed to the dispatcher, drained ones included
    pub chunks_emitted: u64,

    /// Partial chunks flushed at shutdown
    pub chunks_drained: u64,

    /// Samples taken off the ingestion channel
    pub samples_received: u64,

    /// Samples lost to ingestion backpressure
    pub samples_dropped: u64,

    /// Samples for streams the session does not declare
    pub unknown_events: u64,

    pub duration: Duration,
    pub stop_reason: StopReason,
    pub active_streams: usize,
    pub active_sinks: usize,

    pub chunk_metrics: ChunkMetricsAggregator,
    pub assembler_stats: Vec<(String, AssemblerStats)>,
    pub sink_metrics: Vec<(String, dispatcher::MetricsSnapshot)>,
}

impl PipelineStats {
    /// Samples per second taken off the ingestion channel
    pub fn sample_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.samples_received as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of produced samples lost to backpressure, in percent
    pub fn drop_rate(&self) -> f64 {
        let total = self.samples_received + self.samples_dropped;
        if total > 0 {
            (self.samples_dropped as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Stop reason: {:?}", self.stop_reason);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Samples received: {}", self.samples_received);
        println!(
            "   ├─ Samples dropped (backpressure): {} ({:.2}%)",
            self.samples_dropped,
            self.drop_rate()
        );
        println!("   ├─ Unknown-stream samples: {}", self.unknown_events);
        println!("   ├─ Throughput: {:.1} samples/s", self.sample_rate());
        println!(
            "   ├─ Chunks: {} ({} drained)",
            self.chunks_emitted, self.chunks_drained
        );
        println!("   ├─ Streams: {}", self.active_streams);
        println!("   └─ Sinks: {}", self.active_sinks);

        if !self.assembler_stats.is_empty() {
            println!("\n⏱  Chunk Engine");
            for (i, (stream, s)) in self.assembler_stats.iter().enumerate() {
                let prefix = if i == self.assembler_stats.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                println!(
                    "   {} {}: ingested={}, late={}, reanchors={}, snaps={} (skipped {}), chunks={}",
                    prefix,
                    stream,
                    s.samples_ingested,
                    s.late_dropped,
                    s.reanchors,
                    s.boundary_snaps,
                    s.chunks_skipped,
                    s.chunks_emitted
                );
            }
        }

        if !self.sink_metrics.is_empty() {
            println!("\n📤 Sinks");
            for (i, (name, m)) in self.sink_metrics.iter().enumerate() {
                let prefix = if i == self.sink_metrics.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                println!(
                    "   {} {}: writes={}, failures={}, dropped={}, samples={}",
                    prefix, name, m.write_count, m.failure_count, m.dropped_count, m.samples_written
                );
            }
        }

        println!("\n{}", self.chunk_metrics.summary());
    }
}
