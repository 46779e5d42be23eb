//! Session chunker: routes sample events to per-stream assemblers.

use std::collections::HashMap;

use contracts::{Chunk, ChunkerConfig, ContractError, SampleEvent, StreamId};
use tracing::{info, instrument, warn};

use crate::assembler::{AssemblerStats, ChunkAssembler};
use crate::calibration::AxisCalibration;

/// All streams of one recording session.
///
/// Streams are independent; only the optional shared session begin ties
/// their boundaries together.
#[derive(Debug)]
pub struct SessionChunker {
    assemblers: HashMap<StreamId, ChunkAssembler>,
    /// Registration order, used for deterministic draining
    order: Vec<StreamId>,
    unknown_events: u64,
}

impl SessionChunker {
    /// # Errors
    /// `ConfigValidation` on duplicate stream ids, or any per-stream
    /// parameter error.
    pub fn new(configs: impl IntoIterator<Item = ChunkerConfig>) -> Result<Self, ContractError> {
        Self::with_calibration(configs, AxisCalibration::builtin())
    }

    pub fn with_calibration(
        configs: impl IntoIterator<Item = ChunkerConfig>,
        calibration: AxisCalibration,
    ) -> Result<Self, ContractError> {
        let mut assemblers = HashMap::new();
        let mut order = Vec::new();

        for config in configs {
            let stream_id = config.stream_id.clone();
            if assemblers.contains_key(&stream_id) {
                return Err(ContractError::config_validation(
                    "streams",
                    format!("duplicate stream id: {}", stream_id),
                ));
            }
            let assembler = ChunkAssembler::new(config)?.with_calibration(calibration.clone());
            assemblers.insert(stream_id.clone(), assembler);
            order.push(stream_id);
        }

        info!(streams = order.len(), "session chunker ready");

        Ok(Self {
            assemblers,
            order,
            unknown_events: 0,
        })
    }

    /// Route one event to its stream.
    ///
    /// Events for unregistered streams are counted and discarded.
    #[instrument(
        level = "trace",
        name = "session_chunker_push",
        skip(self, event),
        fields(stream_id = %event.stream_id, wallclock = event.wallclock)
    )]
    pub fn push(&mut self, event: SampleEvent) -> Option<Chunk> {
        let Some(assembler) = self.assemblers.get_mut(&event.stream_id) else {
            self.unknown_events += 1;
            warn!(stream_id = %event.stream_id, "sample for unknown stream discarded");
            metrics::counter!("stream_syncer_unknown_samples_total").increment(1);
            return None;
        };

        metrics::counter!(
            "stream_syncer_samples_total",
            "stream_id" => event.stream_id.to_string()
        )
        .increment(1);

        assembler.ingest_configured(&event.sample, event.wallclock)
    }

    /// Flush every stream's partial chunk, in registration order.
    #[instrument(name = "session_chunker_drain_all", skip(self))]
    pub fn drain_all(&mut self) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for stream_id in &self.order {
            if let Some(chunk) = self
                .assemblers
                .get_mut(stream_id)
                .and_then(ChunkAssembler::drain)
            {
                chunks.push(chunk);
            }
        }
        chunks
    }

    pub fn stats(&self, stream_id: &str) -> Option<AssemblerStats> {
        self.assemblers.get(stream_id).map(ChunkAssembler::stats)
    }

    pub fn assembler(&self, stream_id: &str) -> Option<&ChunkAssembler> {
        self.assemblers.get(stream_id)
    }

    pub fn stream_ids(&self) -> &[StreamId] {
        &self.order
    }

    pub fn stream_count(&self) -> usize {
        self.order.len()
    }

    pub fn unknown_events(&self) -> u64 {
        self.unknown_events
    }

    /// Chunks emitted across all streams, drained ones included
    pub fn chunk_count(&self) -> u64 {
        self.assemblers
            .values()
            .map(|a| a.stats().chunks_emitted)
            .sum()
    }
}
