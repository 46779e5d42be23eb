//! Per-stream chunk assembly.
//!
//! Every sample goes through the timestamp corrector and axis calibration,
//! then lands in the open chunk keyed by its loss-aware timestamp. A chunk
//! is emitted when the first sample at or past `boundary + duration`
//! arrives; that sample opens the next chunk.

use contracts::{Chunk, ChunkerConfig, ContractError, CorrectedSample, RawSample};
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::calibration::AxisCalibration;
use crate::corrector::{LossDecision, TimestampCorrector};

/// Start of the chunk currently being filled
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChunkBoundary {
    /// No anchor yet; the first sample's floored loss-aware time becomes it
    Pending,
    Open { start: f64 },
}

impl ChunkBoundary {
    pub fn start(&self) -> Option<f64> {
        match self {
            ChunkBoundary::Pending => None,
            ChunkBoundary::Open { start } => Some(*start),
        }
    }
}

/// Counters kept per stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssemblerStats {
    pub samples_ingested: u64,
    /// Samples whose loss-aware time fell before the open boundary
    pub late_dropped: u64,
    pub reanchors: u64,
    /// Times the boundary jumped over empty windows
    pub boundary_snaps: u64,
    /// Total empty windows jumped over
    pub chunks_skipped: u64,
    pub chunks_emitted: u64,
}

#[derive(Debug)]
pub struct ChunkAssembler {
    config: ChunkerConfig,
    corrector: TimestampCorrector,
    calibration: AxisCalibration,
    boundary: ChunkBoundary,
    buffer: Vec<CorrectedSample>,
    next_index: u64,
    stats: AssemblerStats,
}

impl ChunkAssembler {
    /// # Errors
    /// `InvalidParameter` if the rate, duration or session begin is unusable.
    pub fn new(config: ChunkerConfig) -> Result<Self, ContractError> {
        config.check()?;
        let corrector = TimestampCorrector::new(config.sample_rate_hz)?;
        let boundary = match config.session_begin {
            Some(start) => ChunkBoundary::Open { start },
            None => ChunkBoundary::Pending,
        };

        Ok(Self {
            buffer: Vec::with_capacity(expected_chunk_len(&config)),
            config,
            corrector,
            calibration: AxisCalibration::builtin(),
            boundary,
            next_index: 0,
            stats: AssemblerStats::default(),
        })
    }

    pub fn with_calibration(mut self, calibration: AxisCalibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Feed one sample. Returns the completed chunk when this sample crosses
    /// the open chunk's end.
    #[instrument(
        level = "trace",
        name = "chunk_assembler_ingest",
        skip(self, sample),
        fields(stream_id = %self.config.stream_id, device_epoch_ms = sample.device_epoch_ms)
    )]
    pub fn ingest(
        &mut self,
        sample: &RawSample,
        wallclock_now: f64,
        device_model: &str,
    ) -> Option<Chunk> {
        let ts = self.corrector.correct(sample, wallclock_now);
        if ts.decision == LossDecision::Reanchored {
            self.stats.reanchors += 1;
            debug!(
                stream_id = %self.config.stream_id,
                ts_raw = ts.raw,
                "sample loss detected, loss-aware track re-anchored"
            );
            metrics::counter!(
                "stream_syncer_loss_reanchors_total",
                "stream_id" => self.config.stream_id.to_string()
            )
            .increment(1);
        }

        let (x, y, z) = self.calibration.apply(device_model, sample.x, sample.y, sample.z);
        let corrected = CorrectedSample {
            ts_raw: ts.raw,
            ts_drift_free: ts.drift_free,
            ts_loss_aware: ts.loss_aware,
            ts_wallclock: wallclock_now,
            x,
            y,
            z,
            index: self.next_index,
        };
        // Index counts every sample, including ones dropped below
        self.next_index += 1;
        self.stats.samples_ingested += 1;

        let ts_loss_aware = corrected.ts_loss_aware;
        let mut start = match self.boundary {
            ChunkBoundary::Open { start } => start,
            ChunkBoundary::Pending => ts_loss_aware.floor(),
        };

        if ts_loss_aware < start {
            self.stats.late_dropped += 1;
            trace!(
                stream_id = %self.config.stream_id,
                ts_loss_aware,
                boundary = start,
                "sample before chunk boundary dropped"
            );
            metrics::counter!(
                "stream_syncer_late_samples_total",
                "stream_id" => self.config.stream_id.to_string()
            )
            .increment(1);
            self.boundary = ChunkBoundary::Open { start };
            return None;
        }

        let duration = self.config.chunk_duration_s;
        if self.buffer.is_empty() && ts_loss_aware - start >= duration {
            let skipped = ((ts_loss_aware - start) / duration).floor();
            start += skipped * duration;
            self.stats.boundary_snaps += 1;
            self.stats.chunks_skipped += skipped as u64;
            debug!(
                stream_id = %self.config.stream_id,
                skipped,
                boundary = start,
                "boundary snapped over empty windows"
            );
            metrics::counter!(
                "stream_syncer_boundary_snaps_total",
                "stream_id" => self.config.stream_id.to_string()
            )
            .increment(1);
        }

        let emitted = if ts_loss_aware - start >= duration {
            let chunk = self.take_chunk(start, device_model);
            start += duration;
            chunk
        } else {
            None
        };

        self.boundary = ChunkBoundary::Open { start };
        self.buffer.push(corrected);
        emitted
    }

    /// Ingest using the configured device model.
    pub fn ingest_configured(&mut self, sample: &RawSample, wallclock_now: f64) -> Option<Chunk> {
        let model = self.config.device_model.clone();
        self.ingest(sample, wallclock_now, &model)
    }

    /// Flush the partially filled chunk at end of stream.
    ///
    /// The boundary stays where it is.
    #[instrument(name = "chunk_assembler_drain", skip(self), fields(stream_id = %self.config.stream_id))]
    pub fn drain(&mut self) -> Option<Chunk> {
        let start = self.boundary.start()?;
        let model = self.config.device_model.clone();
        self.take_chunk(start, &model)
    }

    fn take_chunk(&mut self, boundary: f64, device_model: &str) -> Option<Chunk> {
        if self.buffer.is_empty() {
            return None;
        }
        let samples = std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(expected_chunk_len(&self.config)),
        );

        self.stats.chunks_emitted += 1;
        let chunk = Chunk {
            chunk_id: self.stats.chunks_emitted,
            stream_id: self.config.stream_id.clone(),
            device_model: device_model.to_string(),
            boundary,
            duration: self.config.chunk_duration_s,
            samples,
        };

        debug!(
            stream_id = %chunk.stream_id,
            chunk_id = chunk.chunk_id,
            boundary,
            samples = chunk.len(),
            "chunk completed"
        );
        metrics::counter!(
            "stream_syncer_chunks_total",
            "stream_id" => chunk.stream_id.to_string()
        )
        .increment(1);
        metrics::histogram!(
            "stream_syncer_chunk_samples",
            "stream_id" => chunk.stream_id.to_string()
        )
        .record(chunk.len() as f64);

        Some(chunk)
    }

    pub fn boundary(&self) -> ChunkBoundary {
        self.boundary
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    pub fn corrector(&self) -> &TimestampCorrector {
        &self.corrector
    }
}

fn expected_chunk_len(config: &ChunkerConfig) -> usize {
    let expected = (config.sample_rate_hz * config.chunk_duration_s).ceil();
    if expected.is_finite() && expected > 0.0 {
        (expected as usize).min(1 << 16)
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::METAMOTION_R;

    fn config(rate: f64, duration: f64) -> ChunkerConfig {
        ChunkerConfig::new("acc-0", "NA", rate, duration)
    }

    /// Feed `count` evenly spaced samples starting at device time 0 and
    /// wall-clock `wall_start`, collecting emitted chunks.
    fn feed(
        assembler: &mut ChunkAssembler,
        rate: f64,
        wall_start: f64,
        range: std::ops::Range<u64>,
    ) -> Vec<Chunk> {
        let interval = 1.0 / rate;
        range
            .filter_map(|i| {
                let sample = RawSample::new(i as f64 * interval * 1000.0, 0.1, 0.2, 0.3);
                assembler.ingest(&sample, wall_start + i as f64 * interval, "NA")
            })
            .collect()
    }

    #[test]
    fn test_first_sample_scenario() {
        let mut assembler = ChunkAssembler::new(
            ChunkerConfig::new("acc-0", METAMOTION_R, 50.0, 10.0),
        )
        .unwrap();

        let out = assembler.ingest(&RawSample::new(0.0, 1.0, 2.0, 3.0), 1000.0, METAMOTION_R);
        assert!(out.is_none());
        assert_eq!(assembler.boundary(), ChunkBoundary::Open { start: 1000.0 });
        assert_eq!(assembler.buffered_len(), 1);

        let chunk = assembler.drain().unwrap();
        let sample = chunk.samples[0];
        assert_eq!(sample.index, 0);
        assert!((sample.ts_raw - 1000.0).abs() < 1e-9);
        assert_eq!((sample.x, sample.y, sample.z), (2.0, -1.0, 3.0));
        assert_eq!(chunk.device_model, METAMOTION_R);
    }

    #[test]
    fn test_chunks_partition_uniform_stream() {
        // 4 Hz, 1 s chunks, every timestamp exact
        let mut assembler = ChunkAssembler::new(config(4.0, 1.0)).unwrap();
        let chunks = feed(&mut assembler, 4.0, 1000.0, 0..41);

        assert_eq!(chunks.len(), 10);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, i as u64 + 1);
            assert_eq!(chunk.boundary, 1000.0 + i as f64);
            assert_eq!(chunk.len(), 4);
            for sample in &chunk.samples {
                assert!(sample.ts_loss_aware >= chunk.boundary);
                assert!(sample.ts_loss_aware < chunk.end());
            }
        }
        // Sample 40 opened the eleventh chunk
        assert_eq!(assembler.buffered_len(), 1);
        assert_eq!(assembler.boundary(), ChunkBoundary::Open { start: 1010.0 });
    }

    #[test]
    fn test_nominal_rate_chunks_hold_exact_count() {
        // 50 Hz, 10 s chunks: 500 samples each, both at epoch zero and today
        for start in [0.0, 1_700_000_000.0] {
            let mut assembler = ChunkAssembler::new(config(50.0, 10.0)).unwrap();
            let chunks: Vec<Chunk> = (0..1501u64)
                .filter_map(|i| {
                    let sample = RawSample::new(i as f64 * 20.0, 0.1, 0.2, 0.3);
                    assembler.ingest(&sample, start + i as f64 * 0.02, "NA")
                })
                .collect();

            let shape: Vec<(f64, usize)> =
                chunks.iter().map(|c| (c.boundary, c.len())).collect();
            assert_eq!(
                shape,
                vec![(start, 500), (start + 10.0, 500), (start + 20.0, 500)]
            );
            assert_eq!(chunks[1].samples[0].index, 500);
            assert_eq!(assembler.buffered_len(), 1);
        }
    }

    #[test]
    fn test_emission_on_first_sample_past_end() {
        let mut assembler = ChunkAssembler::new(config(4.0, 1.0)).unwrap();
        let chunks = feed(&mut assembler, 4.0, 1000.0, 0..4);
        assert!(chunks.is_empty());
        assert_eq!(assembler.buffered_len(), 4);

        // ts 1001.0 is exactly boundary + duration
        let chunks = feed(&mut assembler, 4.0, 1000.0, 4..5);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4);
        assert_eq!(assembler.buffered_len(), 1);
    }

    #[test]
    fn test_boundary_snaps_over_empty_windows() {
        // Fixed anchor at 0, first sample at 3605.5 with 10 s chunks
        let mut assembler =
            ChunkAssembler::new(config(50.0, 10.0).with_session_begin(0.0)).unwrap();

        let out = assembler.ingest(&RawSample::new(0.0, 0.0, 0.0, 1.0), 3605.5, "NA");
        assert!(out.is_none());
        assert_eq!(assembler.boundary(), ChunkBoundary::Open { start: 3600.0 });
        assert_eq!(assembler.buffered_len(), 1);

        let stats = assembler.stats();
        assert_eq!(stats.boundary_snaps, 1);
        assert_eq!(stats.chunks_skipped, 360);
        assert_eq!(stats.chunks_emitted, 0);
    }

    #[test]
    fn test_sample_before_boundary_dropped() {
        let mut assembler =
            ChunkAssembler::new(config(50.0, 10.0).with_session_begin(2000.0)).unwrap();

        let out = assembler.ingest(&RawSample::new(0.0, 0.0, 0.0, 1.0), 1990.0, "NA");
        assert!(out.is_none());
        assert_eq!(assembler.buffered_len(), 0);
        assert_eq!(assembler.stats().late_dropped, 1);

        // Index still advanced
        assembler.ingest(&RawSample::new(10_000.0, 0.0, 0.0, 1.0), 2000.0, "NA");
        let chunk = assembler.drain().unwrap();
        assert_eq!(chunk.samples[0].index, 1);
        assert_eq!(chunk.boundary, 2000.0);
    }

    #[test]
    fn test_pending_boundary_floors_first_sample() {
        let mut assembler = ChunkAssembler::new(config(50.0, 10.0)).unwrap();
        assert_eq!(assembler.boundary(), ChunkBoundary::Pending);

        assembler.ingest(&RawSample::new(0.0, 0.0, 0.0, 1.0), 1234.75, "NA");
        assert_eq!(assembler.boundary(), ChunkBoundary::Open { start: 1234.0 });
    }

    #[test]
    fn test_reanchor_does_not_touch_emitted_chunks() {
        let mut assembler = ChunkAssembler::new(config(4.0, 1.0)).unwrap();
        let first = feed(&mut assembler, 4.0, 1000.0, 0..5);
        assert_eq!(first.len(), 1);
        let snapshot = first[0].clone();

        // Six samples lost on both clocks
        let rest = feed(&mut assembler, 4.0, 1000.0, 11..20);
        assert_eq!(assembler.stats().reanchors, 1);
        assert_eq!(first[0], snapshot);

        let all_ts: Vec<f64> = rest
            .iter()
            .flat_map(|c| c.samples.iter().map(|s| s.ts_loss_aware))
            .collect();
        assert!(all_ts.windows(2).all(|w| w[0] < w[1]));
        assert!(all_ts.iter().any(|&ts| ts == 1002.75));
    }

    #[test]
    fn test_drain_returns_partial_chunk_once() {
        let mut assembler = ChunkAssembler::new(config(4.0, 1.0)).unwrap();
        assert!(assembler.drain().is_none());

        feed(&mut assembler, 4.0, 1000.0, 0..3);
        let chunk = assembler.drain().unwrap();
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.boundary, 1000.0);
        assert!(assembler.drain().is_none());
        assert_eq!(assembler.stats().chunks_emitted, 1);
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(ChunkAssembler::new(config(0.0, 10.0)).is_err());
        assert!(ChunkAssembler::new(config(50.0, 0.0)).is_err());
        assert!(ChunkAssembler::new(config(50.0, f64::NAN)).is_err());
    }
}
