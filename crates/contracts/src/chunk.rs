//! Chunk - Chunk engine output
//!
//! Fixed-duration block of corrected samples for one stream.

use serde::{Deserialize, Serialize};

use crate::{CorrectedSample, StreamId};

/// Completed chunk
///
/// Samples are in arrival order. Emitted once; the engine keeps no reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Per-stream emission counter (starts at 1)
    pub chunk_id: u64,

    /// Owning stream
    pub stream_id: StreamId,

    /// Device model used for axis calibration
    pub device_model: String,

    /// Boundary that opened this chunk (seconds since Unix epoch)
    pub boundary: f64,

    /// Nominal chunk length (seconds)
    pub duration: f64,

    /// Buffered samples
    pub samples: Vec<CorrectedSample>,
}

impl Chunk {
    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Exclusive end of the chunk window
    pub fn end(&self) -> f64 {
        self.boundary + self.duration
    }

    /// Loss-aware timestamp span covered by the samples
    pub fn span(&self) -> Option<(f64, f64)> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        Some((first.ts_loss_aware, last.ts_loss_aware))
    }
}
