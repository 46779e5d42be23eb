//! Per-stream chunk engine configuration shared across crates.

use serde::{Deserialize, Serialize};

use crate::{ContractError, StreamId};

/// Construction parameters for one stream's corrector/assembler pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Stream this configuration applies to
    pub stream_id: StreamId,

    /// Device model (axis calibration key)
    pub device_model: String,

    /// Nominal sample rate (Hz), must be > 0
    pub sample_rate_hz: f64,

    /// Chunk duration (seconds), must be > 0
    pub chunk_duration_s: f64,

    /// Shared session boundary (seconds since Unix epoch); `None` = first sample
    #[serde(default)]
    pub session_begin: Option<f64>,
}

impl ChunkerConfig {
    pub fn new(
        stream_id: impl Into<StreamId>,
        device_model: impl Into<String>,
        sample_rate_hz: f64,
        chunk_duration_s: f64,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            device_model: device_model.into(),
            sample_rate_hz,
            chunk_duration_s,
            session_begin: None,
        }
    }

    /// Use an externally supplied session boundary
    pub fn with_session_begin(mut self, session_begin: f64) -> Self {
        self.session_begin = Some(session_begin);
        self
    }

    /// Expected spacing between samples (seconds)
    #[inline]
    pub fn sample_interval(&self) -> f64 {
        1.0 / self.sample_rate_hz
    }

    /// Reject parameters the engine cannot work with
    pub fn check(&self) -> Result<(), ContractError> {
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(ContractError::invalid_parameter(
                "sample_rate_hz",
                self.sample_rate_hz,
                "must be a finite value > 0",
            ));
        }
        if !self.chunk_duration_s.is_finite() || self.chunk_duration_s <= 0.0 {
            return Err(ContractError::invalid_parameter(
                "chunk_duration_s",
                self.chunk_duration_s,
                "must be a finite value > 0",
            ));
        }
        if let Some(begin) = self.session_begin {
            if !begin.is_finite() {
                return Err(ContractError::invalid_parameter(
                    "session_begin",
                    begin,
                    "must be finite",
                ));
            }
        }
        Ok(())
    }
}
