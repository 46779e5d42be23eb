//! Sample types - source output and corrector output

use serde::{Deserialize, Serialize};

use crate::StreamId;

/// One raw accelerometer sample as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Device's own millisecond counter (not synchronized to the host)
    pub device_epoch_ms: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl RawSample {
    pub fn new(device_epoch_ms: f64, x: f64, y: f64, z: f64) -> Self {
        Self {
            device_epoch_ms,
            x,
            y,
            z,
        }
    }

    /// Device epoch in seconds
    #[inline]
    pub fn device_epoch_s(&self) -> f64 {
        self.device_epoch_ms / 1000.0
    }
}

/// A raw sample together with the host wall clock captured at reception.
///
/// Produced by a `SampleSource` callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEvent {
    pub stream_id: StreamId,
    pub sample: RawSample,
    /// Seconds since Unix epoch
    pub wallclock: f64,
}

impl SampleEvent {
    pub fn new(stream_id: impl Into<StreamId>, sample: RawSample, wallclock: f64) -> Self {
        Self {
            stream_id: stream_id.into(),
            sample,
            wallclock,
        }
    }
}

/// Sample with all corrected timestamps (seconds since Unix epoch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectedSample {
    /// Device clock shifted by the first-sample offset
    pub ts_raw: f64,
    /// Perfect grid, assumes no loss
    pub ts_drift_free: f64,
    /// Authoritative timeline, re-anchored on real loss
    pub ts_loss_aware: f64,
    /// Host reception time
    pub ts_wallclock: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Per-stream sequence number
    pub index: u64,
}
