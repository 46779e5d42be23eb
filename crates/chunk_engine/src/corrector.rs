//! Per-sample timestamp correction.
//!
//! Turns the device's millisecond counter into three timelines on the host
//! wall-clock scale:
//!
//! - **raw**: device clock shifted by an offset latched on the first sample
//! - **drift-free**: perfect grid at the nominal interval, assumes no loss
//! - **loss-aware**: grid that re-anchors to raw when a real gap is detected
//!
//! The state machine keeps only the previous sample's values; no window is
//! buffered.

use contracts::{ContractError, RawSample};
use serde::Serialize;
use tracing::warn;

/// Gap tolerance, in sample intervals, before a jump is treated as loss.
pub const LOSS_THRESHOLD_INTERVALS: f64 = 2.0;

/// Which branch produced the loss-aware timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LossDecision {
    /// First sample, seeded from raw
    Seeded,
    /// Wall-clock gap within tolerance, advanced one interval
    Cadence,
    /// Wall-clock gap too large but previous estimate still close to raw
    InSync,
    /// Apparent gap resolved to ordinary drift, advanced one interval
    Drift,
    /// Real loss, jumped to raw
    Reanchored,
}

/// Output of one correction step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampSet {
    pub raw: f64,
    pub drift_free: f64,
    pub loss_aware: f64,
    /// Wall-clock time since the previous sample (0 on the first sample,
    /// clamped to 0 on clock regression)
    pub wallclock_delta: f64,
    pub decision: LossDecision,
}

/// Grid position: an anchor plus a whole number of intervals past it.
///
/// Values are computed as `anchor + steps * interval` rather than summed one
/// interval at a time, so a long run lands exactly on chunk boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPosition {
    anchor: f64,
    steps: u64,
}

impl GridPosition {
    fn seeded(anchor: f64) -> Self {
        Self { anchor, steps: 0 }
    }

    fn at(&self, sample_interval: f64) -> f64 {
        self.anchor + self.steps as f64 * sample_interval
    }

    fn step(&self) -> Self {
        Self {
            anchor: self.anchor,
            steps: self.steps + 1,
        }
    }

    pub fn anchor(&self) -> f64 {
        self.anchor
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

/// Values carried from one sample to the next once anchored
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    wallclock_offset: f64,
    last_wallclock: f64,
    drift_free: GridPosition,
    loss_aware: GridPosition,
    prev_drift_free: f64,
    prev_loss_aware: f64,
}

impl Track {
    /// Offset between device clock and wall clock, fixed at the first sample
    pub fn wallclock_offset(&self) -> f64 {
        self.wallclock_offset
    }

    pub fn last_wallclock(&self) -> f64 {
        self.last_wallclock
    }

    pub fn prev_drift_free(&self) -> f64 {
        self.prev_drift_free
    }

    pub fn prev_loss_aware(&self) -> f64 {
        self.prev_loss_aware
    }

    /// Anchor of the loss-aware grid; moves only on re-anchoring
    pub fn loss_aware_grid(&self) -> GridPosition {
        self.loss_aware
    }
}

/// Corrector state: nothing seen yet, or anchored to the first sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CorrectorState {
    #[default]
    Unanchored,
    Anchored(Track),
}

impl CorrectorState {
    /// Pure transition: `(state, sample, now) -> (next state, timestamps)`.
    ///
    /// The offset in an `Anchored` state is copied forward untouched.
    pub fn advance(
        &self,
        sample_interval: f64,
        sample: &RawSample,
        wallclock_now: f64,
    ) -> (CorrectorState, TimestampSet) {
        let device_s = sample.device_epoch_s();

        match *self {
            CorrectorState::Unanchored => {
                let wallclock_offset = wallclock_now - device_s;
                let raw = device_s + wallclock_offset;
                let track = Track {
                    wallclock_offset,
                    last_wallclock: wallclock_now,
                    drift_free: GridPosition::seeded(raw),
                    loss_aware: GridPosition::seeded(raw),
                    prev_drift_free: raw,
                    prev_loss_aware: raw,
                };
                let set = TimestampSet {
                    raw,
                    drift_free: raw,
                    loss_aware: raw,
                    wallclock_delta: 0.0,
                    decision: LossDecision::Seeded,
                };
                (CorrectorState::Anchored(track), set)
            }
            CorrectorState::Anchored(track) => {
                let raw = device_s + track.wallclock_offset;
                let drift_grid = track.drift_free.step();
                let drift_free = drift_grid.at(sample_interval);
                let wallclock_delta = (wallclock_now - track.last_wallclock).max(0.0);

                let candidate = track.loss_aware.step();
                let decision = resolve_loss_aware(
                    sample_interval,
                    raw,
                    track.prev_loss_aware,
                    candidate.at(sample_interval),
                    wallclock_delta,
                );
                let loss_grid = match decision {
                    LossDecision::Reanchored => GridPosition::seeded(raw),
                    _ => candidate,
                };
                let loss_aware = loss_grid.at(sample_interval);

                let next = Track {
                    wallclock_offset: track.wallclock_offset,
                    last_wallclock: wallclock_now,
                    drift_free: drift_grid,
                    loss_aware: loss_grid,
                    prev_drift_free: drift_free,
                    prev_loss_aware: loss_aware,
                };
                let set = TimestampSet {
                    raw,
                    drift_free,
                    loss_aware,
                    wallclock_delta,
                    decision,
                };
                (CorrectorState::Anchored(next), set)
            }
        }
    }

    pub fn track(&self) -> Option<&Track> {
        match self {
            CorrectorState::Unanchored => None,
            CorrectorState::Anchored(track) => Some(track),
        }
    }
}

/// Pick the loss-aware branch from the previous estimate, the one-interval
/// candidate and the wall-clock gap.
///
/// Branches are evaluated in order; the threshold is `2 × interval` for all.
fn resolve_loss_aware(
    sample_interval: f64,
    raw: f64,
    prev_loss_aware: f64,
    no_loss: f64,
    wallclock_gap: f64,
) -> LossDecision {
    let threshold = LOSS_THRESHOLD_INTERVALS * sample_interval;

    if wallclock_gap <= threshold {
        LossDecision::Cadence
    } else if (prev_loss_aware - raw).abs() < threshold {
        LossDecision::InSync
    } else if raw - no_loss > threshold {
        LossDecision::Reanchored
    } else {
        LossDecision::Drift
    }
}

/// Timestamp corrector for one device stream
#[derive(Debug, Clone)]
pub struct TimestampCorrector {
    sample_interval: f64,
    state: CorrectorState,
}

impl TimestampCorrector {
    /// # Errors
    /// `InvalidParameter` if `sample_rate_hz` is not a finite value > 0.
    pub fn new(sample_rate_hz: f64) -> Result<Self, ContractError> {
        if !sample_rate_hz.is_finite() || sample_rate_hz <= 0.0 {
            return Err(ContractError::invalid_parameter(
                "sample_rate_hz",
                sample_rate_hz,
                "must be a finite value > 0",
            ));
        }
        Ok(Self {
            sample_interval: 1.0 / sample_rate_hz,
            state: CorrectorState::Unanchored,
        })
    }

    /// Correct one sample received at `wallclock_now` (seconds since epoch).
    pub fn correct(&mut self, sample: &RawSample, wallclock_now: f64) -> TimestampSet {
        if let Some(track) = self.state.track() {
            if wallclock_now < track.last_wallclock {
                warn!(
                    wallclock_now,
                    last_wallclock = track.last_wallclock,
                    "wall clock went backwards, clamping delta to zero"
                );
            }
        }

        let (next, set) = self
            .state
            .advance(self.sample_interval, sample, wallclock_now);
        self.state = next;
        set
    }

    pub fn sample_interval(&self) -> f64 {
        self.sample_interval
    }

    pub fn state(&self) -> &CorrectorState {
        &self.state
    }

    /// Latched offset, `None` before the first sample
    pub fn wallclock_offset(&self) -> Option<f64> {
        self.state.track().map(Track::wallclock_offset)
    }
}
