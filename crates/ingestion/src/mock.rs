//! Mock 采样源
//!
//! 无真实设备时生成固定频率的加速度流，可注入：
//! - 主机侧接收抖动 (`jitter_ms`)
//! - 设备时钟漂移 (`drift_ppm`)
//! - 周期性丢包 (`dropout_every` / `dropout_len`)，设备时钟照常前进

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use contracts::{MockSourceParams, RawSample, SampleCallback, SampleEvent, SampleSource, StreamId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

/// Mock 采样源配置
#[derive(Debug, Clone)]
pub struct MockSampleConfig {
    pub stream_id: StreamId,

    /// 名义采样率 (Hz)
    pub sample_rate_hz: f64,

    /// 设备时钟起点 (ms)
    pub device_start_ms: f64,

    /// 虚拟时钟起点 (秒, Unix epoch)；`None` 时取启动时刻
    pub start_wallclock: Option<f64>,

    pub params: MockSourceParams,
}

impl MockSampleConfig {
    pub fn new(stream_id: impl Into<StreamId>, sample_rate_hz: f64) -> Self {
        Self {
            stream_id: stream_id.into(),
            sample_rate_hz,
            device_start_ms: 0.0,
            start_wallclock: None,
            params: MockSourceParams::default(),
        }
    }

    pub fn with_params(mut self, params: MockSourceParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_start_wallclock(mut self, start: f64) -> Self {
        self.start_wallclock = Some(start);
        self
    }
}

/// Deterministic sample sequence behind `MockSampleSource`.
///
/// Yields `(nominal offset in seconds, event)`; the offset is what realtime
/// pacing sleeps against.
pub struct MockSampleGenerator {
    config: MockSampleConfig,
    start_wallclock: f64,
    rng: StdRng,
    position: u64,
    emitted: u64,
}

impl MockSampleGenerator {
    /// A dropout pattern that would swallow every position (`dropout_len`
    /// not below `dropout_every`) is disabled with a warning.
    pub fn new(mut config: MockSampleConfig, start_wallclock: f64) -> Self {
        let params = &mut config.params;
        if let Some(every) = params.dropout_every {
            if every == 0 || params.dropout_len >= every {
                warn!(
                    stream_id = %config.stream_id,
                    dropout_every = every,
                    dropout_len = params.dropout_len,
                    "dropout pattern covers every sample, disabling dropouts"
                );
                params.dropout_every = None;
            }
        }
        let rng = StdRng::seed_from_u64(config.params.seed);
        Self {
            config,
            start_wallclock,
            rng,
            position: 0,
            emitted: 0,
        }
    }

    fn in_dropout(&self, position: u64) -> bool {
        match self.config.params.dropout_every {
            Some(every) if self.config.params.dropout_len > 0 => {
                position % every >= every - self.config.params.dropout_len
            }
            _ => false,
        }
    }
}

impl Iterator for MockSampleGenerator {
    type Item = (f64, SampleEvent);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(limit) = self.config.params.sample_limit {
            if self.emitted >= limit {
                return None;
            }
        }

        let interval = 1.0 / self.config.sample_rate_hz;
        while self.in_dropout(self.position) {
            self.position += 1;
        }
        let position = self.position;
        self.position += 1;
        self.emitted += 1;

        let nominal = position as f64 * interval;
        let drift = 1.0 + self.config.params.drift_ppm * 1e-6;
        let device_epoch_ms = self.config.device_start_ms + nominal * drift * 1000.0;

        let jitter_s = self.config.params.jitter_ms / 1000.0;
        let delay = if jitter_s > 0.0 {
            self.rng.random_range(0.0..=jitter_s)
        } else {
            0.0
        };

        // Gravity on z plus a slow wobble on x/y
        let phase = std::f64::consts::TAU * 0.5 * nominal;
        let noise: f64 = self.rng.random_range(-0.01..=0.01);
        let sample = RawSample::new(
            device_epoch_ms,
            0.1 * phase.sin(),
            0.1 * phase.cos(),
            1.0 + noise,
        );

        let event = SampleEvent::new(
            self.config.stream_id.clone(),
            sample,
            self.start_wallclock + nominal + delay,
        );
        Some((nominal + delay, event))
    }
}

/// Mock 采样源
///
/// 在独立线程上生成数据。`realtime` 时按名义间隔睡眠并使用真实墙钟，
/// 否则尽快生成并使用合成的虚拟墙钟。
pub struct MockSampleSource {
    config: MockSampleConfig,
    running: Arc<AtomicBool>,
}

impl MockSampleSource {
    pub fn new(config: MockSampleConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &MockSampleConfig {
        &self.config
    }
}

impl SampleSource for MockSampleSource {
    fn stream_id(&self) -> &StreamId {
        &self.config.stream_id
    }

    fn listen(&self, callback: SampleCallback) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let config = self.config.clone();
        let running = self.running.clone();

        std::thread::spawn(move || {
            let realtime = config.params.realtime;
            let start_wallclock = config.start_wallclock.unwrap_or_else(unix_now);
            let started = Instant::now();
            let stream_id = config.stream_id.clone();

            debug!(
                stream_id = %stream_id,
                sample_rate_hz = config.sample_rate_hz,
                realtime,
                "mock sample source started"
            );

            let mut sent = 0u64;
            for (offset, mut event) in MockSampleGenerator::new(config, start_wallclock) {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                if realtime {
                    let due = Duration::try_from_secs_f64(offset.max(0.0)).unwrap_or(Duration::ZERO);
                    if let Some(wait) = due.checked_sub(started.elapsed()) {
                        std::thread::sleep(wait);
                    }
                    event.wallclock = unix_now();
                }
                trace!(
                    stream_id = %stream_id,
                    device_epoch_ms = event.sample.device_epoch_ms,
                    "mock sample emitted"
                );
                callback(event);
                sent += 1;
            }

            running.store(false, Ordering::SeqCst);
            debug!(stream_id = %stream_id, sent, "mock sample source stopped");
        });
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
