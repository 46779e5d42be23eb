//! Chunk 指标收集模块
//!
//! 基于输出的 `Chunk` 统计时间戳校正质量：
//! - raw 与 loss-aware 的偏差 (设备时钟漂移 / 丢包重锚)
//! - 墙钟与 loss-aware 的偏差 (主机接收延迟)
//! - 每块样本数

use std::collections::BTreeMap;

use contracts::Chunk;
use metrics::{gauge, histogram};

/// 从 Chunk 记录指标
///
/// 计数类指标 (chunks_total 等) 由 chunk engine 自己记录，这里只记录
/// 需要遍历样本才能得到的质量指标。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_chunk_metrics;
///
/// if let Some(chunk) = chunker.push(event) {
///     record_chunk_metrics(&chunk);
/// }
/// ```
pub fn record_chunk_metrics(chunk: &Chunk) {
    let stream_id = chunk.stream_id.to_string();

    gauge!("stream_syncer_last_chunk_id", "stream_id" => stream_id.clone())
        .set(chunk.chunk_id as f64);
    gauge!("stream_syncer_last_chunk_boundary", "stream_id" => stream_id.clone())
        .set(chunk.boundary);

    if let Some((first, last)) = chunk.span() {
        histogram!("stream_syncer_chunk_coverage_ratio", "stream_id" => stream_id.clone())
            .record(((last - first) / chunk.duration).clamp(0.0, 1.0));
    }

    for sample in &chunk.samples {
        histogram!("stream_syncer_raw_divergence_ms", "stream_id" => stream_id.clone())
            .record((sample.ts_raw - sample.ts_loss_aware).abs() * 1000.0);
        histogram!("stream_syncer_wallclock_lag_ms", "stream_id" => stream_id.clone())
            .record((sample.ts_wallclock - sample.ts_loss_aware) * 1000.0);
    }
}

/// 记录队列深度 (ingestion 通道或 sink 队列)
pub fn record_queue_depth(queue: &str, depth: usize) {
    gauge!("stream_syncer_queue_depth", "queue" => queue.to_string()).set(depth as f64);
}

/// 单个 stream 的聚合统计
#[derive(Debug, Clone, Default)]
pub struct StreamAggregate {
    pub chunks: u64,
    pub samples: u64,
    pub first_boundary: Option<f64>,
    pub last_boundary: Option<f64>,
    /// 每块样本数
    pub chunk_sizes: RunningStats,
    /// |raw - loss_aware| (ms)
    pub raw_divergence_ms: RunningStats,
    /// wallclock - loss_aware (ms)
    pub wallclock_lag_ms: RunningStats,
}

/// Chunk 指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct ChunkMetricsAggregator {
    streams: BTreeMap<String, StreamAggregate>,
}

impl ChunkMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &Chunk) {
        let entry = self
            .streams
            .entry(chunk.stream_id.to_string())
            .or_default();

        entry.chunks += 1;
        entry.samples += chunk.len() as u64;
        entry.first_boundary.get_or_insert(chunk.boundary);
        entry.last_boundary = Some(chunk.boundary);
        entry.chunk_sizes.push(chunk.len() as f64);

        for sample in &chunk.samples {
            entry
                .raw_divergence_ms
                .push((sample.ts_raw - sample.ts_loss_aware).abs() * 1000.0);
            entry
                .wallclock_lag_ms
                .push((sample.ts_wallclock - sample.ts_loss_aware) * 1000.0);
        }
    }

    pub fn stream(&self, stream_id: &str) -> Option<&StreamAggregate> {
        self.streams.get(stream_id)
    }

    pub fn total_chunks(&self) -> u64 {
        self.streams.values().map(|s| s.chunks).sum()
    }

    pub fn total_samples(&self) -> u64 {
        self.streams.values().map(|s| s.samples).sum()
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_chunks: self.total_chunks(),
            total_samples: self.total_samples(),
            streams: self
                .streams
                .iter()
                .map(|(id, agg)| StreamSummary {
                    stream_id: id.clone(),
                    chunks: agg.chunks,
                    samples: agg.samples,
                    first_boundary: agg.first_boundary,
                    last_boundary: agg.last_boundary,
                    chunk_size: StatsSummary::from(&agg.chunk_sizes),
                    raw_divergence_ms: StatsSummary::from(&agg.raw_divergence_ms),
                    wallclock_lag_ms: StatsSummary::from(&agg.wallclock_lag_ms),
                })
                .collect(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_chunks: u64,
    pub total_samples: u64,
    pub streams: Vec<StreamSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    pub stream_id: String,
    pub chunks: u64,
    pub samples: u64,
    pub first_boundary: Option<f64>,
    pub last_boundary: Option<f64>,
    pub chunk_size: StatsSummary,
    pub raw_divergence_ms: StatsSummary,
    pub wallclock_lag_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Chunk Metrics Summary ===")?;
        writeln!(f, "Total chunks: {}", self.total_chunks)?;
        writeln!(f, "Total samples: {}", self.total_samples)?;

        for stream in &self.streams {
            writeln!(f, "[{}]", stream.stream_id)?;
            writeln!(f, "  chunks: {}, samples: {}", stream.chunks, stream.samples)?;
            if let (Some(first), Some(last)) = (stream.first_boundary, stream.last_boundary) {
                writeln!(f, "  boundaries: {first:.3} .. {last:.3}")?;
            }
            writeln!(f, "  chunk size: {}", stream.chunk_size)?;
            writeln!(f, "  raw divergence (ms): {}", stream.raw_divergence_ms)?;
            writeln!(f, "  wall-clock lag (ms): {}", stream.wallclock_lag_ms)?;
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::CorrectedSample;

    fn chunk(stream: &str, chunk_id: u64, boundary: f64, lags_ms: &[f64]) -> Chunk {
        let samples = lags_ms
            .iter()
            .enumerate()
            .map(|(i, lag)| {
                let ts = boundary + i as f64 * 0.02;
                CorrectedSample {
                    ts_raw: ts + 0.001,
                    ts_drift_free: ts,
                    ts_loss_aware: ts,
                    ts_wallclock: ts + lag / 1000.0,
                    x: 0.0,
                    y: 0.0,
                    z: 1.0,
                    index: i as u64,
                }
            })
            .collect();
        Chunk {
            chunk_id,
            stream_id: stream.into(),
            device_model: "NA".into(),
            boundary,
            duration: 10.0,
            samples,
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = ChunkMetricsAggregator::new();
        aggregator.update(&chunk("left", 1, 1000.0, &[1.0, 2.0, 3.0]));
        aggregator.update(&chunk("left", 2, 1010.0, &[4.0]));
        aggregator.update(&chunk("right", 1, 1000.0, &[0.0, 0.0]));

        assert_eq!(aggregator.total_chunks(), 3);
        assert_eq!(aggregator.total_samples(), 6);

        let left = aggregator.stream("left").unwrap();
        assert_eq!(left.chunks, 2);
        assert_eq!(left.first_boundary, Some(1000.0));
        assert_eq!(left.last_boundary, Some(1010.0));
        assert!((left.wallclock_lag_ms.mean() - 2.5).abs() < 1e-6);
        assert!((left.raw_divergence_ms.mean() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = ChunkMetricsAggregator::new();
        aggregator.update(&chunk("left", 1, 1000.0, &[1.0, 1.0]));

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Total chunks: 1"));
        assert!(output.contains("[left]"));
        assert!(output.contains("chunks: 1, samples: 2"));
    }
}
