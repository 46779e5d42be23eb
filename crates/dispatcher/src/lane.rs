//! Sink lane: a bounded chunk queue in front of one sink, drained by its own task.
//!
//! A full queue costs that sink the newest chunk and nothing else; the other
//! lanes and the chunk engine never wait on it.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{Chunk, DataSink};

use crate::metrics::{MetricsSnapshot, SinkMetrics};

/// What happened to a chunk offered to a lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Queue full, chunk dropped for this sink
    Dropped,
    /// Worker is gone
    Closed,
}

/// One sink behind its own queue and worker task
pub struct SinkLane {
    name: Arc<str>,
    queue: mpsc::Sender<Arc<Chunk>>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<()>,
}

impl SinkLane {
    /// Start the worker for `sink` with room for `capacity` chunks.
    pub fn open<S: DataSink + Send + 'static>(sink: S, capacity: usize) -> Self {
        let name: Arc<str> = Arc::from(sink.name());
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker = LaneWorker {
            dispatched: ::metrics::counter!(
                "stream_syncer_chunks_dispatched_total",
                "sink" => name.to_string()
            ),
            sink,
            rx,
            metrics: Arc::clone(&metrics),
            name: Arc::clone(&name),
        };

        Self {
            name,
            queue,
            metrics,
            worker: tokio::spawn(worker.run()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Hand a chunk to the lane without waiting.
    pub fn offer(&self, chunk: Arc<Chunk>) -> Offer {
        match self.queue.try_send(chunk) {
            Ok(()) => {
                let queued = self.queue.max_capacity() - self.queue.capacity();
                self.metrics.set_queue_len(queued);
                Offer::Queued
            }
            Err(TrySendError::Full(chunk)) => {
                self.metrics.inc_dropped_count();
                warn!(
                    sink = %self.name,
                    stream_id = %chunk.stream_id,
                    chunk_id = chunk.chunk_id,
                    "sink queue full, chunk dropped"
                );
                Offer::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                error!(sink = %self.name, "sink worker exited early");
                Offer::Closed
            }
        }
    }

    /// Stop accepting chunks, let the worker write what is queued, then
    /// flush and close the sink. Returns the lane's final counters.
    #[instrument(name = "sink_lane_close", skip(self), fields(sink = %self.name))]
    pub async fn close(self) -> MetricsSnapshot {
        let Self {
            name,
            queue,
            metrics,
            worker,
        } = self;
        drop(queue);

        if let Err(e) = worker.await {
            error!(sink = %name, error = ?e, "sink worker panicked");
        }
        metrics.snapshot()
    }
}

struct LaneWorker<S> {
    sink: S,
    rx: mpsc::Receiver<Arc<Chunk>>,
    metrics: Arc<SinkMetrics>,
    name: Arc<str>,
    dispatched: ::metrics::Counter,
}

impl<S: DataSink> LaneWorker<S> {
    async fn run(mut self) {
        debug!(sink = %self.name, "sink worker started");

        while let Some(chunk) = self.rx.recv().await {
            self.metrics.set_queue_len(self.rx.len());
            self.deliver(&chunk).await;
        }
        self.finish().await;

        debug!(sink = %self.name, "sink worker stopped");
    }

    async fn deliver(&mut self, chunk: &Chunk) {
        match self.sink.write(chunk).await {
            Ok(()) => {
                self.metrics.record_write(chunk.len());
                self.dispatched.increment(1);
            }
            Err(e) => {
                self.metrics.inc_failure_count();
                error!(
                    sink = %self.name,
                    stream_id = %chunk.stream_id,
                    chunk_id = chunk.chunk_id,
                    error = %e,
                    "chunk write failed"
                );
            }
        }
    }

    /// Flush then close; a failed flush still closes.
    async fn finish(&mut self) {
        if let Err(e) = self.sink.flush().await {
            error!(sink = %self.name, error = %e, "flush failed at shutdown");
        }
        if let Err(e) = self.sink.close().await {
            error!(sink = %self.name, error = %e, "close failed at shutdown");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use contracts::{ContractError, CorrectedSample};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    pub(crate) fn chunk(chunk_id: u64, samples: usize) -> Arc<Chunk> {
        let boundary = 1714564800.0 + (chunk_id - 1) as f64 * 10.0;
        let samples = (0..samples)
            .map(|i| {
                let ts = boundary + i as f64 * 0.02;
                CorrectedSample {
                    ts_raw: ts,
                    ts_drift_free: ts,
                    ts_loss_aware: ts,
                    ts_wallclock: ts + 0.001,
                    x: 0.5,
                    y: -0.25,
                    z: 1.0,
                    index: i as u64,
                }
            })
            .collect();
        Arc::new(Chunk {
            chunk_id,
            stream_id: "left_wrist".into(),
            device_model: "METAMOTION_R".into(),
            boundary,
            duration: 10.0,
            samples,
        })
    }

    /// Counts writes, optionally slow or failing; records whether it was flushed
    #[derive(Default)]
    struct CountingSink {
        writes: Arc<AtomicU64>,
        flushed: Arc<AtomicU64>,
        fail: bool,
        delay_ms: u64,
    }

    impl DataSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn write(&mut self, _chunk: &Chunk) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail {
                return Err(ContractError::sink_write("counting", "disk full"));
            }
            self.writes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            self.flushed.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(ContractError::sink_write("counting", "disk full"));
            }
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_close_drains_queue_and_flushes() {
        let writes = Arc::new(AtomicU64::new(0));
        let flushed = Arc::new(AtomicU64::new(0));
        let lane = SinkLane::open(
            CountingSink {
                writes: Arc::clone(&writes),
                flushed: Arc::clone(&flushed),
                ..Default::default()
            },
            10,
        );
        assert_eq!(lane.name(), "counting");

        for id in 1..=5 {
            assert_eq!(lane.offer(chunk(id, 3)), Offer::Queued);
        }

        let snapshot = lane.close().await;
        assert_eq!(writes.load(Ordering::Relaxed), 5);
        assert_eq!(flushed.load(Ordering::Relaxed), 1);
        assert_eq!(snapshot.write_count, 5);
        assert_eq!(snapshot.samples_written, 15);
    }

    #[tokio::test]
    async fn test_slow_sink_drops_newest() {
        let lane = SinkLane::open(
            CountingSink {
                delay_ms: 100,
                ..Default::default()
            },
            2,
        );

        let offers: Vec<Offer> = (1..=10).map(|id| lane.offer(chunk(id, 1))).collect();
        assert_eq!(offers[0], Offer::Queued);
        assert_eq!(offers[9], Offer::Dropped);

        let dropped = offers.iter().filter(|o| **o == Offer::Dropped).count() as u64;
        let snapshot = lane.close().await;
        assert_eq!(snapshot.dropped_count, dropped);
        assert_eq!(snapshot.write_count + dropped, 10);
    }

    #[tokio::test]
    async fn test_failing_sink_counts_failures_and_still_flushes() {
        let flushed = Arc::new(AtomicU64::new(0));
        let lane = SinkLane::open(
            CountingSink {
                flushed: Arc::clone(&flushed),
                fail: true,
                ..Default::default()
            },
            10,
        );
        for id in 1..=3 {
            lane.offer(chunk(id, 1));
        }

        let snapshot = lane.close().await;
        assert_eq!(snapshot.failure_count, 3);
        assert_eq!(snapshot.write_count, 0);
        assert_eq!(flushed.load(Ordering::Relaxed), 1);
    }
}
