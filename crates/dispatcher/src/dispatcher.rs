//! Chunk fan-out: one input channel, one lane per configured sink.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{Chunk, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::lane::{Offer, SinkLane};
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink};

/// Final per-sink counters, in configuration order
pub type DispatchReport = Vec<(String, MetricsSnapshot)>;

/// Fans every chunk out to all sink lanes
pub struct Dispatcher {
    lanes: Vec<SinkLane>,
    input_rx: mpsc::Receiver<Chunk>,
}

impl Dispatcher {
    pub fn new(lanes: Vec<SinkLane>, input_rx: mpsc::Receiver<Chunk>) -> Self {
        Self { lanes, input_rx }
    }

    /// Open one lane per sink configuration.
    ///
    /// Must be called inside a Tokio runtime; each lane spawns its worker.
    ///
    /// # Errors
    /// `SinkCreation` for the first sink that cannot be built.
    #[instrument(name = "dispatcher_from_configs", skip_all, fields(sinks = configs.len()))]
    pub fn from_configs(
        configs: &[SinkConfig],
        input_rx: mpsc::Receiver<Chunk>,
    ) -> Result<Self, DispatcherError> {
        let lanes = configs
            .iter()
            .map(open_lane)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(lanes, input_rx))
    }

    pub fn sink_names(&self) -> impl Iterator<Item = &str> {
        self.lanes.iter().map(SinkLane::name)
    }

    /// Live counters for every lane
    pub fn metrics(&self) -> DispatchReport {
        self.lanes
            .iter()
            .map(|lane| (lane.name().to_string(), lane.metrics().snapshot()))
            .collect()
    }

    /// Fan chunks out until the input closes, then close every lane in
    /// order and report its final counters.
    #[instrument(name = "dispatcher_run", skip(self), fields(sinks = self.lanes.len()))]
    pub async fn run(mut self) -> DispatchReport {
        info!("dispatcher started");

        let mut received: u64 = 0;
        let mut short_deliveries: u64 = 0;
        while let Some(chunk) = self.input_rx.recv().await {
            received += 1;
            let accepted = self.fan_out(chunk);
            if accepted < self.lanes.len() {
                short_deliveries += 1;
            }
            if received % 100 == 0 {
                debug!(received, short_deliveries, "dispatcher progress");
            }
        }

        info!(received, short_deliveries, "dispatcher input closed, closing sinks");

        let mut report = Vec::with_capacity(self.lanes.len());
        for lane in self.lanes {
            let name = lane.name().to_string();
            report.push((name, lane.close().await));
        }
        report
    }

    pub fn spawn(self) -> JoinHandle<DispatchReport> {
        tokio::spawn(self.run())
    }

    /// Offer one chunk to every lane; returns how many lanes queued it.
    fn fan_out(&self, chunk: Chunk) -> usize {
        let chunk = Arc::new(chunk);
        self.lanes
            .iter()
            .filter(|lane| lane.offer(Arc::clone(&chunk)) == Offer::Queued)
            .count()
    }
}

#[instrument(
    name = "dispatcher_open_lane",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn open_lane(config: &SinkConfig) -> Result<SinkLane, DispatcherError> {
    let lane = match config.sink_type {
        SinkType::Log => SinkLane::open(LogSink::new(&config.name), config.queue_capacity),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            SinkLane::open(sink, config.queue_capacity)
        }
    };
    Ok(lane)
}
