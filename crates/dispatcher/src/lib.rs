//! # Dispatcher
//!
//! 数据分发模块。
//!
//! 负责：
//! - 消费 `Chunk`
//! - Fan-out 到多个 sinks
//! - 隔离慢 sink，不阻塞分块主链路

pub mod dispatcher;
pub mod error;
pub mod lane;
pub mod metrics;
pub mod sinks;

pub use contracts::{Chunk, DataSink};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::DispatcherError;
pub use lane::{Offer, SinkLane};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileFormat, FileSink, FileSinkConfig, LogSink};
