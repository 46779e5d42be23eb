//! # Ingestion Pipeline
//!
//! Sample ingestion module.
//!
//! Responsibilities:
//! - Register sample sources (mock, replay, or a real device bridge)
//! - Stamp and forward `SampleEvent`s
//! - Backpressure management and drop policy
//! - Send to downstream via async-channel
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{IngestionPipeline, source_from_config};
//!
//! let mut pipeline = IngestionPipeline::new(1024);
//! for stream in &blueprint.streams {
//!     let source = source_from_config(stream, None)?;
//!     pipeline.register_source(stream.id.clone(), source, None)?;
//! }
//!
//! pipeline.start_all();
//! let rx = pipeline.take_receiver().unwrap();
//! while let Ok(event) = rx.recv().await {
//!     // Feed the chunk engine
//! }
//! ```

mod adapter;
mod config;
mod error;
mod factory;
mod mock;
mod pipeline;
mod replay;
mod sender;

pub use adapter::SourceAdapter;
pub use config::{BackpressureConfig, DropPolicy, IngestionMetrics, MetricsSnapshot};
pub use contracts::SampleEvent;
pub use error::{IngestionError, Result};
pub use factory::source_from_config;
pub use mock::{MockSampleConfig, MockSampleGenerator, MockSampleSource};
pub use pipeline::IngestionPipeline;
pub use replay::ReplaySampleSource;
pub use sender::EventSender;
