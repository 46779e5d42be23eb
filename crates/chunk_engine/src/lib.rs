//! # Chunk Engine
//!
//! 单设备流的时间戳校正与定长分块。
//!
//! 负责：
//! - 首样本锁定设备时钟与墙钟的偏移
//! - 三条时间线：raw / drift-free / loss-aware
//! - 按设备型号做轴向校准
//! - 以 loss-aware 时间切分固定时长的 `Chunk`
//!
//! ## 使用示例
//!
//! ```ignore
//! use chunk_engine::SessionChunker;
//! use contracts::ChunkerConfig;
//!
//! let mut chunker = SessionChunker::new(vec![
//!     ChunkerConfig::new("acc-0", "METAMOTION_R", 50.0, 10.0),
//! ])?;
//!
//! if let Some(chunk) = chunker.push(event) {
//!     // Hand the chunk to the dispatcher
//! }
//!
//! // End of stream
//! for chunk in chunker.drain_all() { /* ... */ }
//! ```

mod assembler;
mod calibration;
mod corrector;
mod engine;

pub use assembler::{AssemblerStats, ChunkAssembler, ChunkBoundary};
pub use calibration::{AxisCalibration, METAMOTION_R, UNKNOWN_MODEL};
pub use corrector::{
    CorrectorState, GridPosition, LOSS_THRESHOLD_INTERVALS, LossDecision, TimestampCorrector, TimestampSet,
    Track,
};
pub use engine::SessionChunker;

pub use contracts::{Chunk, ChunkerConfig, CorrectedSample, RawSample, SampleEvent};
