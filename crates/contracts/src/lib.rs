//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Device clock: milliseconds, monotonic-ish, not synchronized to the host
//! - Wall clock: host reception time, seconds since Unix epoch (f64)
//! - All corrected timestamps are expressed on the wall-clock scale

mod chunk;
mod chunker_config;
mod error;
mod sample;
mod sample_source;
mod session;
mod sink;
mod stream_id;

pub use chunk::*;
pub use chunker_config::*;
pub use error::*;
pub use sample::*;
pub use sample_source::{SampleCallback, SampleSource};
pub use session::*;
pub use sink::*;
pub use stream_id::StreamId;
