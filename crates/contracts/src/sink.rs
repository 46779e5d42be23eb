//! DataSink trait - Dispatcher output interface

use crate::{Chunk, ContractError};

/// Chunk output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one completed chunk
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, chunk: &Chunk) -> Result<(), ContractError>;

    /// Flush buffered output (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
