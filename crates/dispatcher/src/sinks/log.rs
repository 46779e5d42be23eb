//! LogSink - logs chunk summary via tracing

use contracts::{Chunk, ContractError, DataSink};
use tracing::{info, instrument};

/// Sink that logs chunk summaries for debugging
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_chunk_summary(&self, chunk: &Chunk) {
        let (first_ts, last_ts) = chunk.span().unwrap_or((chunk.boundary, chunk.boundary));
        let first_index = chunk.samples.first().map(|s| s.index);

        info!(
            sink = %self.name,
            stream_id = %chunk.stream_id,
            chunk_id = chunk.chunk_id,
            boundary = chunk.boundary,
            samples = chunk.len(),
            first_ts,
            last_ts,
            first_index,
            "Chunk received"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, chunk),
        fields(sink = %self.name, chunk_id = chunk.chunk_id)
    )]
    async fn write(&mut self, chunk: &Chunk) -> Result<(), ContractError> {
        self.log_chunk_summary(chunk);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
