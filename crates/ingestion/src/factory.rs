//! Build sample sources from stream configuration

use contracts::{SampleSource, SourceConfig, StreamConfig};

use crate::error::Result;
use crate::mock::{MockSampleConfig, MockSampleSource};
use crate::replay::ReplaySampleSource;

/// Create the source described by `stream.source`.
///
/// `start_wallclock` seeds the virtual clock of non-realtime mock sources so
/// that every stream of a session starts from the same instant.
pub fn source_from_config(
    stream: &StreamConfig,
    start_wallclock: Option<f64>,
) -> Result<Box<dyn SampleSource>> {
    match &stream.source {
        SourceConfig::Mock(params) => {
            let mut config = MockSampleConfig::new(stream.id.clone(), stream.sample_rate_hz)
                .with_params(params.clone());
            config.start_wallclock = start_wallclock;
            Ok(Box::new(MockSampleSource::new(config)))
        }
        SourceConfig::Replay(params) => Ok(Box::new(ReplaySampleSource::from_path(
            stream.id.clone(),
            &params.path,
            params.speed,
        )?)),
    }
}
