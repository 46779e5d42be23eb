//! SampleSource trait - boundary to the device connection
//!
//! Whatever talks to the physical device (or fakes it) pushes samples through a
//! callback, stamping each with the host wall clock at reception.

use std::sync::Arc;

use crate::{SampleEvent, StreamId};

/// Sample callback type
///
/// Invoked from the source's own thread, once per received sample.
pub type SampleCallback = Arc<dyn Fn(SampleEvent) + Send + Sync>;

/// Sample data source trait
///
/// # Example
///
/// ```ignore
/// let source: Box<dyn SampleSource> = make_source();
/// source.listen(Arc::new(|event| {
///     println!("{} @ {}", event.stream_id, event.wallclock);
/// }));
/// // ...
/// source.stop();
/// ```
pub trait SampleSource: Send + Sync {
    /// Stream this source feeds
    fn stream_id(&self) -> &StreamId;

    /// Register the data callback and start producing.
    ///
    /// Repeated calls while listening are ignored.
    fn listen(&self, callback: SampleCallback);

    /// Stop producing
    fn stop(&self);

    /// Check if currently listening
    fn is_listening(&self) -> bool;
}
