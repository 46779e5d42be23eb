//! 数据源适配器
//!
//! 把 `SampleSource` 的回调接到 ingestion 通道上，统一处理计数与背压。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::{SampleCallback, SampleSource, StreamId};
use tracing::{debug, trace, warn};

use crate::config::IngestionMetrics;
use crate::sender::EventSender;

/// 数据源适配器
pub struct SourceAdapter {
    stream_id: StreamId,
    source: Box<dyn SampleSource>,
    listening: Arc<AtomicBool>,
}

impl SourceAdapter {
    pub fn new(stream_id: StreamId, source: Box<dyn SampleSource>) -> Self {
        Self {
            stream_id,
            source,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// 注册回调并启动数据源
    pub fn start(&self, sender: EventSender, metrics: Arc<IngestionMetrics>) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let stream_id = self.stream_id.clone();
        let listening = self.listening.clone();

        debug!(stream_id = %stream_id, policy = ?sender.policy(), "starting source adapter");

        let callback: SampleCallback = Arc::new(move |mut event| {
            if !listening.load(Ordering::Relaxed) {
                return;
            }
            if event.stream_id != stream_id {
                warn!(
                    expected = %stream_id,
                    got = %event.stream_id,
                    "source emitted foreign stream id, relabelling"
                );
                event.stream_id = stream_id.clone();
            }

            metrics.record_received();
            trace!(stream_id = %stream_id, wallclock = event.wallclock, "adapter received sample");
            if !sender.send(event, &metrics) {
                listening.store(false, Ordering::Relaxed);
            }
        });

        self.source.listen(callback);
    }

    pub fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            debug!(stream_id = %self.stream_id, "stopping source adapter");
        }
        self.source.stop();
    }

    /// Started and the underlying source is still producing
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed) && self.source.is_listening()
    }
}
