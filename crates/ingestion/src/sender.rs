//! Channel sender with backpressure policy

use std::sync::Arc;

use async_channel::{Receiver, Sender, TrySendError};
use contracts::{DropPolicy, SampleEvent};
use tracing::{trace, warn};

use crate::config::IngestionMetrics;

/// Sending half used by adapter callbacks.
///
/// Every sender shares the ingestion side's one receiver handle. `DropOldest`
/// evicts the head of the queue through it; all policies use it to tell
/// whether anyone else is still reading.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<SampleEvent>,
    held: Arc<Receiver<SampleEvent>>,
    policy: DropPolicy,
}

impl EventSender {
    pub fn new(
        tx: Sender<SampleEvent>,
        held: &Arc<Receiver<SampleEvent>>,
        policy: DropPolicy,
    ) -> Self {
        Self {
            tx,
            held: Arc::clone(held),
            policy,
        }
    }

    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    /// Only the shared handle is left: the consumer dropped its receiver.
    fn consumer_gone(&self) -> bool {
        self.tx.receiver_count() <= 1
    }

    /// Send one event, applying the drop policy when the queue is full.
    ///
    /// Returns `false` once the channel is closed. A channel whose consumer
    /// has gone is closed here first.
    pub fn send(&self, event: SampleEvent, metrics: &Arc<IngestionMetrics>) -> bool {
        if self.consumer_gone() {
            if self.tx.close() {
                warn!(stream_id = %event.stream_id, "sample consumer dropped, closing channel");
            }
            return false;
        }

        let stream_id = event.stream_id.clone();
        let sent = match self.policy {
            DropPolicy::Block => match self.tx.send_blocking(event) {
                Ok(()) => true,
                Err(_) => {
                    warn!(stream_id = %stream_id, "channel closed");
                    false
                }
            },
            DropPolicy::DropNewest => self.try_send_or_drop(event, metrics),
            DropPolicy::DropOldest => self.send_evicting(event, metrics),
        };
        metrics.update_queue_len(self.tx.len());
        sent
    }

    fn try_send_or_drop(&self, event: SampleEvent, metrics: &Arc<IngestionMetrics>) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                metrics.record_dropped();
                trace!(stream_id = %event.stream_id, "sample dropped (newest)");
                true
            }
            Err(TrySendError::Closed(event)) => {
                warn!(stream_id = %event.stream_id, "channel closed");
                false
            }
        }
    }

    fn send_evicting(&self, mut event: SampleEvent, metrics: &Arc<IngestionMetrics>) -> bool {
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return true,
                Err(TrySendError::Full(rejected)) => {
                    event = rejected;
                    let evicted = self.held.try_recv().ok();
                    match evicted {
                        Some(old) => {
                            metrics.record_dropped();
                            trace!(stream_id = %old.stream_id, "sample dropped (oldest)");
                        }
                        None => {
                            // Consumer raced us to the head; fall back to dropping this one
                            metrics.record_dropped();
                            trace!(stream_id = %event.stream_id, "sample dropped (oldest fallback)");
                            return true;
                        }
                    }
                }
                Err(TrySendError::Closed(event)) => {
                    warn!(stream_id = %event.stream_id, "channel closed");
                    return false;
                }
            }
        }
    }
}
