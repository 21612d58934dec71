//! Channel feeding the reconciliation loop.
//!
//! Push events from the device and wake signals from the protocol side share a
//! single bounded queue, drained without blocking at each loop iteration.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::{debug, warn};

use crate::device::MediaStatus;

/// Default queue depth.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    /// Unsolicited MEDIA_STATUS pushed by the device.
    MediaStatus(MediaStatus),
    /// Target state changed, re-evaluate now.
    Wake,
}

/// Sending half handed to device listeners and target-state setters.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<LoopEvent>,
}

impl EventSink {
    pub fn push_media_status(&self, status: MediaStatus) {
        debug!(
            session = ?status.media_session_id,
            state = ?status.player_state,
            idle_reason = ?status.idle_reason,
            "Spontaneous media status"
        );
        match self.tx.try_send(LoopEvent::MediaStatus(status)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("Event queue full, dropping media status"),
            Err(TrySendError::Disconnected(_)) => debug!("Event queue closed"),
        }
    }

    /// A full queue already guarantees a prompt wake-up.
    pub fn wake(&self) {
        let _ = self.tx.try_send(LoopEvent::Wake);
    }
}

pub fn channel(capacity: usize) -> (EventSink, Receiver<LoopEvent>) {
    let (tx, rx) = bounded(capacity);
    (EventSink { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_never_blocks_on_full_queue() {
        let (sink, rx) = channel(1);
        sink.wake();
        sink.wake();
        assert_eq!(rx.try_iter().count(), 1);
    }
}
