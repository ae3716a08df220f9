//! Delivers events to the listener of a manager, one at a time and in order.

use super::event::{EventMeta, RequestEvent, RequestListener};
use std::sync::Weak;
use tokio::{runtime::Handle, sync::mpsc};

/// The sending half of a manager's event channel. Sending never blocks.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<RequestEvent>,
}

impl EventSender {
    pub(crate) fn send(&self, event: RequestEvent) {
        // Only fails once the dispatcher stopped, in which case nobody is listening anyway.
        let _ = self.tx.send(event);
    }
}

/// Starts the task that hands events to the listener. The task ends when the last sender is
/// dropped.
pub(crate) fn spawn(runtime: &Handle, listener: Weak<dyn RequestListener>, hostname: String, logger: slog::Logger) -> EventSender {
    let (tx, mut rx) = mpsc::unbounded_channel::<RequestEvent>();
    runtime.spawn(async move {
        let mut sequence_number: u64 = 0;
        while let Some(event) = rx.recv().await {
            sequence_number += 1;
            match listener.upgrade() {
                Some(listener) => {
                    let meta = EventMeta {
                        hostname: hostname.clone(),
                        sequence_number,
                    };
                    listener.receive_request_event(event, meta).await;
                }
                None => slog::trace!(logger, "No listener, dropping event"; "seq" => sequence_number),
            }
        }
        slog::debug!(logger, "Event dispatcher stopped");
    });
    EventSender { tx }
}
