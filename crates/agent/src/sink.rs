//! Where the agent loop sends its events.

use runbox_core::event::TaskEvent;
use tokio::sync::mpsc;
use tracing::debug;

/// Receives a task's events in emission order.
///
/// Emitting never blocks and never fails the run: a sink whose reader has
/// gone away drops the event.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);
}

impl EventSink for mpsc::UnboundedSender<TaskEvent> {
    fn emit(&self, event: TaskEvent) {
        let event_type = event.event_type();
        if self.send(event).is_err() {
            debug!(event_type, "Event reader is gone, dropping event");
        }
    }
}
