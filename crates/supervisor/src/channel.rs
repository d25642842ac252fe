//! The per-task event channel.
//!
//! Unbounded and ordered, with a single writer (the worker) and a single
//! reader (the supervisor). Reads never block: consumers drain whatever
//! is queued and come back after a poll interval.

use runbox_agent::EventSink;
use runbox_core::event::TaskEvent;
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Create a fresh channel for one task.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx, closed: false })
}

/// Writing half, handed to the worker.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl EventSink for EventSender {
    fn emit(&self, event: TaskEvent) {
        self.tx.emit(event);
    }
}

/// Reading half, owned by the supervisor's registry entry.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<TaskEvent>,
    closed: bool,
}

impl EventReceiver {
    /// Take every event queued right now. Each event is returned once.
    pub fn drain(&mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        events
    }

    /// True once every sender is gone and the queue has been emptied.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbox_core::event::ExitReason;
    use runbox_core::task::TaskId;

    #[test]
    fn drain_preserves_order_and_consumes() {
        let (tx, mut rx) = event_channel();
        let id = TaskId::from("t1");
        tx.emit(TaskEvent::start(id.clone(), "go"));
        tx.emit(TaskEvent::end(id, ExitReason::Completed));

        let types: Vec<_> = rx.drain().iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["start", "end"]);
        assert!(rx.drain().is_empty());
        assert!(!rx.is_closed());
    }

    #[test]
    fn closed_after_sender_dropped() {
        let (tx, mut rx) = event_channel();
        tx.emit(TaskEvent::start(TaskId::from("t1"), "go"));
        drop(tx);
        assert_eq!(rx.drain().len(), 1);
        assert!(rx.is_closed());
    }

    #[test]
    fn emit_after_reader_dropped_is_harmless() {
        let (tx, rx) = event_channel();
        drop(rx);
        tx.emit(TaskEvent::start(TaskId::from("t1"), "go"));
    }
}
