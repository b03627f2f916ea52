//! EventEmitter Trait - abstraction for event emission
//!
//! Enables dependency injection: the real EventLog in production,
//! NoopEmitter in tests, BroadcastEmitter when a RunHandle subscriber needs
//! pushed status events.

use tokio::sync::broadcast;

use super::log::{Event, EventKind, EventLog};

/// Trait for emitting events during run execution
pub trait EventEmitter: Send + Sync {
    /// Emit an event and return its ID
    fn emit(&self, kind: EventKind) -> u64;
}

/// Implement EventEmitter for EventLog (the real implementation)
impl EventEmitter for EventLog {
    fn emit(&self, kind: EventKind) -> u64 {
        EventLog::emit(self, kind)
    }
}

/// No-op emitter for testing (zero allocation, always returns 0)
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl EventEmitter for NoopEmitter {
    fn emit(&self, _kind: EventKind) -> u64 {
        0
    }
}

/// Emitter that appends to the log AND pushes the stored event to run
/// subscribers. Send errors are ignored: a run with no live subscriber
/// still keeps its full audit trail in the log.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    log: EventLog,
    sender: broadcast::Sender<Event>,
}

impl BroadcastEmitter {
    pub fn new(log: EventLog, sender: broadcast::Sender<Event>) -> Self {
        Self { log, sender }
    }

    /// The underlying log
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Subscribe to pushed events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl EventEmitter for BroadcastEmitter {
    fn emit(&self, kind: EventKind) -> u64 {
        let event = self.log.emit_full(kind);
        let id = event.id;
        let _ = self.sender.send(event);
        id
    }
}
