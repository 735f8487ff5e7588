//! Asynchronous event notifications and the per-utterance wait handle.

use crate::error::{ClientError, Result};
use crossbeam::channel::Receiver;
use ssip_protocol::ServerMessage;
use std::sync::Mutex;
use std::time::Duration;

/// Known speechd event notification codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EventCode {
    Begin = 701,
    End = 702,
    Cancel = 703,
    Pause = 704,
    Resume = 705,
}

impl EventCode {
    /// Look up a known event code. Unknown codes inside the 700-799 band
    /// are still valid events, just not ones this client interprets.
    pub fn from_code(code: u16) -> Option<EventCode> {
        match code {
            701 => Some(EventCode::Begin),
            702 => Some(EventCode::End),
            703 => Some(EventCode::Cancel),
            704 => Some(EventCode::Pause),
            705 => Some(EventCode::Resume),
            _ => None,
        }
    }
}

/// Callback invoked for every event notification the session receives.
/// Return `true` to keep receiving events, `false` to be retired.
///
/// Handlers run on the session's reader thread and must not block; hand
/// work off through a channel instead.
pub type EventHandler = Box<dyn FnMut(&ServerMessage) -> bool + Send>;

/// Ordered collection of event handlers.
///
/// Retired handlers leave a tombstone slot behind instead of being removed,
/// so indices stay stable for a dispatch in progress. Only the session's
/// reader thread dispatches; other threads may append concurrently.
pub(crate) struct EventRegistry {
    handlers: Mutex<Vec<Option<EventHandler>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        EventRegistry {
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, handler: EventHandler) {
        self.handlers.lock().unwrap().push(Some(handler));
    }

    /// Offer an event to every live handler, in registration order.
    ///
    /// The lock is released around each call, so a handler may register
    /// new handlers; those see the *next* event, not this one.
    pub fn dispatch(&self, event: &ServerMessage) {
        let count = self.handlers.lock().unwrap().len();
        for index in 0..count {
            let taken = self.handlers.lock().unwrap()[index].take();
            if let Some(mut handler) = taken {
                if handler(event) {
                    self.handlers.lock().unwrap()[index] = Some(handler);
                }
            }
        }
    }

    /// Drop every handler. Called when the reader loop exits so waiters
    /// blocked on a completion channel observe the disconnect.
    pub fn clear(&self) {
        self.handlers.lock().unwrap().clear();
    }
}

/// An utterance the server accepted and will speak asynchronously.
///
/// Resolved exactly once, by the first terminal event for its id: `end`
/// means spoken to completion, `cancel` means interrupted. A duplicate
/// terminal event for the same id is ignored.
pub struct PendingMessage {
    id: String,
    completion: Receiver<bool>,
}

impl PendingMessage {
    pub(crate) fn new(id: String, completion: Receiver<bool>) -> Self {
        PendingMessage { id, completion }
    }

    /// The message id the server assigned to this utterance.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Block until the utterance is spoken (`true`) or canceled (`false`).
    ///
    /// Requires event notifications to be enabled on the session
    /// (`set_event_notifications(true)`) *before* speaking; without them
    /// the server never sends the terminal event and this blocks until the
    /// session goes away. Returns `ConnectionLost` if the session is torn
    /// down before the terminal event arrives.
    pub fn wait(&self) -> Result<bool> {
        self.completion.recv().map_err(|_| {
            ClientError::ConnectionLost("session closed before the message finished".to_string())
        })
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`. `None` means
    /// the message is still in flight (or the session went away).
    pub fn wait_timeout(&self, timeout: Duration) -> Option<bool> {
        self.completion.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn event(code: u16, line: &str) -> ServerMessage {
        ServerMessage {
            code,
            lines: vec![line.to_string()],
        }
    }

    #[test]
    fn test_event_code_lookup() {
        assert_eq!(EventCode::from_code(701), Some(EventCode::Begin));
        assert_eq!(EventCode::from_code(702), Some(EventCode::End));
        assert_eq!(EventCode::from_code(703), Some(EventCode::Cancel));
        assert_eq!(EventCode::from_code(799), None);
        assert_eq!(EventCode::from_code(200), None);
    }

    #[test]
    fn test_registry_dispatches_in_order() {
        let registry = EventRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let calls = Arc::clone(&calls);
            registry.register(Box::new(move |_| {
                calls.lock().unwrap().push(tag);
                true
            }));
        }

        registry.dispatch(&event(701, "1"));
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_retired_handler_is_not_called_again() {
        let registry = EventRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&count);
        registry.register(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            false
        }));

        registry.dispatch(&event(702, "1"));
        registry.dispatch(&event(702, "1"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tombstone_does_not_block_later_handlers() {
        let registry = EventRegistry::new();
        registry.register(Box::new(|_| false));

        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        registry.register(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            true
        }));

        registry.dispatch(&event(703, "9"));
        registry.dispatch(&event(703, "9"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handler_may_register_from_inside_dispatch() {
        // Must not deadlock, and the newly registered handler only sees
        // events after the one being dispatched.
        let registry = Arc::new(EventRegistry::new());
        let count = Arc::new(AtomicUsize::new(0));

        let reentrant = Arc::clone(&registry);
        let seen = Arc::clone(&count);
        let mut registered = false;
        registry.register(Box::new(move |_| {
            if !registered {
                registered = true;
                let seen = Arc::clone(&seen);
                reentrant.register(Box::new(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    true
                }));
            }
            true
        }));

        registry.dispatch(&event(701, "1"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        registry.dispatch(&event(701, "1"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_after_clear_is_an_error() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let pending = PendingMessage::new("5".to_string(), rx);
        drop(tx);
        assert!(matches!(
            pending.wait(),
            Err(ClientError::ConnectionLost(_))
        ));
    }
}
