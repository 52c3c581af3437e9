//! Typed publish/subscribe surface for upload events.
//!
//! Three channels: `progress`, `status`, and `error`. Handlers fire
//! synchronously in registration order and are removed by identity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;

/// Client-side lifecycle of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Idle,
    Initializing,
    Uploading,
    Paused,
    Completing,
    Completed,
    Failed,
    Canceled,
}

/// Progress after one chunk success.
///
/// Events fire in completion order, not index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
    /// `min(100, round(bytes_uploaded / total_bytes * 100))`.
    pub percentage: u8,
    /// Index of the chunk that just completed.
    pub chunk_index: u32,
    pub chunks_completed: u32,
    pub total_chunks: u32,
}

/// Identifies a registered handler for unsubscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId {
    channel: Channel,
    id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Progress,
    Status,
    Error,
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Subscription registry for the three event channels.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    progress: Mutex<Vec<(u64, Handler<ProgressEvent>)>>,
    status: Mutex<Vec<(u64, Handler<ClientStatus>)>>,
    error: Mutex<Vec<(u64, Handler<Error>)>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a progress handler.
    pub fn on_progress(&self, handler: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id();
        self.progress.lock().push((id, Arc::new(handler)));
        HandlerId {
            channel: Channel::Progress,
            id,
        }
    }

    /// Register a status handler.
    pub fn on_status(&self, handler: impl Fn(&ClientStatus) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id();
        self.status.lock().push((id, Arc::new(handler)));
        HandlerId {
            channel: Channel::Status,
            id,
        }
    }

    /// Register an error handler, fired on terminal failure.
    pub fn on_error(&self, handler: impl Fn(&Error) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id();
        self.error.lock().push((id, Arc::new(handler)));
        HandlerId {
            channel: Channel::Error,
            id,
        }
    }

    /// Remove a handler by identity. Unknown ids are ignored.
    pub fn unsubscribe(&self, handler_id: HandlerId) {
        match handler_id.channel {
            Channel::Progress => self
                .progress
                .lock()
                .retain(|(id, _)| *id != handler_id.id),
            Channel::Status => self.status.lock().retain(|(id, _)| *id != handler_id.id),
            Channel::Error => self.error.lock().retain(|(id, _)| *id != handler_id.id),
        }
    }

    // Emission clones the handler list out of the lock so a handler may
    // subscribe, unsubscribe, or trigger another emission without
    // deadlocking.

    pub(crate) fn emit_progress(&self, event: &ProgressEvent) {
        let handlers: Vec<Handler<ProgressEvent>> = self
            .progress
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub(crate) fn emit_status(&self, status: ClientStatus) {
        let handlers: Vec<Handler<ClientStatus>> = self
            .status
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(&status);
        }
    }

    pub(crate) fn emit_error(&self, error: &Error) {
        let handlers: Vec<Handler<Error>> = self
            .error
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn handlers_fire_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.on_status(move |_| order.lock().push(tag));
        }
        bus.emit_status(ClientStatus::Uploading);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let first = {
            let count = Arc::clone(&count);
            bus.on_progress(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let count2 = Arc::clone(&count);
        bus.on_progress(move |_| {
            count2.fetch_add(10, Ordering::SeqCst);
        });

        bus.unsubscribe(first);
        bus.emit_progress(&ProgressEvent {
            bytes_uploaded: 0,
            total_bytes: 1,
            percentage: 0,
            chunk_index: 0,
            chunks_completed: 0,
            total_chunks: 1,
        });
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn channels_are_independent() {
        let bus = EventBus::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let progress_id = bus.on_progress(move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });

        // Unsubscribing with a progress id leaves status handlers alone.
        bus.unsubscribe(progress_id);
        bus.emit_status(ClientStatus::Completed);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_may_reenter_the_bus() {
        let bus = Arc::new(EventBus::new());
        let fired = Arc::new(AtomicUsize::new(0));

        // A status handler that emits on another channel while the status
        // channel is being fired.
        let bus2 = Arc::clone(&bus);
        let fired2 = Arc::clone(&fired);
        bus.on_error(move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        bus.on_status(move |_| {
            bus2.emit_error(&Error::Configuration("from handler".into()));
        });

        bus.emit_status(ClientStatus::Failed);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
