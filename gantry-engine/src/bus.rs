//! Event bus
//!
//! Delivers lifecycle events to registered handlers synchronously and in
//! emission order, and mirrors every event onto a broadcast channel for
//! async consumers.
//!
//! Handlers are isolated from each other and from the engine: an error or a
//! panic in one handler is reported as a diagnostic and the next handler
//! still receives the event.

use gantry_core::domain::event::Event;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;

use crate::diagnostics::{Diagnostic, DiagnosticChannel, DiagnosticSource};

/// Receives lifecycle events
///
/// Handlers run on the engine's driver task. They must not block; anything
/// slow belongs on the receiving end of [`EventBus::stream`].
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}

type HandlerList = Vec<(u64, Arc<dyn EventHandler>)>;

/// Fan-out point for lifecycle events
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<Mutex<HandlerList>>,
    next_id: Arc<AtomicU64>,
    stream: broadcast::Sender<Event>,
    diagnostics: DiagnosticChannel,
}

impl EventBus {
    /// Creates a bus
    ///
    /// # Arguments
    /// * `capacity` - Buffer size of the broadcast mirror; slow stream
    ///   receivers lag rather than block the engine
    /// * `diagnostics` - Channel that receives handler failures
    pub fn new(capacity: usize, diagnostics: DiagnosticChannel) -> Self {
        let (stream, _) = broadcast::channel(capacity);
        Self {
            handlers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            stream,
            diagnostics,
        }
    }

    /// Registers a handler; it receives events until the returned
    /// [`Subscription`] is dropped or unsubscribed
    pub fn subscribe(&self, handler: impl EventHandler + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, Arc::new(handler)));
        Subscription {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Async receiver of every event published after this call
    pub fn stream(&self) -> broadcast::Receiver<Event> {
        self.stream.subscribe()
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.lock().len()
    }

    /// Delivers an event to every handler, then to the broadcast mirror
    ///
    /// The handler list is snapshotted before delivery, so a handler may
    /// subscribe or unsubscribe from inside its callback.
    pub fn publish(&self, event: &Event) {
        let snapshot: Vec<Arc<dyn EventHandler>> =
            self.lock().iter().map(|(_, handler)| handler.clone()).collect();

        for handler in snapshot {
            let failure = match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("event handler failed on {}: {:#}", event.kind, e)),
                Err(panic) => Some(format!(
                    "event handler panicked on {}: {}",
                    event.kind,
                    panic_message(&*panic)
                )),
            };

            if let Some(message) = failure {
                self.diagnostics.report(Diagnostic {
                    source: DiagnosticSource::Subscriber,
                    run_id: Some(event.run_id),
                    timestamp: event.timestamp,
                    message,
                });
            }
        }

        let _ = self.stream.send(event.clone());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HandlerList> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to a registered event handler
///
/// Dropping it unsubscribes the handler.
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
pub struct Subscription {
    id: u64,
    handlers: Weak<Mutex<HandlerList>>,
}

impl Subscription {
    /// Stops delivery to this handler
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            handlers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
