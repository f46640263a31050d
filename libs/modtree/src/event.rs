//! Per-owner event bus.
//!
//! Every module and every controller owns its own bus; there is no global
//! registry. Handlers are async and run one after another in registration
//! order. The first failing handler stops the trigger and its error is
//! returned to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;

/// Boxed async handler for payload `E`.
pub type Handler<E> =
    Arc<dyn for<'a> Fn(&'a E) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static>;

/// Token returned by [`EventBus::on`], used to remove the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Entry<E> {
    id: HandlerId,
    event: String,
    handler: Handler<E>,
}

pub struct EventBus<E> {
    next_id: AtomicU64,
    handlers: RwLock<Vec<Entry<E>>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(Vec::new()),
        }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events: Vec<String> = self.handlers.read().iter().map(|e| e.event.clone()).collect();
        f.debug_struct("EventBus").field("handlers", &events).finish()
    }
}

impl<E: Send + Sync + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async handler for `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: for<'a> Fn(&'a E) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push(Entry {
            id,
            event: event.to_string(),
            handler: Arc::new(handler),
        });
        id
    }

    /// Register a synchronous handler for `event`.
    pub fn on_sync<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on(event, move |payload| {
            let result = handler(payload);
            Box::pin(futures::future::ready(result))
        })
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|e| e.id != id);
        handlers.len() != before
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().iter().filter(|e| e.event == event).count()
    }

    /// Run every handler registered for `event`, sequentially.
    pub async fn trigger(&self, event: &str, payload: &E) -> anyhow::Result<()> {
        // snapshot: handlers may register or remove handlers while running
        let handlers: Vec<Handler<E>> = self
            .handlers
            .read()
            .iter()
            .filter(|e| e.event == event)
            .map(|e| e.handler.clone())
            .collect();

        for handler in handlers {
            handler(payload).await?;
        }
        Ok(())
    }
}
