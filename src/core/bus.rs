//! The event bus — wildcard pub/sub plus a middleware pipeline.
//!
//! Two patterns combined:
//! 1. Observer: components subscribe to event-type patterns.
//! 2. Middleware chain: every `emit` passes through the registered
//!    middleware before reaching subscribers.
//!
//! Middleware runs in registration order on the way in and reverse
//! order on the way out; it may mutate the event or short-circuit by
//! not calling `next`. Matching handlers run concurrently, and one
//! handler's failure never reaches the others or the emitter.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use futures::future::{join_all, BoxFuture};

use super::errors::ArcError;
use super::events::{pattern_matches, Event};

/// Future returned by an event handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), ArcError>> + Send>>;

/// A subscribed event handler.
pub type EventHandler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// Identifies one subscription for [`EventBus::unsubscribe`].
///
/// Closures are not comparable, so removal is by the id returned from
/// [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Middleware hook around event dispatch.
///
/// Implementations receive the event and a [`Next`] continuation; call
/// `next.run(event)` to continue the chain, or skip it to
/// short-circuit dispatch entirely.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, event: Event, next: Next<'_>) -> Event;
}

/// The remainder of a middleware chain, ending in subscriber dispatch.
pub struct Next<'a> {
    bus: &'a EventBus,
    remaining: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// Run the rest of the chain with `event`.
    pub fn run(self, event: Event) -> BoxFuture<'a, Event> {
        Box::pin(async move {
            match self.remaining.split_first() {
                Some((mw, rest)) => {
                    mw.handle(
                        event,
                        Next {
                            bus: self.bus,
                            remaining: rest,
                        },
                    )
                    .await
                }
                None => self.bus.dispatch(event).await,
            }
        })
    }
}

/// Publish/subscribe event bus with middleware pipeline.
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    // ── Subscription ─────────────────────────────────────────────────────────

    /// Subscribe a raw handler to a pattern (`"agent:thinking"`,
    /// `"agent:*"`, `"*"`).
    pub fn subscribe(&self, pattern: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subs.entry(pattern.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Subscribe an async closure. Handler errors are logged, never
    /// propagated.
    pub fn on<F, Fut>(&self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ArcError>> + Send + 'static,
    {
        self.subscribe(pattern, Arc::new(move |e| Box::pin(handler(e))))
    }

    /// Remove one subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, pattern: &str, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = subs.get_mut(pattern) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(sid, _)| *sid != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            subs.remove(pattern);
        }
        removed
    }

    // ── Middleware ───────────────────────────────────────────────────────────

    /// Append middleware to the pipeline.
    pub fn use_middleware(&self, mw: Arc<dyn Middleware>) {
        self.middleware
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(mw);
    }

    // ── Emission ─────────────────────────────────────────────────────────────

    /// Emit an event through the middleware chain, then to all matching
    /// subscribers concurrently. Returns the (possibly modified) event
    /// once every handler has completed.
    pub async fn emit(&self, event: Event) -> Event {
        let middleware: Vec<Arc<dyn Middleware>> = self
            .middleware
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let next = Next {
            bus: self,
            remaining: &middleware,
        };
        next.run(event).await
    }

    /// Emit without waiting for processing. Errors are swallowed with a
    /// log line — useful for fire-and-forget observability events.
    pub fn emit_nowait(self: Arc<Self>, event: Event) {
        tokio::spawn(async move {
            let _ = self.emit(event).await;
        });
    }

    /// Total number of live subscriptions (debugging aid).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Terminal dispatcher: invoke every handler matching the event's
    /// type. Handlers run concurrently; failures are logged and
    /// contained.
    async fn dispatch(&self, event: Event) -> Event {
        let handlers: Vec<EventHandler> = {
            let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            subs.iter()
                .filter(|(pattern, _)| pattern_matches(pattern, &event.event_type))
                .flat_map(|(_, entries)| entries.iter().map(|(_, h)| Arc::clone(h)))
                .collect()
        };

        if !handlers.is_empty() {
            let results = join_all(handlers.iter().map(|h| h(event.clone()))).await;
            for result in results {
                if let Err(e) = result {
                    log::error!("subscriber error for {}: {e}", event.event_type);
                }
            }
        }
        event
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
