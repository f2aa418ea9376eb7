//! Synchronous publish/subscribe channel
//!
//! Delivery is immediate and happens on the emitting thread, in
//! subscription order. The subscriber list is snapshotted per emission:
//! a handler registered while an event is being delivered does not see
//! that event, and a handler removed mid-delivery still sees it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::types::{AgentEvent, EventEnvelope, EventKind};

type Handler = Arc<dyn Fn(&EventEnvelope) + Send + Sync>;

struct Subscriber {
    id: u64,
    kind: EventKind,
    handler: Handler,
}

struct ChannelInner {
    subscribers: RwLock<Vec<Subscriber>>,
    history: Mutex<Vec<EventEnvelope>>,
    next_id: AtomicU64,
}

impl ChannelInner {
    fn remove(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }
}

/// Typed event bus shared by the orchestrator, command bridge, and runtime
///
/// Cloning is cheap and yields a handle to the same channel.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                subscribers: RwLock::new(Vec::new()),
                history: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Record `event` and deliver it to every current subscriber of its kind
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, event: AgentEvent, source: Option<&str>) -> usize {
        let envelope = EventEnvelope::new(event, source);
        let kind = envelope.kind();

        self.inner.history.lock().push(envelope.clone());

        // Snapshot, then release the lock so handlers may emit or subscribe
        let handlers: Vec<Handler> = self
            .inner
            .subscribers
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.handler.clone())
            .collect();

        trace!(kind = %kind, handlers = handlers.len(), "Emitting event");

        for handler in &handlers {
            handler(&envelope);
        }
        handlers.len()
    }

    /// Register `handler` for every future emission of `kind`
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.write().push(Subscriber {
            id,
            kind,
            handler: Arc::new(handler),
        });
        trace!(kind = %kind, id, "Subscribed");

        Subscription {
            id,
            kind,
            channel: Arc::downgrade(&self.inner),
            active: AtomicBool::new(true),
        }
    }

    /// Full emission log, oldest first
    pub fn history(&self) -> Vec<EventEnvelope> {
        self.inner.history.lock().clone()
    }

    /// Emission log as a JSON array, for diagnostics export
    pub fn history_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.inner.history.lock())
    }

    /// Number of live handlers for `kind`
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .subscribers
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Handle that does not keep the channel alive
    ///
    /// Handlers that need to emit back onto the channel capture this to
    /// avoid a reference cycle through the subscriber list.
    pub fn downgrade(&self) -> WeakEventChannel {
        WeakEventChannel {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscribers", &self.inner.subscribers.read().len())
            .field("history", &self.inner.history.lock().len())
            .finish()
    }
}

/// Non-owning channel handle, see [`EventChannel::downgrade`]
#[derive(Clone)]
pub struct WeakEventChannel {
    inner: Weak<ChannelInner>,
}

impl WeakEventChannel {
    pub fn upgrade(&self) -> Option<EventChannel> {
        self.inner.upgrade().map(|inner| EventChannel { inner })
    }
}

/// Registration handle returned by [`EventChannel::subscribe`]
///
/// Unsubscribing is idempotent and only ever removes this registration.
/// Dropping the handle unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    kind: EventKind,
    channel: Weak<ChannelInner>,
    active: AtomicBool,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.channel.upgrade() {
            inner.remove(self.id);
            trace!(kind = %self.kind, id = self.id, "Unsubscribed");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{OutputStream, ThinkingStage};
    use uuid::Uuid;

    fn thinking(msg: &str) -> AgentEvent {
        AgentEvent::thinking(ThinkingStage::Processing, msg)
    }

    type BoxedHandler = Box<dyn Fn(&EventEnvelope) + Send + Sync>;

    /// Shared log plus a factory for handlers that append their tag to it
    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> BoxedHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_factory = log.clone();
        let factory = move |tag: &str| {
            let log = log_for_factory.clone();
            let tag = tag.to_string();
            Box::new(move |_: &EventEnvelope| log.lock().push(tag.clone()))
                as BoxedHandler
        };
        (log, factory)
    }

    #[test]
    fn test_delivers_in_subscription_order() {
        let channel = EventChannel::new();
        let (log, handler) = recorder();

        let _a = channel.subscribe(EventKind::AgentThinking, handler("a"));
        let _b = channel.subscribe(EventKind::AgentThinking, handler("b"));
        let _c = channel.subscribe(EventKind::AgentThinking, handler("c"));

        let delivered = channel.emit(thinking("x"), None);

        assert_eq!(delivered, 3);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_only_matching_kind_is_delivered() {
        let channel = EventChannel::new();
        let (log, handler) = recorder();

        let _exit = channel.subscribe(EventKind::RuntimeExit, handler("exit"));
        let _think = channel.subscribe(EventKind::AgentThinking, handler("think"));

        channel.emit(AgentEvent::exit(Uuid::new_v4(), 0), Some("test"));

        assert_eq!(*log.lock(), vec!["exit"]);
    }

    #[test]
    fn test_subscribe_during_delivery_misses_current_event() {
        let channel = EventChannel::new();
        let late_hits = Arc::new(AtomicU64::new(0));
        let late_subs: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

        let weak = channel.downgrade();
        let hits = late_hits.clone();
        let subs = late_subs.clone();
        let _outer = channel.subscribe(EventKind::AgentThinking, move |_| {
            let Some(channel) = weak.upgrade() else {
                return;
            };
            let hits = hits.clone();
            subs.lock().push(channel.subscribe(EventKind::AgentThinking, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        });

        channel.emit(thinking("first"), None);
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);

        channel.emit(thinking("second"), None);
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_twice_leaves_other_handlers() {
        let channel = EventChannel::new();
        let (log, handler) = recorder();

        let first = channel.subscribe(EventKind::AgentThinking, handler("first"));
        let _second = channel.subscribe(EventKind::AgentThinking, handler("second"));

        first.unsubscribe();
        first.unsubscribe();
        assert!(!first.is_active());
        assert_eq!(channel.subscriber_count(EventKind::AgentThinking), 1);

        channel.emit(thinking("x"), None);
        assert_eq!(*log.lock(), vec!["second"]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let channel = EventChannel::new();
        {
            let _sub = channel.subscribe(EventKind::RuntimeOutput, |_| {});
            assert_eq!(channel.subscriber_count(EventKind::RuntimeOutput), 1);
        }
        assert_eq!(channel.subscriber_count(EventKind::RuntimeOutput), 0);
    }

    #[test]
    fn test_unsubscribe_after_channel_dropped_is_harmless() {
        let channel = EventChannel::new();
        let sub = channel.subscribe(EventKind::RuntimeExit, |_| {});
        drop(channel);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }

    #[test]
    fn test_history_is_append_only_and_ordered() {
        let channel = EventChannel::new();
        let id = Uuid::new_v4();

        channel.emit(thinking("one"), Some("orchestrator"));
        channel.emit(AgentEvent::output(id, OutputStream::Stdout, "out"), Some("runtime"));
        channel.emit(AgentEvent::exit(id, 0), Some("runtime"));

        let history = channel.history();
        let kinds: Vec<EventKind> = history.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::AgentThinking,
                EventKind::RuntimeOutput,
                EventKind::RuntimeExit
            ]
        );
        assert_eq!(history[0].source.as_deref(), Some("orchestrator"));

        let json = channel.history_json().unwrap();
        assert!(json.contains("RUNTIME_OUTPUT"));
    }

    #[test]
    fn test_handler_may_emit_reentrantly() {
        let channel = EventChannel::new();
        let id = Uuid::new_v4();
        let weak = channel.downgrade();

        let _responder = channel.subscribe(EventKind::AgentThinking, move |_| {
            if let Some(channel) = weak.upgrade() {
                channel.emit(AgentEvent::exit(id, 0), Some("responder"));
            }
        });

        channel.emit(thinking("ping"), None);

        let kinds: Vec<EventKind> = channel.history().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::AgentThinking, EventKind::RuntimeExit]);
    }
}
