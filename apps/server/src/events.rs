//! Typed, priority-ordered event dispatch
//!
//! Every stateful entity owns an [`EventBus`] and publishes immutable facts
//! through it. Listeners subscribe per event type with a priority: lower
//! numbers run first and ties keep subscription order. A publish works on a
//! snapshot of the listener list, so subscribing or unsubscribing from
//! inside a listener only affects later publishes.
//!
//! The bus is generic over a dispatch context handed mutably to every
//! listener. A session bus passes its locked state so listeners can record
//! history or fan packets out without re-entering the session lock.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Marker for values that can be published on an [`EventBus`]
pub trait Event: Any + Send + Sync {}

type ErasedListener<C> = Arc<dyn Fn(&mut C, &dyn Any) + Send + Sync>;

struct ListenerEntry<C> {
    id: u64,
    priority: i32,
    listener: ErasedListener<C>,
}

/// Returned by [`EventBus::subscribe`], consumed by [`EventBus::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    event_type: TypeId,
    id: u64,
}

/// Publish/subscribe registry keyed by event type
pub struct EventBus<C = ()> {
    listeners: RwLock<HashMap<TypeId, Vec<ListenerEntry<C>>>>,
    next_id: AtomicU64,
}

impl<C: 'static> EventBus<C> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `listener` for events of type `E`
    pub fn subscribe<E, F>(&self, priority: i32, listener: F) -> SubscriptionHandle
    where
        E: Event,
        F: Fn(&mut C, &E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let erased: ErasedListener<C> = Arc::new(move |ctx: &mut C, event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                listener(ctx, event);
            }
        });

        let event_type = TypeId::of::<E>();
        let mut listeners = self.listeners.write();
        let entries = listeners.entry(event_type).or_default();
        // Insert after every entry of equal priority so ties keep subscription order.
        let position = entries.partition_point(|entry| entry.priority <= priority);
        entries.insert(
            position,
            ListenerEntry {
                id,
                priority,
                listener: erased,
            },
        );

        SubscriptionHandle { event_type, id }
    }

    /// Remove a listener. Returns false when it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(&handle.event_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != handle.id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&handle.event_type);
        }
        removed
    }

    /// Dispatch `event` to every listener of its type, in priority order
    ///
    /// A panicking listener is logged and skipped; the remaining listeners
    /// still run. The event is handed back to the caller afterwards.
    pub fn publish<E: Event>(&self, ctx: &mut C, event: E) -> E {
        let snapshot: Vec<(u64, ErasedListener<C>)> = self
            .listeners
            .read()
            .get(&TypeId::of::<E>())
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| (entry.id, Arc::clone(&entry.listener)))
                    .collect()
            })
            .unwrap_or_default();

        for (listener_id, listener) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(ctx, &event as &dyn Any)));
            if let Err(payload) = outcome {
                tracing::error!(
                    event = type_name::<E>(),
                    listener_id,
                    panic = panic_message(payload.as_ref()),
                    "Event listener panicked"
                );
            }
        }

        event
    }

    /// Number of listeners currently registered for `E`
    pub fn listener_count<E: Event>(&self) -> usize {
        self.listeners
            .read()
            .get(&TypeId::of::<E>())
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl<C: 'static> Default for EventBus<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for EventBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        f.debug_struct("EventBus")
            .field("event_types", &listeners.len())
            .field(
                "listeners",
                &listeners.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Ping;
    impl Event for Ping {}

    struct Pong(u32);
    impl Event for Pong {}

    #[test]
    fn test_priority_order_independent_of_registration() {
        let bus: EventBus<Vec<i32>> = EventBus::new();
        for priority in [5, -5, 0] {
            bus.subscribe::<Ping, _>(priority, move |log, _| log.push(priority));
        }

        let mut log = Vec::new();
        bus.publish(&mut log, Ping);
        assert_eq!(log, vec![-5, 0, 5]);
    }

    #[test]
    fn test_equal_priorities_keep_subscription_order() {
        let bus: EventBus<Vec<&'static str>> = EventBus::new();
        bus.subscribe::<Ping, _>(0, |log, _| log.push("first"));
        bus.subscribe::<Ping, _>(-1, |log, _| log.push("early"));
        bus.subscribe::<Ping, _>(0, |log, _| log.push("second"));

        let mut log = Vec::new();
        bus.publish(&mut log, Ping);
        assert_eq!(log, vec!["early", "first", "second"]);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_dispatch() {
        let bus: EventBus<Vec<&'static str>> = EventBus::new();
        bus.subscribe::<Ping, _>(0, |log, _| log.push("before"));
        bus.subscribe::<Ping, _>(1, |_, _| panic!("listener failure"));
        bus.subscribe::<Ping, _>(2, |log, _| log.push("after"));

        let mut log = Vec::new();
        bus.publish(&mut log, Ping);
        assert_eq!(log, vec!["before", "after"]);
    }

    #[test]
    fn test_events_are_routed_by_type() {
        let bus: EventBus<Vec<u32>> = EventBus::new();
        bus.subscribe::<Pong, _>(0, |log, event| log.push(event.0));
        bus.subscribe::<Ping, _>(0, |log, _| log.push(0));

        let mut log = Vec::new();
        let returned = bus.publish(&mut log, Pong(7));
        assert_eq!(returned.0, 7);
        assert_eq!(log, vec![7]);
        assert_eq!(bus.listener_count::<Pong>(), 1);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_affects_only_later_publishes() {
        let bus: Arc<EventBus<Vec<&'static str>>> = Arc::new(EventBus::new());
        let victim: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        {
            let bus_ref = Arc::downgrade(&bus);
            let victim = Arc::clone(&victim);
            bus.subscribe::<Ping, _>(0, move |log, _| {
                log.push("remover");
                if let (Some(bus), Some(handle)) = (bus_ref.upgrade(), victim.lock().take()) {
                    assert!(bus.unsubscribe(handle));
                }
            });
        }
        let handle = bus.subscribe::<Ping, _>(1, |log, _| log.push("victim"));
        *victim.lock() = Some(handle);

        let mut log = Vec::new();
        bus.publish(&mut log, Ping);
        assert_eq!(log, vec!["remover", "victim"]);

        log.clear();
        bus.publish(&mut log, Ping);
        assert_eq!(log, vec!["remover"]);
    }

    #[test]
    fn test_subscribe_during_dispatch_not_invoked_in_flight() {
        let bus: Arc<EventBus<Vec<&'static str>>> = Arc::new(EventBus::new());
        let added = Arc::new(Mutex::new(false));

        {
            let bus_ref = Arc::downgrade(&bus);
            let added = Arc::clone(&added);
            bus.subscribe::<Ping, _>(0, move |log, _| {
                log.push("adder");
                let mut added = added.lock();
                if !*added {
                    *added = true;
                    if let Some(bus) = bus_ref.upgrade() {
                        bus.subscribe::<Ping, _>(10, |log, _| log.push("late"));
                    }
                }
            });
        }

        let mut log = Vec::new();
        bus.publish(&mut log, Ping);
        assert_eq!(log, vec!["adder"]);

        log.clear();
        bus.publish(&mut log, Ping);
        assert_eq!(log, vec!["adder", "late"]);
    }

    #[test]
    fn test_unsubscribe_twice_reports_absence() {
        let bus: EventBus = EventBus::new();
        let handle = bus.subscribe::<Ping, _>(0, |_, _| {});
        assert!(bus.unsubscribe(handle));
        assert!(!bus.unsubscribe(handle));
        assert_eq!(bus.listener_count::<Ping>(), 0);
    }
}
