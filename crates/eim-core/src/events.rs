//! Apply events for monitoring record application.
//!
//! `Dispatcher` emits an `ApplyEvent` for every record it applies, skips or
//! fails. Subscribers hold a `Subscription`; dropping it unsubscribes.

use crate::item::StampKind;
use crate::record::SchemaId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ApplyEvent {
    /// A record was applied to the item.
    RecordApplied {
        #[serde(rename = "itemUid")]
        item_uid: String,
        schema: SchemaId,
    },
    /// A record for an unregistered schema was skipped.
    RecordSkipped {
        #[serde(rename = "itemUid")]
        item_uid: String,
        schema: SchemaId,
    },
    /// A record failed and the item was left as it was before the record.
    RecordFailed {
        #[serde(rename = "itemUid")]
        item_uid: String,
        schema: SchemaId,
        error: String,
    },
    /// A stamp was attached on first use.
    StampCreated {
        #[serde(rename = "itemUid")]
        item_uid: String,
        stamp: StampKind,
    },
    /// The item became a modification of `master`.
    LinkEstablished {
        #[serde(rename = "itemUid")]
        item_uid: String,
        master: String,
    },
    /// A deleted record set marked the item inactive.
    ItemDeactivated {
        #[serde(rename = "itemUid")]
        item_uid: String,
    },
}

/// Keeps a callback subscribed; dropping it unsubscribes.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(ApplyEvent) + Send + Sync>;

/// Fan-out of apply events to subscribers.
///
/// Wrap in `Arc` to subscribe. Publishers should go through `emit_with` so
/// that no event is built while nobody listens.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<BTreeMap<u64, Callback>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(ApplyEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::new(callback));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn emit(&self, event: ApplyEvent) {
        self.emit_with(|| event);
    }

    /// Build the event only if someone is subscribed.
    pub fn emit_with(&self, event: impl FnOnce() -> ApplyEvent) {
        // Callbacks run on a snapshot, outside the lock, so they may
        // subscribe or drop a subscription.
        let callbacks: Vec<Callback> = {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            if subscribers.is_empty() {
                return;
            }
            subscribers.values().cloned().collect()
        };

        let event = event();
        let Some((last, rest)) = callbacks.split_last() else {
            return;
        };
        for callback in rest {
            callback(event.clone());
        }
        last(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn applied(uid: &str) -> ApplyEvent {
        ApplyEvent::RecordApplied {
            item_uid: uid.into(),
            schema: SchemaId::new("note", "http://osafoundation.org/eim/note/0"),
        }
    }

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let _sub = bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });
        bus.emit(applied("n1"));

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        {
            let _sub = bus.subscribe(move |event| {
                seen_clone.lock().unwrap().push(event);
            });
            bus.emit(applied("n1"));
        }
        bus.emit(applied("n2"));

        assert_eq!(seen.lock().unwrap().len(), 1, "Dropped subscription must not fire");
    }

    #[test]
    fn test_emit_without_subscribers_builds_nothing() {
        let bus = Arc::new(EventBus::new());
        let built = AtomicUsize::new(0);

        bus.emit_with(|| {
            built.fetch_add(1, Ordering::Relaxed);
            applied("n1")
        });
        assert_eq!(built.load(Ordering::Relaxed), 0);

        let sub = bus.subscribe(|_event| {});
        assert_eq!(bus.subscriber_count(), 1);
        bus.emit_with(|| {
            built.fetch_add(1, Ordering::Relaxed);
            applied("n1")
        });
        assert_eq!(built.load(Ordering::Relaxed), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_every_subscriber_receives_the_event() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subs: Vec<_> = (0..3)
            .map(|n| {
                let seen = Arc::clone(&seen);
                bus.subscribe(move |event| {
                    if let ApplyEvent::RecordApplied { item_uid, .. } = event {
                        seen.lock().unwrap().push((n, item_uid));
                    }
                })
            })
            .collect();

        bus.emit(applied("n1"));

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![(0, "n1".to_string()), (1, "n1".to_string()), (2, "n1".to_string())]
        );
        drop(subs);
    }

    #[test]
    fn test_apply_event_serialization() {
        let event = ApplyEvent::StampCreated {
            item_uid: "n1".into(),
            stamp: StampKind::Event,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"stampCreated\""));
        assert!(json.contains("\"itemUid\":\"n1\""));
        assert!(json.contains("\"stamp\":\"event\""));
    }
}
