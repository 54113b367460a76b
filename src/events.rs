use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;

use crate::models::Task;

pub const EVENT_TODO_ADDED: &str = "todo_added";
pub const EVENT_TODO_UPDATED: &str = "todo_updated";
pub const EVENT_TODO_DELETED: &str = "todo_deleted";
pub const EVENT_TODO_COMPLETED: &str = "todo_completed";
pub const EVENT_TODO_SNOOZED: &str = "todo_snoozed";
pub const EVENT_STORAGE_CHANGED: &str = "storage_changed";
pub const EVENT_TAG_ADDED: &str = "tag_added";
pub const EVENT_TAG_UPDATED: &str = "tag_updated";
pub const EVENT_TAG_DELETED: &str = "tag_deleted";
pub const EVENT_TAGS_CHANGED: &str = "tags_changed";

/// What a mutation hands to subscribers. Serializable so the bridge can
/// forward it to the webview unchanged.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Task(Task),
    #[serde(rename_all = "camelCase")]
    Snooze { task_id: String, hours: i64 },
    Tag {
        name: String,
        keywords: Vec<String>,
    },
    TagName { name: String },
    None,
}

type Handler = Arc<dyn Fn(&EventPayload) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: HashMap<String, Vec<(u64, Handler)>>,
}

/// Synchronous publish/subscribe keyed by event name. Deliberately an
/// injectable value, not a module-level singleton: tests build isolated
/// buses and the bootstrap composes one shared instance.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`. Handlers for one event run in
    /// registration order.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().expect("event bus poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            event: event.to_string(),
            id,
        }
    }

    /// Invokes all current subscribers synchronously. The handler list is
    /// snapshotted up front: unsubscribing mid-emit only affects later
    /// emits, and handlers may freely touch the bus without deadlocking.
    pub fn emit(&self, event: &str, payload: EventPayload) {
        let snapshot: Vec<Handler> = {
            let inner = self.inner.lock().expect("event bus poisoned");
            inner
                .handlers
                .get(event)
                .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in snapshot {
            handler(&payload);
        }
    }
}

/// Handle returned by [`EventBus::on`]; consumes itself to detach the
/// handler. Dropping the subscription keeps the handler registered.
pub struct Subscription {
    inner: Weak<Mutex<BusInner>>,
    event: String,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock().expect("event bus poisoned");
        if let Some(entries) = inner.handlers.get_mut(&self.event) {
            entries.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_handler(log: &Arc<Mutex<Vec<String>>>, label: &str) -> impl Fn(&EventPayload) + Send + Sync + 'static {
        let log = Arc::clone(log);
        let label = label.to_string();
        move |_payload| log.lock().unwrap().push(label.clone())
    }

    #[test]
    fn emit_runs_handlers_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _a = bus.on(EVENT_TODO_ADDED, recording_handler(&log, "a"));
        let _b = bus.on(EVENT_TODO_ADDED, recording_handler(&log, "b"));
        let _other = bus.on(EVENT_STORAGE_CHANGED, recording_handler(&log, "other"));

        bus.emit(EVENT_TODO_ADDED, EventPayload::None);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.emit(EVENT_TODO_DELETED, EventPayload::None);
    }

    #[test]
    fn unsubscribe_detaches_only_that_handler() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let a = bus.on(EVENT_TAGS_CHANGED, recording_handler(&log, "a"));
        let _b = bus.on(EVENT_TAGS_CHANGED, recording_handler(&log, "b"));
        a.unsubscribe();

        bus.emit(EVENT_TAGS_CHANGED, EventPayload::None);
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }

    #[test]
    fn unsubscribing_mid_emit_keeps_the_current_pass_intact() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let second = Arc::new(Mutex::new(None));
        {
            let second = Arc::clone(&second);
            let log = Arc::clone(&log);
            bus.on(EVENT_TODO_UPDATED, move |_payload| {
                log.lock().unwrap().push("first".to_string());
                if let Some(sub) = second.lock().unwrap().take() {
                    Subscription::unsubscribe(sub);
                }
            });
        }
        *second.lock().unwrap() = Some(bus.on(EVENT_TODO_UPDATED, recording_handler(&log, "second")));

        // First emit: "second" was unsubscribed by "first", but the pass
        // already snapshotted both handlers.
        bus.emit(EVENT_TODO_UPDATED, EventPayload::None);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

        // Second emit: only "first" remains.
        bus.emit(EVENT_TODO_UPDATED, EventPayload::None);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "first"]);
    }

    #[test]
    fn snooze_payload_serializes_camel_case() {
        let payload = EventPayload::Snooze {
            task_id: "t1".to_string(),
            hours: 24,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["taskId"], "t1");
        assert_eq!(value["hours"], 24);
    }
}
