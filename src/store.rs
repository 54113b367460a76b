use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::clock::Clock;
use crate::events::{
    EventBus, EventPayload, EVENT_STORAGE_CHANGED, EVENT_TAGS_CHANGED, EVENT_TAG_ADDED,
    EVENT_TAG_DELETED, EVENT_TAG_UPDATED, EVENT_TODO_ADDED, EVENT_TODO_COMPLETED,
    EVENT_TODO_DELETED, EVENT_TODO_SNOOZED, EVENT_TODO_UPDATED,
};
use crate::models::{TagRegistry, Task};
use crate::notify::NotificationScheduler;
use crate::recurrence::{format_date, next_due_date, parse_date};
use crate::reminders::ReminderCoordinator;
use crate::storage::{KeyValueStore, StorageError, SNOOZE_DURATION_KEY, TAGS_KEY, TODOS_KEY};

pub const DEFAULT_SNOOZE_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
}

impl ToggleOutcome {
    fn failure() -> Self {
        Self {
            success: false,
            task: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnoozeOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_due_date: Option<String>,
}

impl SnoozeOutcome {
    fn failure() -> Self {
        Self {
            success: false,
            new_due_date: None,
        }
    }
}

/// Materializes the follow-up task for a completed repeating task. The
/// store itself never calls this: deciding when the next occurrence comes
/// into existence stays with the caller layer. Returns `None` for
/// non-repeating tasks.
pub fn next_recurring_instance(completed: &Task, now: NaiveDateTime) -> Option<Task> {
    if !completed.recurring.is_repeating() {
        return None;
    }
    let current_due = completed
        .due_date
        .clone()
        .unwrap_or_else(|| format_date(now.date()));
    let mut next = completed.clone();
    next.id = format!("{}-{}", completed.id, now.and_utc().timestamp());
    next.completed = false;
    next.due_date = Some(next_due_date(&current_due, completed.recurring));
    next.original_due_date = completed
        .original_due_date
        .clone()
        .or(Some(current_due));
    next.is_recurring_instance = true;
    Some(next)
}

/// Owns the task collection's lifecycle. Every mutation runs
/// load -> validate -> mutate -> persist -> reminder side effects ->
/// events, and converts unexpected failures into failure return values at
/// this boundary. The collection is rewritten whole on each mutation;
/// concurrent operations are last-write-wins by design.
pub struct TaskStore<K, N, C> {
    kv: Arc<K>,
    reminders: ReminderCoordinator<K, N>,
    clock: Arc<C>,
    bus: EventBus,
}

impl<K, N, C> Clone for TaskStore<K, N, C> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            reminders: self.reminders.clone(),
            clock: Arc::clone(&self.clock),
            bus: self.bus.clone(),
        }
    }
}

impl<K: KeyValueStore, N: NotificationScheduler, C: Clock> TaskStore<K, N, C> {
    pub fn new(kv: Arc<K>, scheduler: Arc<N>, clock: Arc<C>, bus: EventBus) -> Self {
        Self {
            reminders: ReminderCoordinator::new(Arc::clone(&kv), scheduler),
            kv,
            clock,
            bus,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn reminders(&self) -> &ReminderCoordinator<K, N> {
        &self.reminders
    }

    /// The full collection. Corrupt or unreadable storage is an empty
    /// collection, not an error.
    pub async fn list(&self) -> Vec<Task> {
        match self.kv.get(TODOS_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                log::warn!("task collection unreadable, treating as empty: {err}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                log::warn!("could not read task collection: {err}");
                Vec::new()
            }
        }
    }

    async fn persist(&self, tasks: &[Task]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(tasks)?;
        self.kv.set(TODOS_KEY, &raw).await
    }

    pub async fn add(&self, task: Task) -> bool {
        if task.id.trim().is_empty() || task.name.trim().is_empty() {
            log::warn!("rejecting task with missing id or name");
            return false;
        }
        let mut tasks = self.list().await;
        if tasks.iter().any(|existing| existing.id == task.id) {
            log::warn!("rejecting duplicate task id {}", task.id);
            return false;
        }
        tasks.push(task.clone());
        if let Err(err) = self.persist(&tasks).await {
            log::error!("could not persist new task {}: {err}", task.id);
            return false;
        }

        if task.reminder_active() {
            self.reminders.sync_task(&task, self.clock.now()).await;
        }

        self.bus.emit(EVENT_TODO_ADDED, EventPayload::Task(task));
        self.bus.emit(EVENT_STORAGE_CHANGED, EventPayload::None);
        true
    }

    /// Replaces an existing task wholesale. Not an upsert: an unknown id
    /// is a validation failure with no write.
    pub async fn update(&self, task: Task) -> bool {
        let mut tasks = self.list().await;
        let Some(slot) = tasks.iter_mut().find(|existing| existing.id == task.id) else {
            return false;
        };
        *slot = task.clone();
        if let Err(err) = self.persist(&tasks).await {
            log::error!("could not persist update of task {}: {err}", task.id);
            return false;
        }

        // The new state decides: this may schedule, reschedule, or cancel.
        self.reminders.sync_task(&task, self.clock.now()).await;

        self.bus.emit(EVENT_TODO_UPDATED, EventPayload::Task(task));
        self.bus.emit(EVENT_STORAGE_CHANGED, EventPayload::None);
        true
    }

    pub async fn remove(&self, id: &str) -> bool {
        let mut tasks = self.list().await;
        let Some(position) = tasks.iter().position(|task| task.id == id) else {
            return false;
        };
        let removed = tasks.remove(position);
        if let Err(err) = self.persist(&tasks).await {
            log::error!("could not persist removal of task {id}: {err}");
            return false;
        }

        self.reminders.cancel_task(id).await;

        self.bus.emit(EVENT_TODO_DELETED, EventPayload::Task(removed));
        self.bus.emit(EVENT_STORAGE_CHANGED, EventPayload::None);
        true
    }

    /// Flips completion. Completing cancels the task's reminders; marking
    /// incomplete re-evaluates them. Completing a repeating task does NOT
    /// create the next occurrence here; see [`next_recurring_instance`].
    pub async fn toggle_completion(&self, id: &str) -> ToggleOutcome {
        let mut tasks = self.list().await;
        let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
            return ToggleOutcome::failure();
        };
        task.completed = !task.completed;
        let updated = task.clone();
        if let Err(err) = self.persist(&tasks).await {
            log::error!("could not persist completion toggle of task {id}: {err}");
            return ToggleOutcome::failure();
        }

        if updated.completed {
            self.reminders.cancel_task(id).await;
        } else if updated.reminder_active() {
            self.reminders.sync_task(&updated, self.clock.now()).await;
        }

        self.bus
            .emit(EVENT_TODO_COMPLETED, EventPayload::Task(updated.clone()));
        self.bus.emit(EVENT_STORAGE_CHANGED, EventPayload::None);
        ToggleOutcome {
            success: true,
            task: Some(updated),
        }
    }

    /// Shifts the due date forward by `hours` from the due date's
    /// midnight. Day rollover falls out of the datetime arithmetic; the
    /// recurrence anchor (`original_due_date`) is untouched.
    pub async fn snooze(&self, id: &str, hours: i64) -> SnoozeOutcome {
        let now = self.clock.now();
        let mut tasks = self.list().await;
        let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
            return SnoozeOutcome::failure();
        };

        let base = task
            .due_date
            .as_deref()
            .and_then(parse_date)
            .unwrap_or_else(|| now.date());
        let shifted = base.and_time(NaiveTime::MIN) + Duration::hours(hours);
        let new_due_date = format_date(shifted.date());
        task.due_date = Some(new_due_date.clone());
        let updated = task.clone();

        if let Err(err) = self.persist(&tasks).await {
            log::error!("could not persist snooze of task {id}: {err}");
            return SnoozeOutcome::failure();
        }

        if updated.reminder_active() {
            // Sweeps stale escalations and reschedules against the new
            // date, which may now be due today.
            self.reminders.sync_task(&updated, now).await;
        }

        self.bus.emit(
            EVENT_TODO_SNOOZED,
            EventPayload::Snooze {
                task_id: id.to_string(),
                hours,
            },
        );
        self.bus.emit(EVENT_STORAGE_CHANGED, EventPayload::None);
        SnoozeOutcome {
            success: true,
            new_due_date: Some(new_due_date),
        }
    }

    /// Tag registry. Unreadable storage is an empty registry.
    pub async fn tags(&self) -> TagRegistry {
        match self.kv.get(TAGS_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                log::warn!("tag registry unreadable, treating as empty: {err}");
                TagRegistry::new()
            }),
            Ok(None) => TagRegistry::new(),
            Err(err) => {
                log::warn!("could not read tag registry: {err}");
                TagRegistry::new()
            }
        }
    }

    async fn persist_tags(&self, tags: &TagRegistry) -> Result<(), StorageError> {
        let raw = serde_json::to_string(tags)?;
        self.kv.set(TAGS_KEY, &raw).await
    }

    pub async fn add_tag(&self, name: &str, keywords: Vec<String>) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let mut tags = self.tags().await;
        if tags.contains_key(name) {
            return false;
        }
        tags.insert(name.to_string(), keywords.clone());
        if let Err(err) = self.persist_tags(&tags).await {
            log::error!("could not persist tag {name}: {err}");
            return false;
        }

        self.bus.emit(
            EVENT_TAG_ADDED,
            EventPayload::Tag {
                name: name.to_string(),
                keywords,
            },
        );
        self.bus.emit(EVENT_TAGS_CHANGED, EventPayload::None);
        true
    }

    pub async fn update_tag(&self, name: &str, keywords: Vec<String>) -> bool {
        let mut tags = self.tags().await;
        let Some(slot) = tags.get_mut(name) else {
            return false;
        };
        *slot = keywords.clone();
        if let Err(err) = self.persist_tags(&tags).await {
            log::error!("could not persist tag update {name}: {err}");
            return false;
        }

        self.bus.emit(
            EVENT_TAG_UPDATED,
            EventPayload::Tag {
                name: name.to_string(),
                keywords,
            },
        );
        self.bus.emit(EVENT_TAGS_CHANGED, EventPayload::None);
        true
    }

    pub async fn remove_tag(&self, name: &str) -> bool {
        let mut tags = self.tags().await;
        if tags.remove(name).is_none() {
            return false;
        }
        if let Err(err) = self.persist_tags(&tags).await {
            log::error!("could not persist tag removal {name}: {err}");
            return false;
        }

        self.bus.emit(
            EVENT_TAG_DELETED,
            EventPayload::TagName {
                name: name.to_string(),
            },
        );
        self.bus.emit(EVENT_TAGS_CHANGED, EventPayload::None);
        true
    }

    /// Hours the notification Snooze action pushes a task forward.
    /// Absent or malformed values fall back to the default.
    pub async fn snooze_duration(&self) -> i64 {
        match self.kv.get(SNOOZE_DURATION_KEY).await {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or(DEFAULT_SNOOZE_HOURS),
            Ok(None) => DEFAULT_SNOOZE_HOURS,
            Err(err) => {
                log::warn!("could not read snooze duration: {err}");
                DEFAULT_SNOOZE_HOURS
            }
        }
    }

    pub async fn set_snooze_duration(&self, hours: i64) -> bool {
        if hours <= 0 {
            return false;
        }
        if let Err(err) = self.kv.set(SNOOZE_DURATION_KEY, &hours.to_string()).await {
            log::error!("could not persist snooze duration: {err}");
            return false;
        }
        self.bus.emit(EVENT_STORAGE_CHANGED, EventPayload::None);
        true
    }
}
