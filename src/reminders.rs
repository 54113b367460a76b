use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::Task;
use crate::notify::{
    NotificationContent, NotificationScheduler, CATEGORY_TASK_OVERDUE, CATEGORY_TASK_REMINDER,
};
use crate::recurrence::{self, next_due_date};
use crate::storage::KeyValueStore;

/// Minutes before the due instant at which escalating reminders fire.
/// A deliberate fixed-cardinality design: cancellation always sweeps all
/// four slots, regardless of how many were actually scheduled.
pub const ESCALATION_OFFSETS_MIN: [i64; 4] = [60, 30, 10, 1];

/// How many future occurrences of a repeating series get pre-scheduled.
pub const RECURRING_LOOKAHEAD: usize = 3;

/// When a reminder has no usable time of day, the task counts as due at
/// the very end of its due date.
pub const FALLBACK_DUE_TIME: (u32, u32) = (23, 59);

/// Diagnostic bypass for the past-trigger filter. Setting this schedules
/// reminders even when their computed trigger already passed, which makes
/// them fire on the next scheduler tick. Never set in production.
pub const ALLOW_PAST_REMINDERS_ENV: &str = "DUEBELL_ALLOW_PAST_REMINDERS";

fn regular_key(task_id: &str) -> String {
    format!("notification_{task_id}")
}

fn escalating_key(task_id: &str, slot: usize) -> String {
    format!("notification_escalating_{task_id}_{slot}")
}

fn recurring_key(task_id: &str, slot: usize) -> String {
    format!("notification_recurring_{task_id}_{slot}")
}

fn allow_past_reminders() -> bool {
    std::env::var_os(ALLOW_PAST_REMINDERS_ENV).is_some()
}

pub fn parse_reminder_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// The instant a task is considered due: its due date at the reminder's
/// time of day, or 23:59 when no usable time is configured.
pub fn due_instant(due_date: NaiveDate, reminder_time: Option<&str>) -> NaiveDateTime {
    let time = reminder_time
        .and_then(parse_reminder_time)
        .unwrap_or_else(|| {
            let (hour, minute) = FALLBACK_DUE_TIME;
            NaiveTime::from_hms_opt(hour, minute, 0).expect("fallback time is valid")
        });
    due_date.and_time(time)
}

/// Candidate escalating triggers still ahead of `now`, as
/// `(slot, minutes-before-due, trigger)`.
pub fn escalation_candidates(
    due: NaiveDateTime,
    now: NaiveDateTime,
) -> Vec<(usize, i64, NaiveDateTime)> {
    ESCALATION_OFFSETS_MIN
        .iter()
        .enumerate()
        .filter_map(|(slot, minutes)| {
            let trigger = due - Duration::minutes(*minutes);
            (trigger > now).then_some((slot, *minutes, trigger))
        })
        .collect()
}

fn escalation_message(minutes: i64) -> String {
    if minutes == 1 {
        "Due in 1 minute! Finish up now!".to_string()
    } else {
        format!("Due in {minutes} minutes!")
    }
}

/// Decides which notifications a task needs after a lifecycle transition
/// and keeps the notification-id mapping in the key-value store in step.
/// Never mutates tasks and never creates recurring instances; both belong
/// to the layers above.
pub struct ReminderCoordinator<K, N> {
    kv: Arc<K>,
    scheduler: Arc<N>,
}

impl<K, N> Clone for ReminderCoordinator<K, N> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            scheduler: Arc::clone(&self.scheduler),
        }
    }
}

impl<K: KeyValueStore, N: NotificationScheduler> ReminderCoordinator<K, N> {
    pub fn new(kv: Arc<K>, scheduler: Arc<N>) -> Self {
        Self { kv, scheduler }
    }

    /// Full decision tree for the task's current state. Every path cancels
    /// before it schedules; a task that no longer needs reminders ends up
    /// with none. Scheduling failures are logged and swallowed so the
    /// owning mutation still succeeds.
    pub async fn sync_task(&self, task: &Task, now: NaiveDateTime) {
        if !task.reminder_active() {
            self.cancel_task(&task.id).await;
            return;
        }
        let Some(due_date) = task.due_date.as_deref().and_then(recurrence::parse_date) else {
            self.cancel_task(&task.id).await;
            return;
        };

        self.schedule_regular(task, due_date, now).await;
        self.schedule_escalating(task, due_date, now).await;
        self.schedule_lookahead(task, now).await;
    }

    /// Unconditionally cancels everything scheduled for `task_id`:
    /// the regular slot, all four escalating slots, and all look-ahead
    /// slots. Idempotent; orphaned mapping entries are tolerated.
    pub async fn cancel_task(&self, task_id: &str) {
        self.cancel_mapped(&regular_key(task_id)).await;
        for slot in 0..ESCALATION_OFFSETS_MIN.len() {
            self.cancel_mapped(&escalating_key(task_id, slot)).await;
        }
        for slot in 0..RECURRING_LOOKAHEAD {
            self.cancel_mapped(&recurring_key(task_id, slot)).await;
        }
    }

    /// Raises an immediate overdue alert for a task whose due date has
    /// passed. Fired by the shell on launch, outside the scheduled-reminder
    /// bookkeeping, so it keeps no mapping entry.
    pub async fn alert_overdue(&self, task: &Task) {
        let body = match task.due_date.as_deref() {
            Some(due) => format!("Overdue since {due}"),
            None => "This task is overdue".to_string(),
        };
        let content = NotificationContent::new(task.name.clone(), body, task.id.clone())
            .with_category(CATEGORY_TASK_OVERDUE);
        if let Err(err) = self.scheduler.schedule_immediate(content).await {
            log::warn!("could not raise overdue alert for task {}: {err}", task.id);
        }
    }

    async fn schedule_regular(&self, task: &Task, due_date: NaiveDate, now: NaiveDateTime) {
        self.cancel_mapped(&regular_key(&task.id)).await;

        let time = task.reminder.as_ref().map(|r| r.time.as_str());
        let trigger = due_instant(due_date, time);
        if trigger <= now && !allow_past_reminders() {
            log::debug!("skipping past reminder for task {}", task.id);
            return;
        }

        let content = self.reminder_content(task, None);
        self.schedule_mapped(&regular_key(&task.id), content, trigger)
            .await;
    }

    async fn schedule_escalating(&self, task: &Task, due_date: NaiveDate, now: NaiveDateTime) {
        // The sweep covers every slot a previous state may have filled,
        // not just the ones about to be scheduled.
        for slot in 0..ESCALATION_OFFSETS_MIN.len() {
            self.cancel_mapped(&escalating_key(&task.id, slot)).await;
        }

        if due_date != now.date() {
            return;
        }

        let time = task.reminder.as_ref().map(|r| r.time.as_str());
        let due = due_instant(due_date, time);
        for (slot, minutes, trigger) in escalation_candidates(due, now) {
            let mut content = self.reminder_content(task, Some(escalation_message(minutes)));
            content.badge = Some(1);
            self.schedule_mapped(&escalating_key(&task.id, slot), content, trigger)
                .await;
        }
    }

    /// Pre-schedules reminders for the next occurrences of a repeating
    /// series. Best-effort: each slot's outcome is captured and logged
    /// individually and never aborts the caller's path.
    async fn schedule_lookahead(&self, task: &Task, now: NaiveDateTime) {
        for slot in 0..RECURRING_LOOKAHEAD {
            self.cancel_mapped(&recurring_key(&task.id, slot)).await;
        }

        if !task.recurring.is_repeating() {
            return;
        }
        let Some(current_due) = task.due_date.as_deref() else {
            return;
        };

        let time = task.reminder.as_ref().map(|r| r.time.as_str().to_string());
        let mut occurrence = current_due.to_string();
        for slot in 0..RECURRING_LOOKAHEAD {
            occurrence = next_due_date(&occurrence, task.recurring);
            let Some(date) = recurrence::parse_date(&occurrence) else {
                log::warn!(
                    "recurring look-ahead for task {} stopped at unparseable date {occurrence}",
                    task.id
                );
                return;
            };
            let trigger = due_instant(date, time.as_deref());
            if trigger <= now {
                continue;
            }
            let mut content = self.reminder_content(task, None);
            content.is_recurring_instance = true;
            self.schedule_mapped(&recurring_key(&task.id, slot), content, trigger)
                .await;
        }
    }

    fn reminder_content(&self, task: &Task, message: Option<String>) -> NotificationContent {
        let body = message.unwrap_or_else(|| {
            if task.description.is_empty() {
                "Task reminder".to_string()
            } else {
                task.description.clone()
            }
        });
        NotificationContent::new(task.name.clone(), body, task.id.clone())
            .with_category(CATEGORY_TASK_REMINDER)
    }

    async fn schedule_mapped(
        &self,
        key: &str,
        content: NotificationContent,
        trigger: NaiveDateTime,
    ) {
        match self.scheduler.schedule_at(content, trigger).await {
            Ok(notification_id) => {
                if let Err(err) = self.kv.set(key, &notification_id).await {
                    log::warn!("could not record notification mapping {key}: {err}");
                }
            }
            Err(err) => {
                log::warn!("could not schedule notification for {key}: {err}");
            }
        }
    }

    /// Cancels whatever the mapping entry points at, then drops the entry.
    /// A missing entry or an unknown notification id is success, not an
    /// error.
    async fn cancel_mapped(&self, key: &str) {
        match self.kv.get(key).await {
            Ok(Some(notification_id)) => {
                self.scheduler.cancel(&notification_id).await;
                if let Err(err) = self.kv.remove(key).await {
                    log::warn!("could not drop notification mapping {key}: {err}");
                }
            }
            Ok(None) => {}
            Err(err) => {
                log::warn!("could not read notification mapping {key}: {err}");
            }
        }
    }
}
