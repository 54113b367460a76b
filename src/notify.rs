use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

/// Interactive category for upcoming-task reminders (Complete / Snooze).
pub const CATEGORY_TASK_REMINDER: &str = "task-reminder";
/// Interactive category for overdue alerts (Complete / Reschedule).
pub const CATEGORY_TASK_OVERDUE: &str = "task-overdue";

pub const ACTION_COMPLETE: &str = "complete";
pub const ACTION_SNOOZE: &str = "snooze";
pub const ACTION_RESCHEDULE: &str = "reschedule";

#[derive(Debug)]
pub enum NotifyError {
    PermissionDenied,
    Platform(String),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::PermissionDenied => write!(f, "notification permission denied"),
            NotifyError::Platform(message) => write!(f, "platform error: {message}"),
        }
    }
}

impl std::error::Error for NotifyError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_recurring_instance: bool,
}

impl NotificationContent {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            task_id: task_id.into(),
            category: None,
            badge: None,
            sound: None,
            is_recurring_instance: false,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseAction {
    /// Plain tap on the notification body.
    Tapped,
    Complete,
    Snooze,
    Reschedule,
}

impl ResponseAction {
    pub fn from_identifier(identifier: &str) -> Self {
        match identifier {
            ACTION_COMPLETE => ResponseAction::Complete,
            ACTION_SNOOZE => ResponseAction::Snooze,
            ACTION_RESCHEDULE => ResponseAction::Reschedule,
            _ => ResponseAction::Tapped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationResponse {
    pub action: ResponseAction,
    pub task_id: String,
}

/// The platform's local-notification primitive, as the rest of the system
/// sees it. All methods must stay non-throwing past this boundary.
#[allow(async_fn_in_trait)]
pub trait NotificationScheduler: Send + Sync {
    /// Fails closed: any platform error or non-granted state is `false`.
    async fn request_permission(&self) -> bool;
    /// One-shot notification at `trigger`. Callers are expected to have
    /// filtered past-dated triggers already.
    async fn schedule_at(
        &self,
        content: NotificationContent,
        trigger: NaiveDateTime,
    ) -> Result<String, NotifyError>;
    /// Fires right away; used for overdue alerts.
    async fn schedule_immediate(&self, content: NotificationContent)
        -> Result<String, NotifyError>;
    /// Idempotent; unknown ids are a silent no-op.
    async fn cancel(&self, notification_id: &str);
    /// `false` only on platform-level failure.
    async fn cancel_all(&self) -> bool;
    /// Declares the interactive categories where the platform supports
    /// action buttons; no-op elsewhere.
    fn register_categories(&self);
    fn on_response<F>(&self, handler: F) -> ResponseSubscription
    where
        F: Fn(NotificationResponse) + Send + Sync + 'static;
}

/// Presents notifications on the actual platform. `TimerScheduler` owns
/// the timing; the backend only shows what it is handed.
pub trait NotificationBackend: Send + Sync + 'static {
    fn present(&self, content: &NotificationContent) -> Result<(), NotifyError>;
    fn request_permission(&self) -> bool;
    fn supports_actions(&self) -> bool {
        false
    }
    fn register_categories(&self) {}
}

type ResponseHandler = Arc<dyn Fn(NotificationResponse) + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    handlers: Vec<(u64, ResponseHandler)>,
}

/// Fan-out point for user actions on notifications. Scheduler
/// implementations hold one and feed it from their platform callback.
#[derive(Clone, Default)]
pub struct ResponseRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ResponseRegistry {
    pub fn subscribe<F>(&self, handler: F) -> ResponseSubscription
    where
        F: Fn(NotificationResponse) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().expect("response registry poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, Arc::new(handler)));
        ResponseSubscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn dispatch(&self, response: NotificationResponse) {
        let snapshot: Vec<ResponseHandler> = {
            let inner = self.inner.lock().expect("response registry poisoned");
            inner.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in snapshot {
            handler(response.clone());
        }
    }
}

pub struct ResponseSubscription {
    inner: Weak<Mutex<RegistryInner>>,
    id: u64,
}

impl ResponseSubscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().expect("response registry poisoned");
            inner.handlers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingNotification {
    pub content: NotificationContent,
    pub trigger: NaiveDateTime,
}

#[derive(Default)]
struct PendingMap {
    next_seq: u64,
    entries: HashMap<String, PendingNotification>,
}

/// In-process scheduler: a pending registry drained once a second by a
/// background loop that hands due entries to the platform backend.
pub struct TimerScheduler<B: NotificationBackend> {
    backend: Arc<B>,
    pending: Arc<Mutex<PendingMap>>,
    responses: ResponseRegistry,
}

impl<B: NotificationBackend> Clone for TimerScheduler<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            pending: Arc::clone(&self.pending),
            responses: self.responses.clone(),
        }
    }
}

impl<B: NotificationBackend> TimerScheduler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            pending: Arc::new(Mutex::new(PendingMap::default())),
            responses: ResponseRegistry::default(),
        }
    }

    /// Spawns the drain loop on the current tokio runtime. Call once at
    /// startup; scheduling before `start` only delays delivery.
    pub fn start(&self) {
        let backend = Arc::clone(&self.backend);
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let now = Local::now().naive_local();
                for (id, entry) in take_due(&pending, now) {
                    if let Err(err) = backend.present(&entry.content) {
                        log::warn!("failed to present notification {id}: {err}");
                    }
                }
            }
        });
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("scheduler poisoned").entries.len()
    }

    /// Entry point for the platform bridge once the user acts on a
    /// notification.
    pub fn dispatch_response(&self, response: NotificationResponse) {
        self.responses.dispatch(response);
    }

    fn next_id(map: &mut PendingMap) -> String {
        map.next_seq += 1;
        format!("n{}", map.next_seq)
    }
}

/// Removes and returns every pending entry whose trigger has passed.
fn take_due(
    pending: &Mutex<PendingMap>,
    now: NaiveDateTime,
) -> Vec<(String, PendingNotification)> {
    let mut map = pending.lock().expect("scheduler poisoned");
    let due_ids: Vec<String> = map
        .entries
        .iter()
        .filter(|(_, entry)| entry.trigger <= now)
        .map(|(id, _)| id.clone())
        .collect();
    due_ids
        .into_iter()
        .filter_map(|id| map.entries.remove(&id).map(|entry| (id, entry)))
        .collect()
}

impl<B: NotificationBackend> NotificationScheduler for TimerScheduler<B> {
    async fn request_permission(&self) -> bool {
        self.backend.request_permission()
    }

    async fn schedule_at(
        &self,
        content: NotificationContent,
        trigger: NaiveDateTime,
    ) -> Result<String, NotifyError> {
        let mut map = self.pending.lock().expect("scheduler poisoned");
        let id = Self::next_id(&mut map);
        map.entries
            .insert(id.clone(), PendingNotification { content, trigger });
        Ok(id)
    }

    async fn schedule_immediate(
        &self,
        content: NotificationContent,
    ) -> Result<String, NotifyError> {
        self.backend.present(&content)?;
        let mut map = self.pending.lock().expect("scheduler poisoned");
        Ok(Self::next_id(&mut map))
    }

    async fn cancel(&self, notification_id: &str) {
        self.pending
            .lock()
            .expect("scheduler poisoned")
            .entries
            .remove(notification_id);
    }

    async fn cancel_all(&self) -> bool {
        self.pending
            .lock()
            .expect("scheduler poisoned")
            .entries
            .clear();
        true
    }

    fn register_categories(&self) {
        if self.backend.supports_actions() {
            self.backend.register_categories();
        }
    }

    fn on_response<F>(&self, handler: F) -> ResponseSubscription
    where
        F: Fn(NotificationResponse) + Send + Sync + 'static,
    {
        self.responses.subscribe(handler)
    }
}

/// Presents through the platform notification plugin. Desktop builds get
/// plain notifications; `supports_actions` stays false there, so category
/// registration is a no-op.
#[cfg(all(feature = "app", not(test)))]
pub struct TauriNotificationBackend {
    app: tauri::AppHandle,
}

#[cfg(all(feature = "app", not(test)))]
impl TauriNotificationBackend {
    pub fn new(app: tauri::AppHandle) -> Self {
        Self { app }
    }
}

#[cfg(all(feature = "app", not(test)))]
impl NotificationBackend for TauriNotificationBackend {
    fn present(&self, content: &NotificationContent) -> Result<(), NotifyError> {
        use tauri_plugin_notification::NotificationExt;

        self.app
            .notification()
            .builder()
            .title(&content.title)
            .body(&content.body)
            .show()
            .map_err(|err| NotifyError::Platform(err.to_string()))
    }

    fn request_permission(&self) -> bool {
        use tauri_plugin_notification::{NotificationExt, PermissionState};

        // One round-trip at most; anything but an explicit grant is "no
        // permission".
        match self.app.notification().permission_state() {
            Ok(PermissionState::Granted) => true,
            Ok(_) => matches!(
                self.app.notification().request_permission(),
                Ok(PermissionState::Granted)
            ),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[derive(Default)]
    struct RecordingBackend {
        presented: Mutex<Vec<NotificationContent>>,
        permission: bool,
        actions: bool,
        categories_registered: Mutex<u32>,
        fail_present: bool,
    }

    impl NotificationBackend for Arc<RecordingBackend> {
        fn present(&self, content: &NotificationContent) -> Result<(), NotifyError> {
            if self.fail_present {
                return Err(NotifyError::Platform("present failed".to_string()));
            }
            self.presented.lock().unwrap().push(content.clone());
            Ok(())
        }

        fn request_permission(&self) -> bool {
            self.permission
        }

        fn supports_actions(&self) -> bool {
            self.actions
        }

        fn register_categories(&self) {
            *self.categories_registered.lock().unwrap() += 1;
        }
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 20)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn content(task_id: &str) -> NotificationContent {
        NotificationContent::new("title", "body", task_id)
    }

    #[tokio::test]
    async fn schedule_assigns_unique_ids_and_cancel_is_idempotent() {
        let scheduler = TimerScheduler::new(Arc::new(RecordingBackend::default()));

        let a = scheduler.schedule_at(content("t1"), at(12, 0)).await.unwrap();
        let b = scheduler.schedule_at(content("t2"), at(13, 0)).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(scheduler.pending_count(), 2);

        scheduler.cancel(&a).await;
        assert_eq!(scheduler.pending_count(), 1);
        // Unknown and already-canceled ids are silent no-ops.
        scheduler.cancel(&a).await;
        scheduler.cancel("no-such-id").await;
        assert_eq!(scheduler.pending_count(), 1);

        assert!(scheduler.cancel_all().await);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn take_due_removes_only_entries_at_or_before_now() {
        let scheduler = TimerScheduler::new(Arc::new(RecordingBackend::default()));
        let early = scheduler.schedule_at(content("t1"), at(9, 0)).await.unwrap();
        let exact = scheduler.schedule_at(content("t2"), at(10, 0)).await.unwrap();
        let late = scheduler.schedule_at(content("t3"), at(11, 0)).await.unwrap();

        let due = take_due(&scheduler.pending, at(10, 0));
        let mut due_ids: Vec<String> = due.into_iter().map(|(id, _)| id).collect();
        due_ids.sort();
        let mut expected = vec![early, exact];
        expected.sort();
        assert_eq!(due_ids, expected);

        assert_eq!(scheduler.pending_count(), 1);
        let remaining = take_due(&scheduler.pending, at(12, 0));
        assert_eq!(remaining[0].0, late);
    }

    #[tokio::test]
    async fn schedule_immediate_presents_through_the_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let scheduler = TimerScheduler::new(Arc::clone(&backend));

        let id = scheduler.schedule_immediate(content("t1")).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(backend.presented.lock().unwrap().len(), 1);
        // Immediate notifications never linger in the pending registry.
        assert_eq!(scheduler.pending_count(), 0);

        let failing = Arc::new(RecordingBackend {
            fail_present: true,
            ..RecordingBackend::default()
        });
        let scheduler = TimerScheduler::new(Arc::clone(&failing));
        assert!(scheduler.schedule_immediate(content("t1")).await.is_err());
    }

    #[tokio::test]
    async fn permission_and_categories_delegate_to_backend_capabilities() {
        let denied = Arc::new(RecordingBackend::default());
        let scheduler = TimerScheduler::new(Arc::clone(&denied));
        assert!(!scheduler.request_permission().await);
        scheduler.register_categories();
        assert_eq!(*denied.categories_registered.lock().unwrap(), 0);

        let granted = Arc::new(RecordingBackend {
            permission: true,
            actions: true,
            ..RecordingBackend::default()
        });
        let scheduler = TimerScheduler::new(Arc::clone(&granted));
        assert!(scheduler.request_permission().await);
        scheduler.register_categories();
        assert_eq!(*granted.categories_registered.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn responses_fan_out_until_unsubscribed() {
        let scheduler = TimerScheduler::new(Arc::new(RecordingBackend::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let subscription = {
            let seen = Arc::clone(&seen);
            scheduler.on_response(move |response| {
                seen.lock().unwrap().push((response.action, response.task_id));
            })
        };

        scheduler.dispatch_response(NotificationResponse {
            action: ResponseAction::Complete,
            task_id: "t1".to_string(),
        });
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(ResponseAction::Complete, "t1".to_string())]
        );

        subscription.unsubscribe();
        scheduler.dispatch_response(NotificationResponse {
            action: ResponseAction::Snooze,
            task_id: "t1".to_string(),
        });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn response_actions_map_from_identifiers() {
        assert_eq!(
            ResponseAction::from_identifier(ACTION_COMPLETE),
            ResponseAction::Complete
        );
        assert_eq!(
            ResponseAction::from_identifier(ACTION_SNOOZE),
            ResponseAction::Snooze
        );
        assert_eq!(
            ResponseAction::from_identifier(ACTION_RESCHEDULE),
            ResponseAction::Reschedule
        );
        assert_eq!(
            ResponseAction::from_identifier("default"),
            ResponseAction::Tapped
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drain_loop_presents_due_entries() {
        let backend = Arc::new(RecordingBackend::default());
        let scheduler = TimerScheduler::new(Arc::clone(&backend));

        // Trigger already in the past relative to the wall clock, so the
        // first tick picks it up.
        let past = Local::now().naive_local() - chrono::Duration::minutes(1);
        scheduler.schedule_at(content("t1"), past).await.unwrap();
        scheduler.start();

        for _ in 0..100 {
            tokio::time::advance(Duration::from_millis(250)).await;
            tokio::task::yield_now().await;
            if !backend.presented.lock().unwrap().is_empty() {
                break;
            }
        }
        assert_eq!(backend.presented.lock().unwrap().len(), 1);
        assert_eq!(scheduler.pending_count(), 0);
    }
}
