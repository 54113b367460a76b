//! Shared fakes for unit tests: a fixed clock, a call-counting store, and
//! a recording notification scheduler.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};

use crate::clock::Clock;
use crate::notify::{
    NotificationContent, NotificationResponse, NotificationScheduler, NotifyError,
    ResponseRegistry, ResponseSubscription,
};
use crate::storage::{KeyValueStore, MemoryStore, StorageError};

#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    pub fn at(y: i32, m: u32, d: u32, hour: u32, minute: u32) -> Self {
        Self(
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap(),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// MemoryStore wrapper that counts writes and can be told to fail them,
/// for asserting "no persistence happened" and storage-error paths.
#[derive(Debug, Default, Clone)]
pub(crate) struct CountingStore {
    inner: MemoryStore,
    sets: Arc<AtomicU64>,
    fail_sets: Arc<AtomicBool>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_calls(&self) -> u64 {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("injected failure")));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ScheduledCall {
    pub id: String,
    pub content: NotificationContent,
    /// `None` for immediate notifications.
    pub trigger: Option<NaiveDateTime>,
}

#[derive(Default)]
struct FakeInner {
    next: u64,
    scheduled: Vec<ScheduledCall>,
    canceled: Vec<String>,
    live: Vec<String>,
}

/// Records every scheduler interaction so tests can assert the
/// cancel-before-schedule discipline and live-notification counts.
#[derive(Default)]
pub(crate) struct FakeScheduler {
    inner: Mutex<FakeInner>,
    fail: AtomicBool,
    responses: ResponseRegistry,
}

impl FakeScheduler {
    pub fn fail_scheduling(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().unwrap().live.len()
    }

    pub fn scheduled(&self) -> Vec<ScheduledCall> {
        self.inner.lock().unwrap().scheduled.clone()
    }

    pub fn canceled(&self) -> Vec<String> {
        self.inner.lock().unwrap().canceled.clone()
    }

    fn record(
        &self,
        content: NotificationContent,
        trigger: Option<NaiveDateTime>,
    ) -> Result<String, NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Platform("injected failure".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.next += 1;
        let id = format!("f{}", inner.next);
        inner.scheduled.push(ScheduledCall {
            id: id.clone(),
            content,
            trigger,
        });
        if trigger.is_some() {
            inner.live.push(id.clone());
        }
        Ok(id)
    }
}

impl NotificationScheduler for FakeScheduler {
    async fn request_permission(&self) -> bool {
        true
    }

    async fn schedule_at(
        &self,
        content: NotificationContent,
        trigger: NaiveDateTime,
    ) -> Result<String, NotifyError> {
        self.record(content, Some(trigger))
    }

    async fn schedule_immediate(
        &self,
        content: NotificationContent,
    ) -> Result<String, NotifyError> {
        self.record(content, None)
    }

    async fn cancel(&self, notification_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.canceled.push(notification_id.to_string());
        inner.live.retain(|id| id != notification_id);
    }

    async fn cancel_all(&self) -> bool {
        self.inner.lock().unwrap().live.clear();
        true
    }

    fn register_categories(&self) {}

    fn on_response<F>(&self, handler: F) -> ResponseSubscription
    where
        F: Fn(NotificationResponse) + Send + Sync + 'static,
    {
        self.responses.subscribe(handler)
    }
}
