pub mod clock;
pub mod events;
pub mod models;
pub mod notify;
pub mod recurrence;
pub mod reminders;
pub mod storage;
pub mod store;

pub mod logging;

#[cfg(all(feature = "app", not(test)))]
mod commands;
#[cfg(test)]
mod testutil;

#[cfg(all(feature = "app", not(test)))]
use std::sync::Arc;

#[cfg(all(feature = "app", not(test)))]
use tauri::{Emitter, Manager};

#[cfg(all(feature = "app", not(test)))]
use crate::clock::SystemClock;
#[cfg(all(feature = "app", not(test)))]
use crate::commands::*;
#[cfg(all(feature = "app", not(test)))]
use crate::events::{
    EventBus, EVENT_STORAGE_CHANGED, EVENT_TAGS_CHANGED, EVENT_TAG_ADDED, EVENT_TAG_DELETED,
    EVENT_TAG_UPDATED, EVENT_TODO_ADDED, EVENT_TODO_COMPLETED, EVENT_TODO_DELETED,
    EVENT_TODO_SNOOZED, EVENT_TODO_UPDATED,
};
#[cfg(all(feature = "app", not(test)))]
use crate::notify::{
    NotificationScheduler, ResponseAction, TauriNotificationBackend, TimerScheduler,
};
#[cfg(all(feature = "app", not(test)))]
use crate::storage::JsonFileStore;
#[cfg(all(feature = "app", not(test)))]
use crate::store::TaskStore;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
#[cfg(all(feature = "app", not(test)))]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_notification::init())
        .setup(|app| {
            let data_dir = app.path().app_data_dir()?;
            if let Err(err) = logging::init_logging(&data_dir) {
                eprintln!("logging unavailable: {err}");
            }

            let kv = Arc::new(JsonFileStore::open(data_dir)?);
            let scheduler = Arc::new(TimerScheduler::new(TauriNotificationBackend::new(
                app.handle().clone(),
            )));
            let store = TaskStore::new(
                kv,
                Arc::clone(&scheduler),
                Arc::new(SystemClock),
                EventBus::new(),
            );

            // Domain events flow to the webview under their own names; the
            // frontend hooks re-read state on storage_changed/tags_changed.
            let bus = store.events();
            for name in [
                EVENT_TODO_ADDED,
                EVENT_TODO_UPDATED,
                EVENT_TODO_DELETED,
                EVENT_TODO_COMPLETED,
                EVENT_TODO_SNOOZED,
                EVENT_STORAGE_CHANGED,
                EVENT_TAG_ADDED,
                EVENT_TAG_UPDATED,
                EVENT_TAG_DELETED,
                EVENT_TAGS_CHANGED,
            ] {
                let handle = app.handle().clone();
                bus.on(name, move |payload| {
                    let _ = handle.emit(name, payload.clone());
                });
            }

            // Notification actions route straight back into the store.
            scheduler.register_categories();
            let response_store = store.clone();
            scheduler.on_response(move |response| {
                let store = response_store.clone();
                tauri::async_runtime::spawn(async move {
                    match response.action {
                        ResponseAction::Complete => {
                            let _ = store.toggle_completion(&response.task_id).await;
                        }
                        ResponseAction::Snooze => {
                            let hours = store.snooze_duration().await;
                            let _ = store.snooze(&response.task_id, hours).await;
                        }
                        // Reschedule and plain taps open the app; the UI
                        // layer takes it from there.
                        ResponseAction::Reschedule | ResponseAction::Tapped => {}
                    }
                });
            });

            let startup_scheduler = Arc::clone(&scheduler);
            let startup_store = store.clone();
            tauri::async_runtime::spawn(async move {
                startup_scheduler.start();
                if !startup_scheduler.request_permission().await {
                    log::warn!("notification permission not granted; reminders will be silent");
                }

                // Anything already past due gets one immediate alert.
                let tasks = startup_store.list().await;
                let today = chrono::Local::now().date_naive();
                let buckets = recurrence::categorize(&tasks, today);
                for task in buckets.past.iter().filter(|task| !task.completed) {
                    startup_store.reminders().alert_overdue(task).await;
                }
            });

            app.manage(store);
            app.manage(scheduler);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            list_tasks,
            add_task,
            update_task,
            delete_task,
            toggle_task_completion,
            snooze_task,
            list_tags,
            add_tag,
            update_tag,
            delete_tag,
            notification_action,
            get_snooze_duration,
            set_snooze_duration,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
