use std::sync::Arc;

use serde::Serialize;
use tauri::State;

use crate::clock::SystemClock;
use crate::models::{TagRegistry, Task};
use crate::notify::{
    NotificationResponse, ResponseAction, TauriNotificationBackend, TimerScheduler,
};
use crate::storage::JsonFileStore;
use crate::store::{SnoozeOutcome, TaskStore, ToggleOutcome};

pub type AppScheduler = TimerScheduler<TauriNotificationBackend>;
pub type AppStore = TaskStore<JsonFileStore, AppScheduler, SystemClock>;

#[derive(Debug, Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn flag<T>(success: bool, data: T, message: &str) -> CommandResult<T> {
    if success {
        ok(data)
    } else {
        CommandResult {
            ok: false,
            data: None,
            error: Some(message.to_string()),
        }
    }
}

// Async commands borrowing managed state have to return Result; the error
// side never fires, the webview reads the CommandResult envelope.

#[tauri::command]
pub async fn list_tasks(store: State<'_, AppStore>) -> Result<CommandResult<Vec<Task>>, String> {
    Ok(ok(store.list().await))
}

#[tauri::command]
pub async fn add_task(
    store: State<'_, AppStore>,
    task: Task,
) -> Result<CommandResult<Task>, String> {
    let accepted = store.add(task.clone()).await;
    Ok(flag(accepted, task, "invalid or duplicate task"))
}

#[tauri::command]
pub async fn update_task(
    store: State<'_, AppStore>,
    task: Task,
) -> Result<CommandResult<Task>, String> {
    let accepted = store.update(task.clone()).await;
    Ok(flag(accepted, task, "task not found"))
}

#[tauri::command]
pub async fn delete_task(
    store: State<'_, AppStore>,
    task_id: String,
) -> Result<CommandResult<bool>, String> {
    let removed = store.remove(&task_id).await;
    Ok(flag(removed, true, "task not found"))
}

#[tauri::command]
pub async fn toggle_task_completion(
    store: State<'_, AppStore>,
    task_id: String,
) -> Result<CommandResult<ToggleOutcome>, String> {
    let outcome = store.toggle_completion(&task_id).await;
    let success = outcome.success;
    Ok(flag(success, outcome, "task not found"))
}

#[tauri::command]
pub async fn snooze_task(
    store: State<'_, AppStore>,
    task_id: String,
    hours: i64,
) -> Result<CommandResult<SnoozeOutcome>, String> {
    let outcome = store.snooze(&task_id, hours).await;
    let success = outcome.success;
    Ok(flag(success, outcome, "task not found"))
}

#[tauri::command]
pub async fn list_tags(store: State<'_, AppStore>) -> Result<CommandResult<TagRegistry>, String> {
    Ok(ok(store.tags().await))
}

#[tauri::command]
pub async fn add_tag(
    store: State<'_, AppStore>,
    name: String,
    keywords: Vec<String>,
) -> Result<CommandResult<bool>, String> {
    let added = store.add_tag(&name, keywords).await;
    Ok(flag(added, true, "invalid or duplicate tag"))
}

#[tauri::command]
pub async fn update_tag(
    store: State<'_, AppStore>,
    name: String,
    keywords: Vec<String>,
) -> Result<CommandResult<bool>, String> {
    let updated = store.update_tag(&name, keywords).await;
    Ok(flag(updated, true, "tag not found"))
}

#[tauri::command]
pub async fn delete_tag(
    store: State<'_, AppStore>,
    name: String,
) -> Result<CommandResult<bool>, String> {
    let removed = store.remove_tag(&name).await;
    Ok(flag(removed, true, "tag not found"))
}

/// The webview forwards notification taps and action buttons here; the
/// response registry routes them into the store (see `run()`).
#[tauri::command]
pub async fn notification_action(
    scheduler: State<'_, Arc<AppScheduler>>,
    action: String,
    task_id: String,
) -> Result<CommandResult<bool>, String> {
    scheduler.dispatch_response(NotificationResponse {
        action: ResponseAction::from_identifier(&action),
        task_id,
    });
    Ok(ok(true))
}

#[tauri::command]
pub async fn get_snooze_duration(
    store: State<'_, AppStore>,
) -> Result<CommandResult<i64>, String> {
    Ok(ok(store.snooze_duration().await))
}

#[tauri::command]
pub async fn set_snooze_duration(
    store: State<'_, AppStore>,
    hours: i64,
) -> Result<CommandResult<bool>, String> {
    let accepted = store.set_snooze_duration(hours).await;
    Ok(flag(accepted, true, "snooze duration must be positive"))
}
