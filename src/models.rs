use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Calendar date in `YYYY-MM-DD` form, as stored in the persisted blob.
pub type DateString = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    #[default]
    None,
}

impl From<String> for Recurrence {
    /// Unrecognized values in stored data fold into `None` rather than
    /// failing the whole collection parse.
    fn from(value: String) -> Self {
        match value.as_str() {
            "daily" => Recurrence::Daily,
            "weekly" => Recurrence::Weekly,
            "monthly" => Recurrence::Monthly,
            "yearly" => Recurrence::Yearly,
            _ => Recurrence::None,
        }
    }
}

impl Recurrence {
    pub fn is_repeating(self) -> bool {
        self != Recurrence::None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSetting {
    pub enabled: bool,
    /// `"HH:MM"` 24-hour time of day on the due date.
    #[serde(default)]
    pub time: String,
}

/// A single to-do item. Field names stay camelCase on the wire so the
/// collection under `@todos` remains readable by the mobile frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateString>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub recurring: Recurrence,
    /// First due date of a repeating series, set once and carried across
    /// generated instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_due_date: Option<DateString>,
    #[serde(default)]
    pub is_recurring_instance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<ReminderSetting>,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            due_date: None,
            completed: false,
            tags: Vec::new(),
            recurring: Recurrence::None,
            original_due_date: None,
            is_recurring_instance: false,
            reminder: None,
        }
    }

    /// Whether an active reminder is configured. Completed tasks never
    /// count as having one.
    pub fn reminder_active(&self) -> bool {
        !self.completed
            && self
                .reminder
                .as_ref()
                .map(|reminder| reminder.enabled)
                .unwrap_or(false)
    }
}

/// Tag name -> keyword list, persisted under `@tags`. Not time-sensitive
/// and carries no scheduling state.
pub type TagRegistry = BTreeMap<String, Vec<String>>;
