//! Canonicalization of loosely shaped task payloads.
//!
//! Every place that interprets a completion value goes through
//! [`is_completed`]; the store, the statistics and the view filters all read
//! the boolean it produced at ingress.

use std::collections::BTreeMap;

use chrono_tz::Tz;
use serde_json::{Map, Value};
use taskdeck_shared::{TaskCreate, TaskFields};
use tracing::{debug, warn};

use crate::datetime::{format_wire, parse_timestamp, parse_timestamp_str};
use crate::task::{CANONICAL_KEYS, Priority, Subtask, Task, UNTITLED_TASK};

/// Completion predicate: `true`, `1` and case-insensitive `"yes"` are
/// completed; every other value, including null, is not.
pub fn is_completed(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64() == Some(1.0),
        Value::String(raw) => raw.eq_ignore_ascii_case("yes"),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Bare,
    TasksKey,
    DataKey,
    Unrecognized,
}

pub fn detect_shape(payload: &Value) -> PayloadShape {
    if payload.is_array() {
        return PayloadShape::Bare;
    }
    if payload.get("tasks").is_some_and(Value::is_array) {
        return PayloadShape::TasksKey;
    }
    if payload.get("data").is_some_and(Value::is_array) {
        return PayloadShape::DataKey;
    }
    PayloadShape::Unrecognized
}

fn task_records(payload: &Value) -> &[Value] {
    let records = match detect_shape(payload) {
        PayloadShape::Bare => payload.as_array(),
        PayloadShape::TasksKey => payload.get("tasks").and_then(Value::as_array),
        PayloadShape::DataKey => payload.get("data").and_then(Value::as_array),
        PayloadShape::Unrecognized => None,
    };
    records.map(Vec::as_slice).unwrap_or(&[])
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    tz: Tz,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self { tz: chrono_tz::UTC }
    }
}

impl Normalizer {
    /// `tz` anchors date-only and naive timestamps.
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    #[tracing::instrument(skip_all)]
    pub fn normalize_payload(&self, payload: &Value) -> Vec<Task> {
        let shape = detect_shape(payload);
        if shape == PayloadShape::Unrecognized {
            warn!(
                kind = value_kind(payload),
                "malformed task payload; treating as empty"
            );
            return vec![];
        }

        let records = task_records(payload);
        let tasks: Vec<Task> = records
            .iter()
            .filter_map(|raw| self.normalize_record(raw))
            .collect();

        debug!(
            ?shape,
            received = records.len(),
            kept = tasks.len(),
            "normalized task payload"
        );
        tasks
    }

    pub fn normalize_record(&self, raw: &Value) -> Option<Task> {
        let Some(record) = raw.as_object() else {
            debug!(kind = value_kind(raw), "dropping non-object task record");
            return None;
        };

        let Some(id) = resolve_id(record) else {
            debug!("dropping task record without identifier");
            return None;
        };

        let title = record
            .get("title")
            .and_then(text_of)
            .unwrap_or_else(|| UNTITLED_TASK.to_string());

        let extra: BTreeMap<String, Value> = record
            .iter()
            .filter(|(key, _)| !CANONICAL_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Some(Task {
            id,
            title,
            description: record.get("description").and_then(text_of),
            priority: record
                .get("priority")
                .and_then(Value::as_str)
                .and_then(Priority::parse),
            completed: is_completed(record.get("completed").unwrap_or(&Value::Null)),
            due_date: self.timestamp_field(record, "dueDate"),
            created_at: self.timestamp_field(record, "createdAt"),
            subtasks: subtasks_of(record),
            extra,
        })
    }

    fn timestamp_field(
        &self,
        record: &Map<String, Value>,
        key: &str,
    ) -> Option<chrono::DateTime<chrono::Utc>> {
        let value = record.get(key)?;
        if value.is_null() {
            return None;
        }
        let parsed = parse_timestamp(value, self.tz);
        if parsed.is_none() {
            debug!(field = key, %value, "ignoring unparseable timestamp");
        }
        parsed
    }
}

/// `_id` wins over `id` when both are present and disagree.
fn resolve_id(record: &Map<String, Value>) -> Option<String> {
    let primary = record.get("_id").and_then(identifier_of);
    let secondary = record.get("id").and_then(identifier_of);

    if let (Some(primary), Some(secondary)) = (&primary, &secondary)
        && primary != secondary
    {
        debug!(
            primary = %primary,
            secondary = %secondary,
            "identifier fields disagree; using _id"
        );
    }

    primary.or(secondary)
}

fn identifier_of(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn text_of(value: &Value) -> Option<String> {
    let raw = value.as_str()?;
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn subtasks_of(record: &Map<String, Value>) -> Vec<Subtask> {
    let Some(items) = record.get("subtasks").and_then(Value::as_array) else {
        return vec![];
    };

    items
        .iter()
        .map(|item| Subtask {
            title: item.get("title").and_then(text_of),
            completed: is_completed(item.get("completed").unwrap_or(&Value::Null)),
        })
        .collect()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Edit-form contents as the user left them; `completed` may still be a
/// `"Yes"`/`"No"` string, a number or a boolean.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub completed: Value,
}

impl TaskDraft {
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority.as_ref().map(|p| p.as_str().to_string()),
            due_date: task.due_date.map(format_wire),
            completed: Value::Bool(task.completed),
        }
    }

    /// Canonical update payload: completion resolved to a boolean,
    /// recognized priorities lowercased, blank text cleared.
    pub fn into_fields(self, tz: Tz) -> TaskFields {
        let title = non_blank(Some(self.title)).unwrap_or_else(|| UNTITLED_TASK.to_string());
        TaskFields {
            title,
            description: non_blank(self.description),
            priority: canonical_priority(self.priority),
            due_date: canonical_due(self.due_date, tz),
            completed: is_completed(&self.completed),
        }
    }

    pub fn into_create(self, tz: Tz) -> TaskCreate {
        let fields = self.into_fields(tz);
        TaskCreate {
            title: fields.title,
            description: fields.description,
            priority: fields.priority,
            due_date: fields.due_date,
            completed: fields.completed,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn canonical_priority(value: Option<String>) -> Option<String> {
    non_blank(value)
        .and_then(|raw| Priority::parse(&raw))
        .map(|priority| priority.as_str().to_string())
}

/// Parseable due dates go out in wire format; anything else is passed
/// through for the server to judge.
fn canonical_due(value: Option<String>, tz: Tz) -> Option<String> {
    let raw = non_blank(value)?;
    Some(parse_timestamp_str(&raw, tz).map(format_wire).unwrap_or(raw))
}
