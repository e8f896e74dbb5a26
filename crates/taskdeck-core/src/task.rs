use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use taskdeck_shared::TaskFields;

use crate::datetime::format_wire;

pub const UNTITLED_TASK: &str = "Untitled task";

/// Field names owned by the canonical model; everything else a record
/// carries is kept in [`Task::extra`].
pub(crate) const CANONICAL_KEYS: &[&str] = &[
    "_id",
    "id",
    "title",
    "description",
    "priority",
    "completed",
    "dueDate",
    "createdAt",
    "subtasks",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
    /// Unrecognized priority text, kept verbatim for display.
    Other(String),
}

impl Priority {
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let priority = match trimmed.to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Other(trimmed.to_string()),
        };
        Some(priority)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Other(raw) => raw,
        }
    }

    pub fn weight(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
            Self::Other(_) => 0,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn priority_weight(priority: Option<&Priority>) -> u8 {
    priority.map(Priority::weight).unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtask {
    pub title: Option<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub completed: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub subtasks: Vec<Subtask>,
    pub extra: BTreeMap<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            priority: None,
            completed: false,
            due_date: None,
            created_at: None,
            subtasks: vec![],
            extra: BTreeMap::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.completed
    }

    /// Wire form: both identifier fields carry the same value, completion is
    /// a native boolean and timestamps are RFC 3339.
    pub fn to_wire(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }

        map.insert("_id".to_string(), Value::String(self.id.clone()));
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert("title".to_string(), Value::String(self.title.clone()));
        map.insert(
            "description".to_string(),
            self.description.clone().map(Value::String).unwrap_or(Value::Null),
        );
        map.insert(
            "priority".to_string(),
            self.priority
                .as_ref()
                .map(|p| Value::String(p.as_str().to_string()))
                .unwrap_or(Value::Null),
        );
        map.insert("completed".to_string(), Value::Bool(self.completed));
        map.insert(
            "dueDate".to_string(),
            self.due_date
                .map(|d| Value::String(format_wire(d)))
                .unwrap_or(Value::Null),
        );
        map.insert(
            "createdAt".to_string(),
            self.created_at
                .map(|d| Value::String(format_wire(d)))
                .unwrap_or(Value::Null),
        );

        let subtasks = self
            .subtasks
            .iter()
            .map(|subtask| {
                let mut entry = Map::new();
                if let Some(title) = &subtask.title {
                    entry.insert("title".to_string(), Value::String(title.clone()));
                }
                entry.insert("completed".to_string(), Value::Bool(subtask.completed));
                Value::Object(entry)
            })
            .collect();
        map.insert("subtasks".to_string(), Value::Array(subtasks));

        Value::Object(map)
    }

    /// Canonical field set for an edit-save request.
    pub fn fields(&self) -> TaskFields {
        TaskFields {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority.as_ref().map(|p| p.as_str().to_string()),
            due_date: self.due_date.map(format_wire),
            completed: self.completed,
        }
    }
}

/// Local field update. Outer `None` leaves a field untouched; for optional
/// fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Option<Priority>>,
    pub completed: Option<bool>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    pub fn completed(value: bool) -> Self {
        Self {
            completed: Some(value),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Priority, Task, TaskPatch, priority_weight};

    #[test]
    fn priority_is_case_insensitive_and_keeps_unknown_text() {
        assert_eq!(Priority::parse("HIGH"), Some(Priority::High));
        assert_eq!(Priority::parse(" Medium "), Some(Priority::Medium));
        assert_eq!(
            Priority::parse("Urgent"),
            Some(Priority::Other("Urgent".to_string()))
        );
        assert_eq!(Priority::parse("   "), None);
        assert_eq!(Priority::Other("Urgent".to_string()).to_string(), "Urgent");
    }

    #[test]
    fn weights_rank_unknown_and_missing_lowest() {
        assert_eq!(priority_weight(Some(&Priority::High)), 3);
        assert_eq!(priority_weight(Some(&Priority::Low)), 1);
        assert_eq!(priority_weight(Some(&Priority::Other("x".into()))), 0);
        assert_eq!(priority_weight(None), 0);
    }

    #[test]
    fn wire_form_mirrors_identifier_fields() {
        let mut task = Task::new("a1", "Write report");
        task.completed = true;
        let wire = task.to_wire();
        assert_eq!(wire["_id"], "a1");
        assert_eq!(wire["id"], "a1");
        assert_eq!(wire["completed"], true);
        assert!(wire["dueDate"].is_null());
    }

    #[test]
    fn patch_touches_only_given_fields() {
        let mut task = Task::new("a1", "Write report");
        task.description = Some("draft".to_string());

        TaskPatch::completed(true).apply(&mut task);
        assert!(task.completed);
        assert_eq!(task.description.as_deref(), Some("draft"));

        TaskPatch {
            description: Some(None),
            ..TaskPatch::default()
        }
        .apply(&mut task);
        assert_eq!(task.description, None);
        assert!(TaskPatch::default().is_empty());
    }
}
