use serde::{
  Deserialize,
  Serialize
};

/// Full field set sent when an edited
/// task is saved. Every key is always
/// present on the wire, `null` when
/// unset.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
  pub title:       String,
  pub description: Option<String>,
  pub priority:    Option<String>,
  pub due_date:    Option<String>,
  pub completed:   bool
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreate {
  pub title:       String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub priority:    Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date:    Option<String>,
  #[serde(default)]
  pub completed:   bool
}

/// Body of a completion toggle.
#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct CompletionUpdate {
  pub completed: bool
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(untagged)]
pub enum TaskUpdate {
  Completion(CompletionUpdate),
  Fields(TaskFields)
}

impl From<CompletionUpdate>
  for TaskUpdate
{
  fn from(
    value: CompletionUpdate
  ) -> Self {
    Self::Completion(value)
  }
}

impl From<TaskFields> for TaskUpdate {
  fn from(value: TaskFields) -> Self {
    Self::Fields(value)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatsDto {
  pub total:                 usize,
  pub completed:             usize,
  pub pending:               usize,
  pub completion_percentage: u8,
  pub low_priority:          usize,
  pub medium_priority:       usize,
  pub high_priority:         usize
}
