use std::cmp::Ordering;
use std::convert::Infallible;
use std::str::FromStr;

use chrono::Days;
use taskdeck_shared::TaskStatsDto;

use crate::datetime::{
  ViewClock,
  format_month_day
};
use crate::task::{
  Priority,
  Task,
  priority_weight
};

pub const DEFAULT_RECENT_LIMIT: usize =
  3;
const WEEK_SPAN_DAYS: u64 = 7;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub struct TaskStats {
  pub total:                 usize,
  pub completed:             usize,
  pub pending:               usize,
  pub completion_percentage: u8,
  pub low:                   usize,
  pub medium:                usize,
  pub high:                  usize
}

impl TaskStats {
  pub fn compute(
    tasks: &[Task]
  ) -> Self {
    let mut stats = Self {
      total: tasks.len(),
      ..Self::default()
    };

    for task in tasks {
      if task.completed {
        stats.completed += 1;
      }
      match task.priority {
        | Some(Priority::Low) => {
          stats.low += 1
        }
        | Some(Priority::Medium) => {
          stats.medium += 1
        }
        | Some(Priority::High) => {
          stats.high += 1
        }
        | _ => {}
      }
    }

    stats.pending =
      stats.total - stats.completed;
    stats.completion_percentage =
      completion_percentage(
        stats.completed,
        stats.total
      );
    stats
  }

  pub fn to_dto(&self) -> TaskStatsDto {
    TaskStatsDto {
      total:                 self.total,
      completed:             self
        .completed,
      pending:               self.pending,
      completion_percentage: self
        .completion_percentage,
      low_priority:          self.low,
      medium_priority:       self
        .medium,
      high_priority:         self.high
    }
  }
}

/// `round(completed / total * 100)`
/// with halves rounded up; 0 for an
/// empty collection.
pub fn completion_percentage(
  completed: usize,
  total: usize
) -> u8 {
  if total == 0 {
    return 0;
  }
  let completed = completed.min(total);
  let rounded = (completed * 200 + total)
    / (2 * total);
  u8::try_from(rounded).unwrap_or(100)
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum TaskFilter {
  #[default]
  All,
  Today,
  Week,
  High,
  Medium,
  Low
}

impl TaskFilter {
  pub const ALL: [TaskFilter; 6] = [
    TaskFilter::All,
    TaskFilter::Today,
    TaskFilter::Week,
    TaskFilter::High,
    TaskFilter::Medium,
    TaskFilter::Low
  ];

  pub fn key(&self) -> &'static str {
    match self {
      | Self::All => "all",
      | Self::Today => "today",
      | Self::Week => "week",
      | Self::High => "high",
      | Self::Medium => "medium",
      | Self::Low => "low"
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      | Self::All => "All Tasks",
      | Self::Today => "Today's Tasks",
      | Self::Week => "This Week",
      | Self::High => "High Priority",
      | Self::Medium => {
        "Medium Priority"
      }
      | Self::Low => "Low Priority"
    }
  }

  pub fn matches(
    &self,
    task: &Task,
    clock: &ViewClock
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Today => task
        .due_date
        .is_some_and(|due| {
          clock.date_of(due)
            == clock.today
        }),
      | Self::Week => {
        let Some(due) = task.due_date
        else {
          return false;
        };
        let due = clock.date_of(due);
        let end = clock
          .today
          .checked_add_days(Days::new(
            WEEK_SPAN_DAYS
          ))
          .unwrap_or(clock.today);
        due >= clock.today && due <= end
      }
      | Self::High => {
        task.priority
          == Some(Priority::High)
      }
      | Self::Medium => {
        task.priority
          == Some(Priority::Medium)
      }
      | Self::Low => {
        task.priority
          == Some(Priority::Low)
      }
    }
  }
}

/// Unknown keys select everything.
impl FromStr for TaskFilter {
  type Err = Infallible;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let key =
      s.trim().to_ascii_lowercase();
    Ok(
      Self::ALL
        .into_iter()
        .find(|filter| {
          filter.key() == key
        })
        .unwrap_or_default()
    )
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum SortOrder {
  #[default]
  Newest,
  Oldest,
  Priority,
  /// Input order, for keys nobody
  /// recognizes.
  Unsorted
}

impl SortOrder {
  pub const OPTIONS: [SortOrder; 3] = [
    SortOrder::Newest,
    SortOrder::Oldest,
    SortOrder::Priority
  ];

  pub fn key(&self) -> &'static str {
    match self {
      | Self::Newest => "newest",
      | Self::Oldest => "oldest",
      | Self::Priority => "priority",
      | Self::Unsorted => "unsorted"
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      | Self::Newest => "Newest",
      | Self::Oldest => "Oldest",
      | Self::Priority => "By Priority",
      | Self::Unsorted => "As Loaded"
    }
  }

  /// Missing `createdAt` compares below
  /// every real timestamp.
  pub fn compare(
    &self,
    a: &Task,
    b: &Task
  ) -> Ordering {
    match self {
      | Self::Newest => {
        b.created_at.cmp(&a.created_at)
      }
      | Self::Oldest => {
        a.created_at.cmp(&b.created_at)
      }
      | Self::Priority => {
        priority_weight(
          b.priority.as_ref()
        )
        .cmp(&priority_weight(
          a.priority.as_ref()
        ))
      }
      | Self::Unsorted => {
        Ordering::Equal
      }
    }
  }
}

impl FromStr for SortOrder {
  type Err = Infallible;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let sort = match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "newest" => Self::Newest,
      | "oldest" => Self::Oldest,
      | "priority" => Self::Priority,
      | _ => Self::Unsorted
    };
    Ok(sort)
  }
}

/// Stable: equal keys keep their input
/// order.
pub fn sort_tasks(
  tasks: &mut [&Task],
  order: SortOrder
) {
  tasks.sort_by(|a, b| {
    order.compare(a, b)
  });
}

pub fn filter_tasks<'a>(
  tasks: &'a [Task],
  filter: TaskFilter,
  clock: &ViewClock
) -> Vec<&'a Task> {
  tasks
    .iter()
    .filter(|task| {
      filter.matches(task, clock)
    })
    .collect()
}

pub fn pending_tasks(
  tasks: &[Task],
  order: SortOrder
) -> Vec<&Task> {
  let mut pending: Vec<&Task> = tasks
    .iter()
    .filter(|task| task.is_pending())
    .collect();
  sort_tasks(&mut pending, order);
  pending
}

pub fn completed_tasks(
  tasks: &[Task]
) -> Vec<&Task> {
  tasks
    .iter()
    .filter(|task| task.completed)
    .collect()
}

pub fn recent_tasks(
  tasks: &[Task],
  limit: usize
) -> &[Task] {
  &tasks[..limit.min(tasks.len())]
}

/// Percentage of finished subtasks; 0
/// when there are none.
pub fn subtask_progress(
  task: &Task
) -> f64 {
  if task.subtasks.is_empty() {
    return 0.0;
  }
  let done = task
    .subtasks
    .iter()
    .filter(|subtask| subtask.completed)
    .count();
  done as f64
    / task.subtasks.len() as f64
    * 100.0
}

pub fn due_label(
  task: &Task,
  clock: &ViewClock
) -> String {
  match task.due_date {
    | Some(due)
      if clock.date_of(due)
        == clock.today =>
    {
      "Today".to_string()
    }
    | Some(due) => {
      format_month_day(due, clock.tz)
    }
    | None => "-".to_string()
  }
}

pub fn created_label(
  task: &Task,
  clock: &ViewClock
) -> String {
  match task.created_at {
    | Some(created) => format!(
      "Created {}",
      format_month_day(
        created, clock.tz
      )
    ),
    | None => "No date".to_string()
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };
  use serde_json::json;

  use super::{
    SortOrder,
    TaskFilter,
    TaskStats,
    completed_tasks,
    completion_percentage,
    created_label,
    due_label,
    filter_tasks,
    pending_tasks,
    recent_tasks,
    subtask_progress
  };
  use crate::datetime::ViewClock;
  use crate::normalize::Normalizer;
  use crate::task::{
    Priority,
    Subtask,
    Task
  };

  fn clock() -> ViewClock {
    ViewClock::fixed(
      NaiveDate::from_ymd_opt(
        2026, 10, 19
      )
      .expect("valid date"),
      chrono_tz::UTC
    )
  }

  fn due_in(
    id: &str,
    days: i64
  ) -> Task {
    let mut task = Task::new(id, id);
    task.due_date = Some(
      Utc
        .with_ymd_and_hms(
          2026, 10, 19, 18, 45, 0
        )
        .single()
        .expect("valid instant")
        + chrono::Duration::days(days)
    );
    task
  }

  fn with_priority(
    id: &str,
    raw: &str
  ) -> Task {
    let mut task = Task::new(id, id);
    task.priority = Priority::parse(raw);
    task
  }

  fn ids(tasks: &[&Task]) -> Vec<String> {
    tasks
      .iter()
      .map(|task| task.id.clone())
      .collect()
  }

  #[test]
  fn percentage_boundaries() {
    assert_eq!(
      completion_percentage(0, 0),
      0
    );
    assert_eq!(
      completion_percentage(1, 3),
      33
    );
    assert_eq!(
      completion_percentage(2, 3),
      67
    );
    assert_eq!(
      completion_percentage(1, 8),
      13
    );
    assert_eq!(
      completion_percentage(3, 3),
      100
    );
  }

  #[test]
  fn stats_count_completion_and_priorities()
   {
    let mut done =
      with_priority("a", "HIGH");
    done.completed = true;
    let tasks = vec![
      done,
      with_priority("b", "high"),
      with_priority("c", "Low"),
      with_priority("d", "urgent"),
      Task::new("e", "e"),
    ];

    let stats = TaskStats::compute(&tasks);
    assert_eq!(stats.total, 5);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.pending, 4);
    assert_eq!(
      stats.completion_percentage,
      20
    );
    assert_eq!(stats.high, 2);
    assert_eq!(stats.medium, 0);
    assert_eq!(stats.low, 1);

    let empty = TaskStats::compute(&[]);
    assert_eq!(
      empty.completion_percentage,
      0
    );
    assert_eq!(
      empty.to_dto().total,
      0
    );
  }

  #[test]
  fn today_ignores_time_of_day() {
    let tasks = vec![
      due_in("today", 0),
      due_in("tomorrow", 1),
      due_in("yesterday", -1),
      Task::new("undated", "undated"),
    ];

    let hits = filter_tasks(
      &tasks,
      TaskFilter::Today,
      &clock()
    );
    assert_eq!(ids(&hits), vec!["today"]);
  }

  #[test]
  fn week_is_inclusive_on_both_ends() {
    let tasks = vec![
      due_in("yesterday", -1),
      due_in("today", 0),
      due_in("plus7", 7),
      due_in("plus8", 8),
      Task::new("undated", "undated"),
    ];

    let hits = filter_tasks(
      &tasks,
      TaskFilter::Week,
      &clock()
    );
    assert_eq!(
      ids(&hits),
      vec!["today", "plus7"]
    );
  }

  #[test]
  fn priority_filters_and_unknown_keys()
  {
    let tasks = vec![
      with_priority("h", "High"),
      with_priority("m", "MEDIUM"),
      with_priority("l", "low"),
    ];

    let high: TaskFilter =
      "high".parse().expect("infallible");
    assert_eq!(
      ids(&filter_tasks(
        &tasks, high, &clock()
      )),
      vec!["h"]
    );

    let unknown: TaskFilter = "overdue"
      .parse()
      .expect("infallible");
    assert_eq!(unknown, TaskFilter::All);
    assert_eq!(
      filter_tasks(
        &tasks, unknown, &clock()
      )
      .len(),
      3
    );
  }

  #[test]
  fn priority_sort_is_stable_and_ranks_unknown_last()
   {
    let tasks = vec![
      with_priority("low", "low"),
      with_priority("odd", "someday"),
      with_priority("high", "high"),
      with_priority("medium", "medium"),
      with_priority("high2", "HIGH"),
    ];

    let sorted = pending_tasks(
      &tasks,
      SortOrder::Priority
    );
    assert_eq!(
      ids(&sorted),
      vec![
        "high", "high2", "medium",
        "low", "odd"
      ]
    );
  }

  #[test]
  fn date_sorts_put_missing_created_at_lowest()
   {
    let mut older = Task::new("older", "o");
    older.created_at = Some(
      Utc
        .with_ymd_and_hms(
          2026, 1, 1, 0, 0, 0
        )
        .single()
        .expect("valid instant")
    );
    let mut newer = Task::new("newer", "n");
    newer.created_at = Some(
      Utc
        .with_ymd_and_hms(
          2026, 6, 1, 0, 0, 0
        )
        .single()
        .expect("valid instant")
    );
    let unknown = Task::new("unknown", "u");
    let tasks =
      vec![unknown, older, newer];

    assert_eq!(
      ids(&pending_tasks(
        &tasks,
        SortOrder::Newest
      )),
      vec!["newer", "older", "unknown"]
    );
    assert_eq!(
      ids(&pending_tasks(
        &tasks,
        SortOrder::Oldest
      )),
      vec!["unknown", "older", "newer"]
    );

    let unsorted: SortOrder = "random"
      .parse()
      .expect("infallible");
    assert_eq!(
      ids(&pending_tasks(
        &tasks, unsorted
      )),
      vec!["unknown", "older", "newer"]
    );
  }

  #[test]
  fn pending_and_stats_agree_on_every_completion_form()
   {
    let forms = [
      json!(true),
      json!(1),
      json!("yes"),
      json!("Yes"),
      json!(false),
      json!(0),
      json!("no"),
      json!("No"),
      json!(null),
      json!("maybe"),
    ];
    let mut records: Vec<_> = forms
      .iter()
      .enumerate()
      .map(|(idx, completed)| {
        json!({
          "_id": format!("t{idx}"),
          "title": "t",
          "completed": completed
        })
      })
      .collect();
    records.push(json!({
      "_id": "absent",
      "title": "no completion field"
    }));

    let tasks = Normalizer::default()
      .normalize_payload(
        &serde_json::Value::Array(
          records
        )
      );
    let stats = TaskStats::compute(&tasks);
    let pending = pending_tasks(
      &tasks,
      SortOrder::Unsorted
    );
    let completed =
      completed_tasks(&tasks);

    assert_eq!(stats.completed, 4);
    assert_eq!(
      stats.pending,
      pending.len()
    );
    assert_eq!(
      stats.completed,
      completed.len()
    );
    assert!(
      pending
        .iter()
        .any(|task| task.id == "absent")
    );
    assert!(
      pending
        .iter()
        .any(|task| task.id == "t8")
    );
    assert!(
      completed
        .iter()
        .any(|task| task.id == "t3")
    );
  }

  #[test]
  fn subtask_progress_ratio() {
    let mut task = Task::new("a", "a");
    assert_eq!(
      subtask_progress(&task),
      0.0
    );

    task.subtasks = vec![
      Subtask {
        title:     None,
        completed: true
      },
      Subtask {
        title:     None,
        completed: false
      },
      Subtask {
        title:     None,
        completed: false
      },
      Subtask {
        title:     None,
        completed: true
      },
    ];
    assert_eq!(
      subtask_progress(&task),
      50.0
    );
  }

  #[test]
  fn recent_and_labels() {
    let tasks = vec![
      due_in("a", 0),
      due_in("b", 3),
      Task::new("c", "c"),
      Task::new("d", "d"),
    ];
    assert_eq!(
      recent_tasks(&tasks, 3).len(),
      3
    );
    assert_eq!(
      recent_tasks(&tasks[..1], 3)
        .len(),
      1
    );

    let clock = clock();
    assert_eq!(
      due_label(&tasks[0], &clock),
      "Today"
    );
    assert_eq!(
      due_label(&tasks[1], &clock),
      "Oct 22"
    );
    assert_eq!(
      due_label(&tasks[2], &clock),
      "-"
    );
    assert_eq!(
      created_label(&tasks[2], &clock),
      "No date"
    );
  }
}
