use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::normalize::TaskDraft;
use crate::task::Task;
use crate::views::{SortOrder, TaskFilter};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdeck",
    version,
    about = "Taskdeck: terminal client for a remote task list",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "api-url", global = true)]
    pub api_url: Option<String>,

    /// Bearer token; falls back to TASKDECK_TOKEN.
    #[arg(long = "token", global = true)]
    pub token: Option<String>,

    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Tasks matching a filter, in store order.
    List {
        #[arg(long, default_value = "all", value_parser = parse_filter)]
        filter: TaskFilter,
    },
    /// Tasks not yet completed.
    Pending {
        #[arg(long, default_value = "newest", value_parser = parse_sort)]
        sort: SortOrder,
    },
    Completed,
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// The first few tasks as loaded.
    Recent {
        #[arg(long)]
        limit: Option<usize>,
    },
    Toggle {
        id: String,
    },
    Delete {
        id: String,
    },
    Edit {
        id: String,
        #[command(flatten)]
        fields: EditFields,
    },
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
}

/// Field overrides for `edit`; unset flags keep the task's current value.
#[derive(Args, Debug, Clone, Default)]
pub struct EditFields {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long)]
    pub due: Option<String>,
    /// Accepts true/false, 1/0 or yes/no.
    #[arg(long)]
    pub completed: Option<String>,
}

impl EditFields {
    pub fn into_draft(self, current: &Task) -> TaskDraft {
        let mut draft = TaskDraft::from_task(current);
        if let Some(title) = self.title {
            draft.title = title;
        }
        if let Some(description) = self.description {
            draft.description = Some(description);
        }
        if let Some(priority) = self.priority {
            draft.priority = Some(priority);
        }
        if let Some(due) = self.due {
            draft.due_date = Some(due);
        }
        if let Some(completed) = self.completed {
            draft.completed = completion_input(&completed);
        }
        draft
    }
}

pub fn add_draft(
    title: String,
    description: Option<String>,
    priority: Option<String>,
    due: Option<String>,
) -> TaskDraft {
    TaskDraft {
        title,
        description,
        priority,
        due_date: due,
        completed: Value::Bool(false),
    }
}

/// Command-line spellings of the completion flag, handed to the
/// normalizer's predicate as the closest wire value.
fn completion_input(raw: &str) -> Value {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => other
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.trim().to_string())),
    }
}

fn parse_filter(raw: &str) -> Result<TaskFilter, String> {
    let Ok(filter) = raw.parse::<TaskFilter>();
    if filter == TaskFilter::All && !raw.trim().eq_ignore_ascii_case("all") {
        debug!(key = raw, "unknown filter key, showing all tasks");
    }
    Ok(filter)
}

fn parse_sort(raw: &str) -> Result<SortOrder, String> {
    let Ok(sort) = raw.parse::<SortOrder>();
    Ok(sort)
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use serde_json::json;

    use super::{Command, EditFields, GlobalCli};
    use crate::task::Task;
    use crate::views::{SortOrder, TaskFilter};

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = GlobalCli::parse_from([
            "taskdeck", "pending", "--sort", "priority", "-vv", "--token", "abc",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.token.as_deref(), Some("abc"));
        assert!(matches!(
            cli.command,
            Command::Pending {
                sort: SortOrder::Priority
            }
        ));
    }

    #[test]
    fn unknown_view_keys_do_not_error() {
        let cli = GlobalCli::parse_from(["taskdeck", "list", "--filter", "someday"]);
        assert!(matches!(
            cli.command,
            Command::List {
                filter: TaskFilter::All
            }
        ));

        let cli = GlobalCli::parse_from(["taskdeck", "pending", "--sort", "title"]);
        assert!(matches!(
            cli.command,
            Command::Pending {
                sort: SortOrder::Unsorted
            }
        ));
    }

    #[test]
    fn edit_keeps_unset_fields() {
        let mut current = Task::new("t1", "Write report");
        current.description = Some("quarterly".into());

        let draft = EditFields {
            title: Some("Write final report".into()),
            completed: Some("Yes".into()),
            ..EditFields::default()
        }
        .into_draft(&current);

        assert_eq!(draft.title, "Write final report");
        assert_eq!(draft.description.as_deref(), Some("quarterly"));
        assert_eq!(draft.completed, json!("Yes"));

        let draft = EditFields {
            completed: Some("1".into()),
            ..EditFields::default()
        }
        .into_draft(&current);
        assert_eq!(draft.completed, json!(1));
    }
}
