use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::coordinator::{MutationOutcome, MutationState};
use crate::datetime::ViewClock;
use crate::task::Task;
use crate::views::{TaskStats, created_label, due_label, subtask_progress};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Color is used only when asked for and stdout is a terminal.
    pub fn new(color: bool) -> Self {
        Self {
            color: color && io::stdout().is_terminal(),
        }
    }

    #[tracing::instrument(skip(self, tasks, clock))]
    pub fn print_task_table(&self, tasks: &[&Task], clock: &ViewClock) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_task_table(out, tasks, clock)
    }

    pub fn write_task_table<W: Write>(
        &self,
        writer: W,
        tasks: &[&Task],
        clock: &ViewClock,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Due".to_string(),
            "Priority".to_string(),
            "Title".to_string(),
            "Created".to_string(),
            "Done".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let due = due_label(task, clock);
            let due = if due == "Today" { self.paint(&due, "31") } else { due };

            let priority = task
                .priority
                .as_ref()
                .map(|p| p.as_str().to_string())
                .unwrap_or_else(|| "-".to_string());

            let mut title = task.title.clone();
            if !task.subtasks.is_empty() {
                title.push_str(&format!(" ({:.0}%)", subtask_progress(task)));
            }

            let done = if task.completed {
                self.paint("yes", "32")
            } else {
                "no".to_string()
            };

            rows.push(vec![
                self.paint(&task.id, "33"),
                due,
                priority,
                title,
                created_label(task, clock),
                done,
            ]);
        }

        write_table(writer, headers, rows)
    }

    pub fn print_stats(&self, stats: &TaskStats) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_stats(out, stats)
    }

    pub fn write_stats<W: Write>(&self, mut out: W, stats: &TaskStats) -> anyhow::Result<()> {
        writeln!(out, "total      {}", stats.total)?;
        writeln!(out, "completed  {}", stats.completed)?;
        writeln!(out, "pending    {}", stats.pending)?;
        writeln!(out, "progress   {}%", stats.completion_percentage)?;
        writeln!(
            out,
            "priority   high {} / medium {} / low {}",
            stats.high, stats.medium, stats.low
        )?;
        Ok(())
    }

    pub fn print_outcome(&self, outcome: &MutationOutcome) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let id = outcome.task_id.as_deref().unwrap_or("-");
        match (&outcome.state, &outcome.error) {
            (MutationState::Confirmed, _) => {
                writeln!(out, "{} {} {}", self.paint("ok", "32"), outcome.kind, id)?;
            }
            (state, Some(err)) => {
                let label = match state {
                    MutationState::RolledBack => "reverted",
                    _ => "skipped",
                };
                writeln!(out, "{} {} {}: {err}", self.paint(label, "31"), outcome.kind, id)?;
            }
            (state, None) => {
                writeln!(out, "{:?} {} {}", state, outcome.kind, id)?;
            }
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(widths.iter().copied()) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in widths.iter().copied() {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(widths.iter().copied()) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{Renderer, strip_ansi};
    use crate::datetime::ViewClock;
    use crate::task::{Priority, Task};
    use crate::views::TaskStats;

    fn clock() -> ViewClock {
        ViewClock::fixed(NaiveDate::from_ymd_opt(2024, 10, 22).expect("date"), chrono_tz::UTC)
    }

    #[test]
    fn table_aligns_wide_titles() {
        let mut a = Task::new("a1", "日本語タスク");
        a.priority = Some(Priority::High);
        a.due_date = Utc.with_ymd_and_hms(2024, 10, 22, 9, 0, 0).single();
        let b = Task::new("b2", "plain");

        let mut buf = Vec::new();
        Renderer { color: false }
            .write_task_table(&mut buf, &[&a, &b], &clock())
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("Today"));
        assert!(lines[2].contains("high"));
        assert!(lines[3].contains("No date"));
        let created_col = lines[0].find("Created").expect("header");
        assert_eq!(&lines[3][created_col..created_col + 7], "No date");
    }

    #[test]
    fn stats_block_lists_counts() {
        let stats = TaskStats {
            total: 3,
            completed: 1,
            pending: 2,
            completion_percentage: 33,
            low: 0,
            medium: 1,
            high: 2,
        };
        let mut buf = Vec::new();
        Renderer { color: false }.write_stats(&mut buf, &stats).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("progress   33%"));
        assert!(text.contains("high 2 / medium 1 / low 0"));
    }

    #[test]
    fn strip_ansi_removes_escapes() {
        assert_eq!(strip_ansi("\x1b[33mid\x1b[0m"), "id");
    }
}
