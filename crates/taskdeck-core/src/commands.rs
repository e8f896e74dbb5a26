use anyhow::{Context, anyhow, bail};
use tracing::{debug, info, instrument};

use crate::api::{ApiError, TaskApi};
use crate::board::Board;
use crate::cli::{Command, add_draft};
use crate::coordinator::{MutationCoordinator, MutationOutcome, ReloadOutcome};
use crate::datetime::ViewClock;
use crate::render::Renderer;
use crate::task::Task;

pub const SESSION_EXPIRED: &str = "session expired; sign in again";

/// Everything a command needs besides the coordinator.
pub struct CommandEnv<'a> {
    pub board: &'a mut Board,
    pub renderer: &'a Renderer,
    pub clock: ViewClock,
    pub recent_limit: usize,
}

#[instrument(skip_all)]
pub async fn dispatch<A: TaskApi>(
    coordinator: &MutationCoordinator<A>,
    ctx: CommandEnv<'_>,
    command: Command,
) -> anyhow::Result<()> {
    load(coordinator, ctx.board).await?;

    match command {
        Command::List { filter } => {
            ctx.board.set_filter(filter);
            let view = ctx.board.view(&ctx.clock);
            debug!(filter = filter.key(), shown = view.filtered.len(), "listing tasks");
            ctx.renderer.print_task_table(&refs(&view.filtered), &ctx.clock)
        }
        Command::Pending { sort } => {
            ctx.board.set_sort(sort);
            let view = ctx.board.view(&ctx.clock);
            ctx.renderer.print_task_table(&refs(&view.pending), &ctx.clock)
        }
        Command::Completed => {
            let view = ctx.board.view(&ctx.clock);
            ctx.renderer.print_task_table(&refs(&view.completed), &ctx.clock)
        }
        Command::Stats { json } => {
            let stats = ctx.board.view(&ctx.clock).stats;
            if json {
                let text = serde_json::to_string_pretty(&stats.to_dto())
                    .context("failed encoding statistics")?;
                println!("{text}");
                Ok(())
            } else {
                ctx.renderer.print_stats(&stats)
            }
        }
        Command::Recent { limit } => {
            let limit = limit.unwrap_or(ctx.recent_limit);
            let snapshot = coordinator.snapshot();
            let recent = crate::views::recent_tasks(snapshot.tasks(), limit);
            ctx.renderer.print_task_table(&refs(recent), &ctx.clock)
        }
        Command::Toggle { id } => {
            let task = find(coordinator, &id)?;
            let outcome = coordinator.toggle_completion(&task).await;
            settle(ctx.renderer, outcome)
        }
        Command::Delete { id } => {
            let task = find(coordinator, &id)?;
            let outcome = coordinator.delete(&task).await;
            settle(ctx.renderer, outcome)
        }
        Command::Edit { id, fields } => {
            let task = find(coordinator, &id)?;
            let draft = fields.into_draft(&task);
            let outcome = coordinator.save(&task.id, draft).await;
            settle(ctx.renderer, outcome)
        }
        Command::Add {
            title,
            description,
            priority,
            due,
        } => {
            let draft = add_draft(title, description, priority, due);
            let outcome = coordinator.create(draft).await;
            settle(ctx.renderer, outcome)
        }
    }
}

async fn load<A: TaskApi>(coordinator: &MutationCoordinator<A>, board: &mut Board) -> anyhow::Result<()> {
    board.begin_load();
    let outcome = coordinator.reload().await;
    board.finish_load(&outcome);

    match outcome {
        ReloadOutcome::Applied { count, version } => {
            info!(count, version, "tasks loaded");
            Ok(())
        }
        ReloadOutcome::Stale => Ok(()),
        ReloadOutcome::Failed(ApiError::Unauthorized) => Err(anyhow!(SESSION_EXPIRED)),
        ReloadOutcome::Failed(err) => Err(anyhow::Error::new(err).context("failed loading tasks")),
    }
}

fn find<A: TaskApi>(coordinator: &MutationCoordinator<A>, id: &str) -> anyhow::Result<Task> {
    coordinator
        .snapshot()
        .get(id)
        .cloned()
        .ok_or_else(|| anyhow!("no task with id {id}"))
}

fn settle(renderer: &Renderer, outcome: MutationOutcome) -> anyhow::Result<()> {
    renderer.print_outcome(&outcome)?;
    if outcome.ended_session() {
        bail!(SESSION_EXPIRED);
    }
    let confirmed = outcome.is_confirmed();
    match outcome.error {
        Some(err) if !confirmed => {
            Err(anyhow::Error::new(err).context(format!("{} did not go through", outcome.kind)))
        }
        _ => Ok(()),
    }
}

fn refs(tasks: &[Task]) -> Vec<&Task> {
    tasks.iter().collect()
}
