//! Presentation state over the store:
//! the selected filter and sort, the load
//! state, and derived views recomputed
//! only when something they depend on
//! changed.

use chrono::NaiveDate;
use tracing::debug;

use crate::coordinator::ReloadOutcome;
use crate::datetime::ViewClock;
use crate::store::SharedStore;
use crate::task::Task;
use crate::views::{
  DEFAULT_RECENT_LIMIT,
  SortOrder,
  TaskFilter,
  TaskStats,
  completed_tasks,
  filter_tasks,
  pending_tasks,
  recent_tasks
};

#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub enum LoadState {
  #[default]
  Idle,
  Loading,
  Ready,
  /// Retryable; carries the message
  /// shown to the user.
  Failed(String)
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardView {
  pub version:   u64,
  pub stats:     TaskStats,
  pub filtered:  Vec<Task>,
  pub pending:   Vec<Task>,
  pub completed: Vec<Task>,
  pub recent:    Vec<Task>
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
struct CacheKey {
  version: u64,
  filter:  TaskFilter,
  sort:    SortOrder,
  today:   NaiveDate,
  recent:  usize
}

#[derive(Debug)]
pub struct Board {
  store:        SharedStore,
  filter:       TaskFilter,
  sort:         SortOrder,
  recent_limit: usize,
  load:         LoadState,
  cache:        Option<(CacheKey, BoardView)>
}

impl Board {
  pub fn new(store: SharedStore) -> Self {
    Self {
      store,
      filter: TaskFilter::default(),
      sort: SortOrder::default(),
      recent_limit: DEFAULT_RECENT_LIMIT,
      load: LoadState::Idle,
      cache: None
    }
  }

  #[must_use]
  pub fn with_recent_limit(
    mut self,
    limit: usize
  ) -> Self {
    self.recent_limit = limit;
    self
  }

  pub fn filter(&self) -> TaskFilter {
    self.filter
  }

  pub fn sort(&self) -> SortOrder {
    self.sort
  }

  pub fn load_state(&self) -> &LoadState {
    &self.load
  }

  pub fn set_filter(
    &mut self,
    filter: TaskFilter
  ) {
    self.filter = filter;
  }

  /// Unknown keys select `all`.
  pub fn set_filter_key(
    &mut self,
    key: &str
  ) {
    let Ok(filter) =
      key.parse::<TaskFilter>();
    self.filter = filter;
  }

  pub fn set_sort(
    &mut self,
    sort: SortOrder
  ) {
    self.sort = sort;
  }

  pub fn set_sort_key(
    &mut self,
    key: &str
  ) {
    let Ok(sort) =
      key.parse::<SortOrder>();
    self.sort = sort;
  }

  pub fn begin_load(&mut self) {
    self.load = LoadState::Loading;
  }

  /// A stale reload leaves the state as
  /// the newer one set it.
  pub fn finish_load(
    &mut self,
    outcome: &ReloadOutcome
  ) {
    match outcome {
      | ReloadOutcome::Applied {
        ..
      } => self.load = LoadState::Ready,
      | ReloadOutcome::Stale => {
        if self.load == LoadState::Loading
        {
          self.load = LoadState::Ready;
        }
      }
      | ReloadOutcome::Failed(err) => {
        self.load = LoadState::Failed(
          err.to_string()
        )
      }
    }
  }

  pub fn view(
    &mut self,
    clock: &ViewClock
  ) -> &BoardView {
    let snapshot =
      self.store.lock().snapshot();
    let key = CacheKey {
      version: snapshot.version,
      filter:  self.filter,
      sort:    self.sort,
      today:   clock.today,
      recent:  self.recent_limit
    };

    let stale = self
      .cache
      .as_ref()
      .is_some_and(|(cached, _)| {
        *cached != key
      });
    if stale {
      self.cache = None;
    }

    let filter = self.filter;
    let sort = self.sort;
    let recent_limit = self.recent_limit;
    let (_, view) =
      self.cache.get_or_insert_with(|| {
        debug!(
          version = key.version,
          filter = filter.key(),
          sort = sort.key(),
          "recomputing board views"
        );
        let tasks = snapshot.tasks();
        let view = BoardView {
          version:   key.version,
          stats:     TaskStats::compute(
            tasks
          ),
          filtered:  owned(filter_tasks(
            tasks, filter, clock
          )),
          pending:   owned(
            pending_tasks(tasks, sort)
          ),
          completed: owned(
            completed_tasks(tasks)
          ),
          recent:    recent_tasks(
            tasks,
            recent_limit
          )
          .to_vec()
        };
        (key, view)
      });
    view
  }
}

fn owned(tasks: Vec<&Task>) -> Vec<Task> {
  tasks.into_iter().cloned().collect()
}
