use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::task::{Task, TaskPatch};

/// Store handle shared between the coordinator and the views.
pub type SharedStore = Arc<Mutex<TaskStore>>;

/// Immutable view of the store at one version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    tasks: Arc<Vec<Task>>,
}

impl Snapshot {
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// A task taken out of the store, with the slot it occupied.
#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    pub position: usize,
    pub task: Task,
}

/// Session-wide collection of canonical tasks, unique by id.
///
/// Mutations are copy-on-write: a [`Snapshot`] taken earlier keeps seeing
/// the collection it was taken from.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Arc<Vec<Task>>,
    version: u64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.version,
            tasks: Arc::clone(&self.tasks),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    /// Copy of the task and the slot it sits in, shaped like [`Self::remove`]'s
    /// result so it can be handed to [`Self::restore`].
    pub fn slot(&self, id: &str) -> Option<Removed> {
        let position = self.position(id)?;
        Some(Removed {
            position,
            task: self.tasks[position].clone(),
        })
    }

    /// Swaps in a whole new collection. Later duplicates of an id are
    /// dropped; the first occurrence keeps its place.
    #[tracing::instrument(skip(self, tasks), fields(incoming = tasks.len()))]
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        let mut seen = HashSet::with_capacity(tasks.len());
        let mut kept = Vec::with_capacity(tasks.len());
        for task in tasks {
            if seen.insert(task.id.clone()) {
                kept.push(task);
            } else {
                warn!(id = %task.id, "dropping duplicate task id");
            }
        }

        self.tasks = Arc::new(kept);
        self.bump();
        info!(count = self.tasks.len(), version = self.version, "replaced task collection");
    }

    /// Returns `false`, changing nothing, when `id` is unknown.
    #[tracing::instrument(skip(self, patch))]
    pub fn apply_local(&mut self, id: &str, patch: TaskPatch) -> bool {
        let Some(idx) = self.position(id) else {
            debug!("patch for unknown task ignored");
            return false;
        };

        patch.apply(&mut Arc::make_mut(&mut self.tasks)[idx]);
        self.bump();
        true
    }

    #[tracing::instrument(skip(self))]
    pub fn remove(&mut self, id: &str) -> Option<Removed> {
        let position = self.position(id)?;
        let task = Arc::make_mut(&mut self.tasks).remove(position);
        self.bump();
        Some(Removed { position, task })
    }

    /// Puts a removed task back at its old slot (clamped to the current
    /// length). No-op if the id is present again.
    #[tracing::instrument(skip(self, removed), fields(id = %removed.task.id))]
    pub fn restore(&mut self, removed: Removed) -> bool {
        if self.position(&removed.task.id).is_some() {
            debug!("restore skipped; id already present");
            return false;
        }

        let tasks = Arc::make_mut(&mut self.tasks);
        let position = removed.position.min(tasks.len());
        tasks.insert(position, removed.task);
        self.bump();
        true
    }

    #[tracing::instrument(skip(self))]
    pub fn clear(&mut self) {
        self.tasks = Arc::new(vec![]);
        self.bump();
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::TaskStore;
    use crate::task::{Task, TaskPatch};

    fn ids(store: &TaskStore) -> Vec<String> {
        store.snapshot().tasks().iter().map(|t| t.id.clone()).collect()
    }

    #[test]
    fn replace_all_deduplicates_keeping_first() {
        let mut store = TaskStore::new();
        let mut dup = Task::new("a", "second copy");
        dup.completed = true;

        store.replace_all(vec![
            Task::new("a", "first copy"),
            Task::new("b", "b"),
            dup,
            Task::new("c", "c"),
        ]);

        assert_eq!(ids(&store), vec!["a", "b", "c"]);
        assert_eq!(store.get("a").map(|t| t.title.as_str()), Some("first copy"));
    }

    #[test]
    fn snapshots_do_not_see_later_mutations() {
        let mut store = TaskStore::new();
        store.replace_all(vec![Task::new("a", "a")]);
        let before = store.snapshot();

        assert!(store.apply_local("a", TaskPatch::completed(true)));
        let after = store.snapshot();

        assert!(!before.tasks()[0].completed);
        assert!(after.tasks()[0].completed);
        assert!(after.version > before.version);
    }

    #[test]
    fn patch_for_unknown_id_is_noop() {
        let mut store = TaskStore::new();
        store.replace_all(vec![Task::new("a", "a")]);
        let version = store.version();

        assert!(!store.apply_local("zzz", TaskPatch::completed(true)));
        assert_eq!(store.version(), version);
    }

    #[test]
    fn remove_and_restore_keep_position() {
        let mut store = TaskStore::new();
        store.replace_all(vec![
            Task::new("a", "a"),
            Task::new("b", "b"),
            Task::new("c", "c"),
        ]);

        let removed = store.remove("b").expect("b present");
        assert_eq!(removed.position, 1);
        assert_eq!(ids(&store), vec!["a", "c"]);

        assert!(store.restore(removed.clone()));
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
        assert!(!store.restore(removed));
    }

    #[test]
    fn slot_matches_what_remove_would_return() {
        let mut store = TaskStore::new();
        store.replace_all(vec![Task::new("a", "a"), Task::new("b", "b")]);
        let version = store.version();

        let slot = store.slot("b").expect("b present");
        assert_eq!(store.version(), version);
        assert!(store.slot("zzz").is_none());
        assert_eq!(store.remove("b"), Some(slot));
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = TaskStore::new();
        store.replace_all(vec![Task::new("a", "a")]);
        store.clear();
        assert!(store.is_empty());
        assert!(store.remove("a").is_none());
    }
}
