//! Optimistic mutations against the remote task resource.
//!
//! Toggle and delete change the store before the request goes out and undo
//! the change if the request fails. Save and create only touch the store
//! through a full reload once the server has accepted them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use taskdeck_shared::{CompletionUpdate, TaskUpdate};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{ApiError, Credential, TaskApi};
use crate::normalize::{Normalizer, TaskDraft};
use crate::session::Session;
use crate::store::{Removed, SharedStore, Snapshot};
use crate::task::{Task, TaskPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Toggle,
    Save,
    Delete,
    Create,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Toggle => "toggle",
            Self::Save => "save",
            Self::Delete => "delete",
            Self::Create => "create",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Nothing was attempted (precondition failed).
    Idle,
    /// Local change applied, remote call in flight.
    Pending,
    Confirmed,
    /// The remote call failed. Once nothing newer on the task is in flight
    /// the store shows the last state the server accepted.
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub kind: MutationKind,
    pub task_id: Option<String>,
    pub state: MutationState,
    pub error: Option<ApiError>,
}

impl MutationOutcome {
    fn confirmed(kind: MutationKind, task_id: Option<String>) -> Self {
        Self {
            kind,
            task_id,
            state: MutationState::Confirmed,
            error: None,
        }
    }

    fn failed(kind: MutationKind, task_id: Option<String>, state: MutationState, error: ApiError) -> Self {
        Self {
            kind,
            task_id,
            state,
            error: Some(error),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == MutationState::Confirmed
    }

    pub fn ended_session(&self) -> bool {
        self.error.as_ref().is_some_and(ApiError::is_unauthorized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied { count: usize, version: u64 },
    /// A newer reload already landed, or the session ended meanwhile.
    Stale,
    Failed(ApiError),
}

/// What an optimistic mutation changed locally.
#[derive(Debug, Clone, Copy)]
enum Effect {
    Completion(bool),
    Removal,
}

/// The task as the server last accepted it.
#[derive(Debug, Clone)]
enum Baseline {
    Present(Removed),
    Gone,
}

/// Bookkeeping for a task with optimistic mutations in flight. The
/// baseline is taken before the first of them touched the store and only
/// moves forward when one is confirmed.
#[derive(Debug)]
struct Claim {
    owner: u64,
    confirmed: u64,
    pending: usize,
    failed: bool,
    baseline: Baseline,
}

impl Claim {
    fn confirm(&mut self, token: u64, effect: Effect) {
        // The server applies requests in send order; an older
        // confirmation arriving late does not overwrite a newer one.
        if token <= self.confirmed {
            return;
        }
        self.confirmed = token;
        match (effect, &mut self.baseline) {
            (Effect::Completion(completed), Baseline::Present(slot)) => slot.task.completed = completed,
            (Effect::Completion(_), Baseline::Gone) => {}
            (Effect::Removal, baseline) => *baseline = Baseline::Gone,
        }
    }
}

pub struct MutationCoordinator<A> {
    api: A,
    store: SharedStore,
    session: Arc<Session>,
    normalizer: Normalizer,
    reload_started: AtomicU64,
    reload_applied: AtomicU64,
    mutation_seq: AtomicU64,
    in_flight: Mutex<HashMap<String, Claim>>,
}

impl<A: TaskApi> MutationCoordinator<A> {
    pub fn new(api: A, store: SharedStore, session: Arc<Session>, normalizer: Normalizer) -> Self {
        Self {
            api,
            store,
            session,
            normalizer,
            reload_started: AtomicU64::new(0),
            reload_applied: AtomicU64::new(0),
            mutation_seq: AtomicU64::new(0),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.lock().snapshot()
    }

    /// Whether an optimistic change to `id` is still waiting on the server.
    pub fn is_pending(&self, id: &str) -> bool {
        self.in_flight.lock().contains_key(id)
    }

    /// Fetches the full list and swaps it in, unless a reload started later
    /// has already been applied.
    #[tracing::instrument(skip(self), fields(seq))]
    pub async fn reload(&self) -> ReloadOutcome {
        let credential = match self.session.credential() {
            Ok(credential) => credential,
            Err(err) => return ReloadOutcome::Failed(err),
        };

        let seq = self.reload_started.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::Span::current().record("seq", seq);

        let payload = match self.api.list_tasks(&credential).await {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "task reload failed");
                self.escalate(&err);
                return ReloadOutcome::Failed(err);
            }
        };

        let tasks = self.normalizer.normalize_payload(&payload);
        if self.session.is_terminated() {
            debug!("discarding reload that finished after session end");
            return ReloadOutcome::Stale;
        }

        let mut store = self.store.lock();
        if seq <= self.reload_applied.load(Ordering::SeqCst) {
            debug!(
                applied = self.reload_applied.load(Ordering::SeqCst),
                "discarding stale reload"
            );
            return ReloadOutcome::Stale;
        }
        self.reload_applied.store(seq, Ordering::SeqCst);
        store.replace_all(tasks);

        info!(count = store.len(), "reload applied");
        ReloadOutcome::Applied {
            count: store.len(),
            version: store.version(),
        }
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id, request_id = %Uuid::new_v4()))]
    pub async fn toggle_completion(&self, task: &Task) -> MutationOutcome {
        let kind = MutationKind::Toggle;
        let credential = match self.require_credential(kind, &task.id) {
            Ok(credential) => credential,
            Err(outcome) => return outcome,
        };

        let (target, before) = {
            let mut store = self.store.lock();
            let before = store.slot(&task.id);
            let current = before.as_ref().map_or(task.completed, |slot| slot.task.completed);
            let target = !current;
            store.apply_local(&task.id, TaskPatch::completed(target));
            (target, before)
        };
        let token = self.begin(&task.id, before);
        debug!(completed = target, "optimistic completion applied");

        let update = TaskUpdate::from(CompletionUpdate { completed: target });
        let result = self
            .api
            .update_task(&credential, &task.id, &update)
            .await
            .map(drop);
        self.settle(kind, &task.id, token, Effect::Completion(target), result)
    }

    /// Removes the task locally first; a failed request puts it back in its
    /// old slot.
    #[tracing::instrument(skip(self, task), fields(id = %task.id, request_id = %Uuid::new_v4()))]
    pub async fn delete(&self, task: &Task) -> MutationOutcome {
        let kind = MutationKind::Delete;
        let credential = match self.require_credential(kind, &task.id) {
            Ok(credential) => credential,
            Err(outcome) => return outcome,
        };

        let removed = self.store.lock().remove(&task.id);
        let token = self.begin(&task.id, removed);

        let result = self.api.delete_task(&credential, &task.id).await;
        self.settle(kind, &task.id, token, Effect::Removal, result)
    }

    /// Sends the full canonical field set, then reloads. Nothing is applied
    /// locally, so a failure leaves the store as it was.
    #[tracing::instrument(skip(self, draft), fields(request_id = %Uuid::new_v4()))]
    pub async fn save(&self, id: &str, draft: TaskDraft) -> MutationOutcome {
        let kind = MutationKind::Save;
        let credential = match self.require_credential(kind, id) {
            Ok(credential) => credential,
            Err(outcome) => return outcome,
        };

        let update = TaskUpdate::from(draft.into_fields(self.normalizer.tz()));
        match self.api.update_task(&credential, id, &update).await {
            Ok(_) => {
                info!(kind = %kind, "mutation confirmed");
                self.reload_after(kind).await;
                MutationOutcome::confirmed(kind, Some(id.to_string()))
            }
            Err(err) => {
                error!(kind = %kind, error = %err, "mutation failed");
                self.escalate(&err);
                MutationOutcome::failed(kind, Some(id.to_string()), MutationState::RolledBack, err)
            }
        }
    }

    #[tracing::instrument(skip(self, draft), fields(request_id = %Uuid::new_v4()))]
    pub async fn create(&self, draft: TaskDraft) -> MutationOutcome {
        let kind = MutationKind::Create;
        let credential = match self.session.credential() {
            Ok(credential) => credential,
            Err(err) => return MutationOutcome::failed(kind, None, MutationState::Idle, err),
        };

        let create = draft.into_create(self.normalizer.tz());
        match self.api.create_task(&credential, &create).await {
            Ok(raw) => {
                let task_id = self.normalizer.normalize_record(&raw).map(|task| task.id);
                info!(kind = %kind, task_id = ?task_id, "mutation confirmed");
                self.reload_after(kind).await;
                MutationOutcome::confirmed(kind, task_id)
            }
            Err(err) => {
                error!(kind = %kind, error = %err, "mutation failed");
                self.escalate(&err);
                MutationOutcome::failed(kind, None, MutationState::RolledBack, err)
            }
        }
    }

    fn require_credential(&self, kind: MutationKind, id: &str) -> Result<Credential, MutationOutcome> {
        self.session.credential().map_err(|err| {
            warn!(kind = %kind, error = %err, "mutation refused before any request");
            MutationOutcome::failed(kind, Some(id.to_string()), MutationState::Idle, err)
        })
    }

    async fn reload_after(&self, kind: MutationKind) {
        if let ReloadOutcome::Failed(err) = self.reload().await {
            warn!(kind = %kind, error = %err, "reload after mutation failed");
        }
    }

    /// Claims `id` for this mutation; later claims supersede it as owner.
    /// `before` is the task as it stood before this mutation touched the
    /// store, and only the first claim on an id keeps it.
    fn begin(&self, id: &str, before: Option<Removed>) -> u64 {
        let token = self.mutation_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(before) = before else {
            return token;
        };

        self.in_flight
            .lock()
            .entry(id.to_string())
            .and_modify(|claim| {
                claim.owner = token;
                claim.pending += 1;
            })
            .or_insert(Claim {
                owner: token,
                confirmed: 0,
                pending: 1,
                failed: false,
                baseline: Baseline::Present(before),
            });
        token
    }

    fn settle(
        &self,
        kind: MutationKind,
        id: &str,
        token: u64,
        effect: Effect,
        result: Result<(), ApiError>,
    ) -> MutationOutcome {
        match result {
            Ok(()) => {
                self.finish(id, token, Some(effect));
                info!(kind = %kind, "mutation confirmed");
                MutationOutcome::confirmed(kind, Some(id.to_string()))
            }
            Err(err) => {
                error!(kind = %kind, error = %err, "mutation failed");
                self.escalate(&err);
                self.finish(id, token, None);
                MutationOutcome::failed(kind, Some(id.to_string()), MutationState::RolledBack, err)
            }
        }
    }

    /// Records how one mutation ended. The store goes back to the baseline
    /// when the owner fails, and again when the last mutation on the id
    /// settles after any of them failed.
    fn finish(&self, id: &str, token: u64, confirmed: Option<Effect>) {
        let baseline = {
            let mut in_flight = self.in_flight.lock();
            let Some(claim) = in_flight.get_mut(id) else {
                return;
            };

            claim.pending = claim.pending.saturating_sub(1);
            match confirmed {
                Some(effect) => claim.confirm(token, effect),
                None => claim.failed = true,
            }

            let owner_failed = confirmed.is_none() && claim.owner == token;
            let settled = claim.pending == 0;
            let baseline = (owner_failed || (settled && claim.failed)).then(|| claim.baseline.clone());
            if settled {
                in_flight.remove(id);
            }
            baseline
        };

        let Some(baseline) = baseline else {
            if confirmed.is_none() {
                debug!("newer mutation owns the task; rollback deferred");
            }
            return;
        };
        if self.session.is_terminated() {
            debug!("session ended; rollback skipped");
            return;
        }

        let mut store = self.store.lock();
        let reverted = match baseline {
            Baseline::Gone => store.remove(id).is_some(),
            Baseline::Present(slot) => match store.get(id).map(|task| task.completed) {
                Some(completed) if completed == slot.task.completed => false,
                Some(_) => store.apply_local(id, TaskPatch::completed(slot.task.completed)),
                None => store.restore(slot),
            },
        };
        debug!(reverted, "rollback finished");
    }

    /// Unauthorized ends the session no matter which call saw it.
    fn escalate(&self, err: &ApiError) {
        if !err.is_unauthorized() {
            return;
        }
        if self.session.terminate() {
            self.store.lock().clear();
            self.in_flight.lock().clear();
        }
    }
}
