//! The single entry point for editing one analysis.
//!
//! An [`EditSession`] owns the command log, the optimistic store and the sync
//! tracker, and is the only thing that mutates them. Each edit is applied to
//! the store synchronously; the remote calls follow.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::command::{Command, CommandLog, DeletedNode, NodeMove};
use crate::config::EditorConfig;
use crate::errors::{CoreResult, GraphError, GraphResult};
use crate::fault_tree::{FaultTreeEdge, FaultTreeNode, NodeFields, Position};
use crate::feed::ChangeEvent;
use crate::reconcile::{self, ApplyOutcome, DispatchResult, Direction, Reconciler};
use crate::store::OptimisticStore;
use crate::sync::{
    Completion, EntityKey, EntityKind, RemoteStore, SyncState, SyncTicket, SyncTracker,
};

/// A command applied locally whose remote calls have not been sent yet.
#[derive(Debug, Clone)]
pub struct PendingSync {
    pub command: Command,
    pub direction: Direction,
    pub outcome: ApplyOutcome,
    pub tickets: Vec<SyncTicket>,
}

/// What happened to one executed, undone or redone command.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub command: Command,
    pub direction: Direction,
    pub outcome: ApplyOutcome,
    pub synced: Vec<EntityKey>,
    pub stale: Vec<EntityKey>,
    pub failed: Vec<(EntityKey, String)>,
}

impl SyncReport {
    pub fn is_synced(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct EditSession<R: RemoteStore + ?Sized> {
    client_id: String,
    log: CommandLog,
    store: OptimisticStore,
    tracker: SyncTracker,
    reconciler: Reconciler<R>,
    changes: Option<broadcast::Receiver<ChangeEvent>>,
    refresh_pending: bool,
}

impl<R: RemoteStore + ?Sized> EditSession<R> {
    pub fn new(remote: Arc<R>, config: &EditorConfig) -> Self {
        Self {
            client_id: Uuid::new_v4().to_string(),
            log: CommandLog::new(config.history_limit),
            store: OptimisticStore::new(),
            tracker: SyncTracker::new(),
            reconciler: Reconciler::new(remote, config.retry.clone()),
            changes: None,
            refresh_pending: false,
        }
    }

    /// Creates a session seeded with the remote's current graph.
    pub async fn load(remote: Arc<R>, config: &EditorConfig) -> CoreResult<Self> {
        let snapshot = remote.fetch_graph().await?;
        info!(
            "Loaded fault tree with {} nodes and {} edges",
            snapshot.nodes.len(),
            snapshot.edges.len()
        );
        Ok(Self::new(remote, config).with_store(OptimisticStore::from_snapshot(snapshot)))
    }

    /// Change events carrying this id are treated as our own echoes.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_store(mut self, store: OptimisticStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_changes(mut self, receiver: broadcast::Receiver<ChangeEvent>) -> Self {
        self.changes = Some(receiver);
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn store(&self) -> &OptimisticStore {
        &self.store
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    pub fn tracker(&self) -> &SyncTracker {
        &self.tracker
    }

    pub fn reconciler(&self) -> Reconciler<R> {
        self.reconciler.clone()
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    // ----- user edits -----

    pub async fn add_node(&mut self, node: FaultTreeNode) -> GraphResult<SyncReport> {
        self.execute(Command::AddNode { after: node }).await
    }

    pub async fn delete_node(&mut self, id: &str) -> GraphResult<SyncReport> {
        let node = self
            .store
            .node(id)
            .cloned()
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        let edges = self
            .store
            .edges()
            .filter(|edge| edge.touches(id))
            .cloned()
            .collect();
        self.execute(Command::DeleteNode {
            before: DeletedNode { node, edges },
        })
        .await
    }

    pub async fn update_node(&mut self, id: &str, fields: NodeFields) -> GraphResult<SyncReport> {
        let node = self
            .store
            .node(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        if fields.is_empty() {
            return Err(GraphError::Validation(format!(
                "Update of node {} changes no fields",
                id
            )));
        }
        let before = fields.capture_from(node);
        self.execute(Command::UpdateNode {
            subject_id: id.to_string(),
            before,
            after: fields,
        })
        .await
    }

    pub async fn move_node(&mut self, id: &str, position: Position) -> GraphResult<SyncReport> {
        let before = self
            .store
            .node(id)
            .map(|node| node.position)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        self.execute(Command::MoveNode {
            subject_id: id.to_string(),
            before,
            after: position,
        })
        .await
    }

    pub async fn add_edge(&mut self, edge: FaultTreeEdge) -> GraphResult<SyncReport> {
        self.execute(Command::AddEdge { after: edge }).await
    }

    pub async fn delete_edge(&mut self, id: &str) -> GraphResult<SyncReport> {
        let edge = self
            .store
            .edge(id)
            .cloned()
            .ok_or_else(|| GraphError::EdgeNotFound(id.to_string()))?;
        self.execute(Command::DeleteEdge { before: edge }).await
    }

    /// Moves several nodes as one undo step.
    pub async fn batch_move(&mut self, moves: Vec<(String, Position)>) -> GraphResult<SyncReport> {
        let moves = moves
            .into_iter()
            .map(|(node_id, after)| {
                let before = self
                    .store
                    .node(&node_id)
                    .map(|node| node.position)
                    .ok_or_else(|| GraphError::NodeNotFound(node_id.clone()))?;
                Ok(NodeMove {
                    node_id,
                    before,
                    after,
                })
            })
            .collect::<GraphResult<Vec<_>>>()?;
        self.execute(Command::BatchMove { moves }).await
    }

    /// Applies, records and syncs a command whose `before` state is already
    /// captured.
    pub async fn execute(&mut self, command: Command) -> GraphResult<SyncReport> {
        let pending = self.execute_local(command)?;
        Ok(self.sync(pending).await)
    }

    // ----- history -----

    /// Reverts the command before the cursor. `None` when there is nothing to undo.
    pub async fn undo(&mut self) -> Option<SyncReport> {
        let pending = self.undo_local()?;
        Some(self.sync(pending).await)
    }

    /// Re-applies the command at the cursor. `None` when there is nothing to redo.
    pub async fn redo(&mut self) -> Option<SyncReport> {
        let pending = self.redo_local()?;
        Some(self.sync(pending).await)
    }

    // ----- split API -----

    pub fn execute_local(&mut self, command: Command) -> GraphResult<PendingSync> {
        let ops = reconcile::apply_checked(&mut self.store, &command, Direction::Forward)?;
        debug!("Executed {}", command.describe());
        self.log.push(command.clone());
        Ok(self.pending(command, Direction::Forward, ApplyOutcome::Applied { ops }))
    }

    pub fn undo_local(&mut self) -> Option<PendingSync> {
        let command = self.log.undo()?;
        let outcome = reconcile::apply_local(&mut self.store, &command, Direction::Reverse);
        debug!("Undid {}", command.describe());
        Some(self.pending(command, Direction::Reverse, outcome))
    }

    pub fn redo_local(&mut self) -> Option<PendingSync> {
        let command = self.log.redo()?;
        let outcome = reconcile::apply_local(&mut self.store, &command, Direction::Forward);
        debug!("Redid {}", command.describe());
        Some(self.pending(command, Direction::Forward, outcome))
    }

    /// Folds dispatch results into the tracker. Acknowledgements older than
    /// the latest request for an entity are discarded.
    pub fn complete(&mut self, pending: PendingSync, results: Vec<DispatchResult>) -> SyncReport {
        let mut completion = Completion::default();
        for dispatched in &results {
            completion.merge(self.tracker.complete(
                &dispatched.ticket,
                &dispatched.result,
                dispatched.attempts,
            ));
        }

        let failed = completion
            .failed
            .into_iter()
            .map(|key| {
                let error = self
                    .tracker
                    .failure(&key)
                    .map(|record| record.last_error.clone())
                    .unwrap_or_default();
                (key, error)
            })
            .collect::<Vec<_>>();

        if !failed.is_empty() {
            warn!(
                "{} left {} entities unsynced",
                pending.command.describe(),
                failed.len()
            );
        }

        SyncReport {
            command: pending.command,
            direction: pending.direction,
            outcome: pending.outcome,
            synced: completion.synced,
            stale: completion.stale,
            failed,
        }
    }

    // ----- sync state -----

    pub fn sync_state(&self, kind: EntityKind, id: &str) -> SyncState {
        self.tracker.state(&EntityKey {
            kind,
            id: id.to_string(),
        })
    }

    pub fn unsynced(&self) -> Vec<EntityKey> {
        self.tracker.unsynced()
    }

    /// Re-sends every failed remote call, parents before children.
    pub async fn retry_failed(&mut self) -> Completion {
        let ops = self.tracker.failed_ops();
        if ops.is_empty() {
            return Completion::default();
        }
        info!("Retrying {} failed remote calls", ops.len());

        let tickets = self.tracker.begin(ops);
        let results = self.reconciler.dispatch(tickets).await;
        let mut completion = Completion::default();
        for dispatched in &results {
            completion.merge(self.tracker.complete(
                &dispatched.ticket,
                &dispatched.result,
                dispatched.attempts,
            ));
        }
        self.flush_deferred_refresh().await;
        completion
    }

    // ----- realtime -----

    /// Applies queued change events from other clients. Entities with local
    /// writes still unsynced keep their local value. Returns how many events
    /// changed the store.
    pub fn drain_changes(&mut self) -> usize {
        let Some(receiver) = self.changes.as_mut() else {
            return 0;
        };

        let mut applied = 0;
        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    if event.origin == self.client_id {
                        continue;
                    }
                    let key = event.change.key();
                    if self.tracker.is_unsynced(&key) {
                        debug!("Ignoring remote change to unsynced {}", key);
                        continue;
                    }
                    if self.store.apply_change(&event.change) {
                        applied += 1;
                    }
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!("Missed {} change events, scheduling refresh", missed);
                    self.refresh_pending = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        applied
    }

    /// Replaces the store with the remote graph, keeping unsynced entities.
    /// While remote calls are in flight the refetch is deferred and `false`
    /// is returned; it runs once they have all completed.
    pub async fn refresh(&mut self) -> CoreResult<bool> {
        if self.tracker.has_in_flight() {
            debug!("Deferring refresh until in-flight calls complete");
            self.refresh_pending = true;
            return Ok(false);
        }

        let snapshot = self.reconciler.remote().fetch_graph().await?;
        let tracker = &self.tracker;
        self.store
            .replace_all(snapshot, |key| tracker.is_unsynced(key));
        self.refresh_pending = false;
        info!(
            "Refreshed fault tree: {} nodes, {} edges",
            self.store.node_count(),
            self.store.edge_count()
        );
        Ok(true)
    }

    pub fn refresh_is_pending(&self) -> bool {
        self.refresh_pending
    }

    /// Runs a refresh deferred by [`refresh`](Self::refresh), if one is due.
    pub async fn refresh_deferred(&mut self) -> CoreResult<bool> {
        if !self.refresh_pending || self.tracker.has_in_flight() {
            return Ok(false);
        }
        self.refresh().await
    }

    // ----- internals -----

    fn pending(&mut self, command: Command, direction: Direction, outcome: ApplyOutcome) -> PendingSync {
        let tickets = self.tracker.begin(outcome.ops().to_vec());
        PendingSync {
            command,
            direction,
            outcome,
            tickets,
        }
    }

    async fn sync(&mut self, mut pending: PendingSync) -> SyncReport {
        let tickets = std::mem::take(&mut pending.tickets);
        let results = self.reconciler.dispatch(tickets).await;
        let report = self.complete(pending, results);
        self.flush_deferred_refresh().await;
        report
    }

    async fn flush_deferred_refresh(&mut self) {
        if let Err(err) = self.refresh_deferred().await {
            warn!("Deferred refresh failed: {}", err);
        }
    }
}
