//! Forward and reverse application of commands.
//!
//! [`apply_local`] mutates the [`OptimisticStore`] and returns the remote
//! calls that mirror the mutation; the [`Reconciler`] sends them. Local
//! application always happens first so the canvas never waits on the network.

pub mod reconciler;

pub use reconciler::{DispatchResult, Reconciler};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::Command;
use crate::errors::{GraphError, GraphResult};
use crate::fault_tree::{FaultTreeEdge, FaultTreeNode, NodeFields, Position};
use crate::store::OptimisticStore;
use crate::sync::{EntityKind, EntityPatch, EntitySnapshot, RemoteOp};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Apply the `after` state (execute, redo).
    Forward,
    /// Restore the `before` state (undo).
    Reverse,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ApplyOutcome {
    Applied { ops: Vec<RemoteOp> },
    Skipped { reason: String },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }

    pub fn ops(&self) -> &[RemoteOp] {
        match self {
            ApplyOutcome::Applied { ops } => ops,
            ApplyOutcome::Skipped { .. } => &[],
        }
    }
}

/// Applies `command` to the store, turning a failed precondition into
/// [`ApplyOutcome::Skipped`]. Used for undo and redo, where the graph may
/// have been changed by a collaborator since the command was recorded.
pub fn apply_local(store: &mut OptimisticStore, command: &Command, direction: Direction) -> ApplyOutcome {
    match apply_checked(store, command, direction) {
        Ok(ops) => ApplyOutcome::Applied { ops },
        Err(err) => {
            warn!(
                "Skipping {:?} of {}: {}",
                direction,
                command.kind().as_str(),
                err
            );
            ApplyOutcome::Skipped {
                reason: err.to_string(),
            }
        }
    }
}

/// Applies `command` to the store or leaves it untouched and returns the
/// violated precondition.
pub fn apply_checked(
    store: &mut OptimisticStore,
    command: &Command,
    direction: Direction,
) -> GraphResult<Vec<RemoteOp>> {
    debug!("Applying {} {:?}", command.kind().as_str(), direction);

    match (command, direction) {
        (Command::AddNode { after }, Direction::Forward) => insert_node(store, after),
        (Command::AddNode { after }, Direction::Reverse) => remove_node(store, &after.id),

        (Command::DeleteNode { before }, Direction::Forward) => remove_node(store, &before.node.id),
        (Command::DeleteNode { before }, Direction::Reverse) => {
            let mut ops = insert_node(store, &before.node)?;
            for edge in &before.edges {
                // Edges whose other endpoint is gone stay deleted.
                if !store.contains_edge(&edge.id) && store.check_edge(edge).is_ok() {
                    ops.extend(insert_edge(store, edge)?);
                } else {
                    debug!("Not restoring edge {}: endpoint missing", edge.id);
                }
            }
            Ok(ops)
        }

        (
            Command::UpdateNode {
                subject_id,
                before,
                after,
            },
            direction,
        ) => {
            let fields = match direction {
                Direction::Forward => after,
                Direction::Reverse => before,
            };
            update_node(store, subject_id, fields)
        }

        (
            Command::MoveNode {
                subject_id,
                before,
                after,
            },
            direction,
        ) => {
            let position = match direction {
                Direction::Forward => *after,
                Direction::Reverse => *before,
            };
            store.update_node_position(subject_id, position)?;
            Ok(vec![RemoteOp::Move {
                id: subject_id.clone(),
                position,
            }])
        }

        (Command::AddEdge { after }, Direction::Forward) => insert_edge(store, after),
        (Command::AddEdge { after }, Direction::Reverse) => remove_edge(store, &after.id),
        (Command::DeleteEdge { before }, Direction::Forward) => remove_edge(store, &before.id),
        (Command::DeleteEdge { before }, Direction::Reverse) => insert_edge(store, before),

        (Command::BatchMove { moves }, direction) => {
            let targets: Vec<(String, Position)> = moves
                .iter()
                .map(|m| {
                    let position = match direction {
                        Direction::Forward => m.after,
                        Direction::Reverse => m.before,
                    };
                    (m.node_id.clone(), position)
                })
                .collect();

            // Check every member first so the batch lands entirely or not at all.
            if let Some((missing, _)) = targets.iter().find(|(id, _)| !store.contains_node(id)) {
                return Err(GraphError::NodeNotFound(missing.clone()));
            }
            for (id, position) in &targets {
                store.update_node_position(id, *position)?;
            }
            if targets.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![RemoteOp::MoveMany { moves: targets }])
        }
    }
}

// The store upserts; a create here must never replace an entity the command
// did not capture.
fn insert_node(store: &mut OptimisticStore, node: &FaultTreeNode) -> GraphResult<Vec<RemoteOp>> {
    if store.contains_node(&node.id) {
        return Err(GraphError::DuplicateNode(node.id.clone()));
    }
    store.add_node(node.clone());
    Ok(vec![RemoteOp::Create {
        entity: EntitySnapshot::Node(node.clone()),
    }])
}

fn remove_node(store: &mut OptimisticStore, id: &str) -> GraphResult<Vec<RemoteOp>> {
    store
        .delete_node(id)
        .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
    Ok(vec![RemoteOp::Delete {
        kind: EntityKind::Node,
        id: id.to_string(),
    }])
}

fn update_node(store: &mut OptimisticStore, id: &str, fields: &NodeFields) -> GraphResult<Vec<RemoteOp>> {
    store.update_node(id, fields)?;
    if fields.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![RemoteOp::Update {
        id: id.to_string(),
        patch: EntityPatch::Node(fields.clone()),
    }])
}

fn insert_edge(store: &mut OptimisticStore, edge: &FaultTreeEdge) -> GraphResult<Vec<RemoteOp>> {
    if store.contains_edge(&edge.id) {
        return Err(GraphError::DuplicateEdge(edge.id.clone()));
    }
    store.add_edge(edge.clone())?;
    Ok(vec![RemoteOp::Create {
        entity: EntitySnapshot::Edge(edge.clone()),
    }])
}

fn remove_edge(store: &mut OptimisticStore, id: &str) -> GraphResult<Vec<RemoteOp>> {
    store
        .delete_edge(id)
        .ok_or_else(|| GraphError::EdgeNotFound(id.to_string()))?;
    Ok(vec![RemoteOp::Delete {
        kind: EntityKind::Edge,
        id: id.to_string(),
    }])
}
