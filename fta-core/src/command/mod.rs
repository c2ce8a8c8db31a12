//! Reversible edit commands and the linear history that holds them.
//!
//! A [`Command`] records one committed user edit together with the state it
//! replaced (`before`) and the state it produced (`after`), so it can be
//! replayed in either direction. The [`CommandLog`] only tracks which
//! commands are applied; it never touches the graph itself.

pub mod log;

pub use log::{CommandLog, DEFAULT_HISTORY_LIMIT};

use serde::{Deserialize, Serialize};

use crate::fault_tree::{FaultTreeEdge, FaultTreeNode, NodeFields, Position};

/// Discriminant of a [`Command`], using the canvas wire names.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    AddNode,
    DeleteNode,
    UpdateNode,
    MoveNode,
    AddEdge,
    DeleteEdge,
    BatchMove,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::AddNode => "ADD_NODE",
            CommandKind::DeleteNode => "DELETE_NODE",
            CommandKind::UpdateNode => "UPDATE_NODE",
            CommandKind::MoveNode => "MOVE_NODE",
            CommandKind::AddEdge => "ADD_EDGE",
            CommandKind::DeleteEdge => "DELETE_EDGE",
            CommandKind::BatchMove => "BATCH_MOVE",
        }
    }
}

/// A node removed from the graph along with the edges that went with it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeletedNode {
    pub node: FaultTreeNode,
    #[serde(default)]
    pub edges: Vec<FaultTreeEdge>,
}

/// One member of a batch move.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMove {
    pub node_id: String,
    pub before: Position,
    pub after: Position,
}

/// A reversible record of one user edit to the fault-tree graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    AddNode {
        after: FaultTreeNode,
    },
    DeleteNode {
        before: DeletedNode,
    },
    #[serde(rename_all = "camelCase")]
    UpdateNode {
        subject_id: String,
        before: NodeFields,
        after: NodeFields,
    },
    #[serde(rename_all = "camelCase")]
    MoveNode {
        subject_id: String,
        before: Position,
        after: Position,
    },
    AddEdge {
        after: FaultTreeEdge,
    },
    DeleteEdge {
        before: FaultTreeEdge,
    },
    BatchMove {
        moves: Vec<NodeMove>,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::AddNode { .. } => CommandKind::AddNode,
            Command::DeleteNode { .. } => CommandKind::DeleteNode,
            Command::UpdateNode { .. } => CommandKind::UpdateNode,
            Command::MoveNode { .. } => CommandKind::MoveNode,
            Command::AddEdge { .. } => CommandKind::AddEdge,
            Command::DeleteEdge { .. } => CommandKind::DeleteEdge,
            Command::BatchMove { .. } => CommandKind::BatchMove,
        }
    }

    /// Identifier of the node or edge affected; `None` for batch commands.
    pub fn subject_id(&self) -> Option<&str> {
        match self {
            Command::AddNode { after } => Some(&after.id),
            Command::DeleteNode { before } => Some(&before.node.id),
            Command::UpdateNode { subject_id, .. } | Command::MoveNode { subject_id, .. } => {
                Some(subject_id)
            }
            Command::AddEdge { after } => Some(&after.id),
            Command::DeleteEdge { before } => Some(&before.id),
            Command::BatchMove { .. } => None,
        }
    }

    /// Node ids whose state this command changes.
    pub fn affected_nodes(&self) -> Vec<&str> {
        match self {
            Command::AddNode { after } => vec![after.id.as_str()],
            Command::DeleteNode { before } => vec![before.node.id.as_str()],
            Command::UpdateNode { subject_id, .. } | Command::MoveNode { subject_id, .. } => {
                vec![subject_id.as_str()]
            }
            Command::AddEdge { .. } | Command::DeleteEdge { .. } => Vec::new(),
            Command::BatchMove { moves } => moves.iter().map(|m| m.node_id.as_str()).collect(),
        }
    }

    /// Human-readable label for history menus and logs.
    pub fn describe(&self) -> String {
        match self {
            Command::AddNode { after } => format!("Add '{}'", after.label),
            Command::DeleteNode { before } => format!("Delete '{}'", before.node.label),
            Command::UpdateNode { subject_id, .. } => format!("Edit {}", subject_id),
            Command::MoveNode { subject_id, .. } => format!("Move {}", subject_id),
            Command::AddEdge { after } => format!("Connect {} -> {}", after.source, after.target),
            Command::DeleteEdge { before } => {
                format!("Disconnect {} -> {}", before.source, before.target)
            }
            Command::BatchMove { moves } => format!("Move {} nodes", moves.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_and_subject() {
        let cmd = Command::MoveNode {
            subject_id: "n1".to_string(),
            before: Position::new(0.0, 0.0),
            after: Position::new(100.0, 50.0),
        };
        assert_eq!(cmd.kind(), CommandKind::MoveNode);
        assert_eq!(cmd.kind().as_str(), "MOVE_NODE");
        assert_eq!(cmd.subject_id(), Some("n1"));

        let batch = Command::BatchMove { moves: Vec::new() };
        assert_eq!(batch.subject_id(), None);
    }

    #[test]
    fn test_wire_format_uses_kind_tag() {
        let value = json!({
            "kind": "ADD_NODE",
            "after": { "id": "n1", "position": { "x": 0.0, "y": 0.0 } }
        });
        let cmd: Command = serde_json::from_value(value).unwrap();
        assert_eq!(cmd.kind(), CommandKind::AddNode);

        let encoded = serde_json::to_value(&Command::MoveNode {
            subject_id: "n1".to_string(),
            before: Position::new(0.0, 0.0),
            after: Position::new(1.0, 1.0),
        })
        .unwrap();
        assert_eq!(encoded["kind"], "MOVE_NODE");
        assert_eq!(encoded["subjectId"], "n1");
    }

    #[test]
    fn test_batch_affects_every_member() {
        let cmd = Command::BatchMove {
            moves: vec![
                NodeMove {
                    node_id: "a".to_string(),
                    before: Position::default(),
                    after: Position::new(1.0, 0.0),
                },
                NodeMove {
                    node_id: "b".to_string(),
                    before: Position::default(),
                    after: Position::new(2.0, 0.0),
                },
            ],
        };
        assert_eq!(cmd.affected_nodes(), vec!["a", "b"]);
        assert_eq!(cmd.describe(), "Move 2 nodes");
    }
}
