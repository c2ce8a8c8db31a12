use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CoreResult;
use crate::fault_tree::{GraphSnapshot, Position};

use super::{EntityKey, EntityKind, EntityPatch, EntitySnapshot};

/// Persistence contract for one analysis' fault tree.
///
/// Implementations must treat `create_entity` as idempotent for a repeated
/// client-generated id, and `delete_entity` of a missing entity as success.
/// Deleting a node removes its edges.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn create_entity(&self, entity: &EntitySnapshot) -> CoreResult<String>;

    async fn delete_entity(&self, kind: EntityKind, id: &str) -> CoreResult<()>;

    async fn update_entity(&self, id: &str, patch: &EntityPatch) -> CoreResult<()>;

    async fn move_entity(&self, id: &str, position: Position) -> CoreResult<()>;

    async fn move_entities(&self, moves: &[(String, Position)]) -> CoreResult<()> {
        for (id, position) in moves {
            self.move_entity(id, *position).await?;
        }
        Ok(())
    }

    async fn fetch_graph(&self) -> CoreResult<GraphSnapshot>;
}

/// One remote call, derived from applying a command in some direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RemoteOp {
    Create {
        entity: EntitySnapshot,
    },
    Delete {
        kind: EntityKind,
        id: String,
    },
    Update {
        id: String,
        patch: EntityPatch,
    },
    Move {
        id: String,
        position: Position,
    },
    MoveMany {
        moves: Vec<(String, Position)>,
    },
}

impl RemoteOp {
    pub fn entity_keys(&self) -> Vec<EntityKey> {
        match self {
            RemoteOp::Create { entity } => vec![entity.key()],
            RemoteOp::Delete { kind, id } => vec![EntityKey {
                kind: *kind,
                id: id.clone(),
            }],
            RemoteOp::Update { id, patch } => vec![EntityKey {
                kind: patch.kind(),
                id: id.clone(),
            }],
            RemoteOp::Move { id, .. } => vec![EntityKey::node(id)],
            RemoteOp::MoveMany { moves } => moves.iter().map(|(id, _)| EntityKey::node(id)).collect(),
        }
    }

    /// The part of this call that concerns `key`; batch moves split into
    /// single moves.
    pub fn for_entity(&self, key: &EntityKey) -> Option<RemoteOp> {
        match self {
            RemoteOp::MoveMany { moves } => moves
                .iter()
                .find(|(id, _)| key.kind == EntityKind::Node && id == &key.id)
                .map(|(id, position)| RemoteOp::Move {
                    id: id.clone(),
                    position: *position,
                }),
            other if other.entity_keys().contains(key) => Some(other.clone()),
            _ => None,
        }
    }

    pub fn split_per_entity(&self) -> Vec<RemoteOp> {
        self.entity_keys()
            .iter()
            .filter_map(|key| self.for_entity(key))
            .collect()
    }

    /// Whether a successful `self` makes an earlier `other` on the same
    /// entity redundant.
    pub fn supersedes(&self, other: &RemoteOp) -> bool {
        match (self, other) {
            (RemoteOp::Create { .. }, _) | (RemoteOp::Delete { .. }, _) => true,
            (RemoteOp::Move { .. }, RemoteOp::Move { .. })
            | (RemoteOp::Move { .. }, RemoteOp::MoveMany { .. })
            | (RemoteOp::MoveMany { .. }, RemoteOp::Move { .. })
            | (RemoteOp::MoveMany { .. }, RemoteOp::MoveMany { .. }) => true,
            (RemoteOp::Update { patch: mine, .. }, RemoteOp::Update { patch: theirs, .. }) => {
                mine.covers(theirs)
            }
            _ => false,
        }
    }

    /// True for an edge create referencing `node_id` as an endpoint.
    pub fn references_node(&self, node_id: &str) -> bool {
        matches!(self, RemoteOp::Create { entity: EntitySnapshot::Edge(edge) } if edge.touches(node_id))
    }

    /// Replay order for retries: parents before children, deletions last.
    pub fn retry_rank(&self) -> u8 {
        match self {
            RemoteOp::Create {
                entity: EntitySnapshot::Node(_),
            } => 0,
            RemoteOp::Update {
                patch: EntityPatch::Node(_),
                ..
            }
            | RemoteOp::Move { .. }
            | RemoteOp::MoveMany { .. } => 1,
            RemoteOp::Create {
                entity: EntitySnapshot::Edge(_),
            } => 2,
            RemoteOp::Update {
                patch: EntityPatch::Edge(_),
                ..
            } => 3,
            RemoteOp::Delete {
                kind: EntityKind::Edge,
                ..
            } => 4,
            RemoteOp::Delete {
                kind: EntityKind::Node,
                ..
            } => 5,
        }
    }

    pub async fn send<R: RemoteStore + ?Sized>(&self, remote: &R) -> CoreResult<()> {
        match self {
            RemoteOp::Create { entity } => remote.create_entity(entity).await.map(|_| ()),
            RemoteOp::Delete { kind, id } => remote.delete_entity(*kind, id).await,
            RemoteOp::Update { id, patch } => remote.update_entity(id, patch).await,
            RemoteOp::Move { id, position } => remote.move_entity(id, *position).await,
            RemoteOp::MoveMany { moves } => remote.move_entities(moves).await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RemoteOp::Create { entity } => format!("create {}", entity.key()),
            RemoteOp::Delete { kind, id } => format!("delete {}:{}", kind.as_str(), id),
            RemoteOp::Update { id, patch } => format!("update {}:{}", patch.kind().as_str(), id),
            RemoteOp::Move { id, .. } => format!("move node:{}", id),
            RemoteOp::MoveMany { moves } => format!("move {} nodes", moves.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault_tree::{FaultTreeEdge, FaultTreeNode, NodeFields};

    #[test]
    fn test_batch_move_splits_per_entity() {
        let op = RemoteOp::MoveMany {
            moves: vec![
                ("a".to_string(), Position::new(1.0, 1.0)),
                ("b".to_string(), Position::new(2.0, 2.0)),
            ],
        };
        assert_eq!(op.entity_keys(), vec![EntityKey::node("a"), EntityKey::node("b")]);
        assert_eq!(
            op.for_entity(&EntityKey::node("b")),
            Some(RemoteOp::Move {
                id: "b".to_string(),
                position: Position::new(2.0, 2.0)
            })
        );
        assert_eq!(op.for_entity(&EntityKey::edge("b")), None);
        assert_eq!(op.split_per_entity().len(), 2);
    }

    #[test]
    fn test_supersession_rules() {
        let create = RemoteOp::Create {
            entity: EntitySnapshot::Node(FaultTreeNode::new("n1", "x", Position::default())),
        };
        let mv = RemoteOp::Move {
            id: "n1".to_string(),
            position: Position::new(3.0, 3.0),
        };
        let label = RemoteOp::Update {
            id: "n1".to_string(),
            patch: EntityPatch::Node(NodeFields::default().with_label("y")),
        };

        assert!(create.supersedes(&mv));
        assert!(mv.supersedes(&mv));
        assert!(!mv.supersedes(&create));
        assert!(!mv.supersedes(&label));
        assert!(label.supersedes(&label));
    }

    #[test]
    fn test_retry_rank_orders_parents_first() {
        let node = RemoteOp::Create {
            entity: EntitySnapshot::Node(FaultTreeNode::new("n1", "x", Position::default())),
        };
        let edge = RemoteOp::Create {
            entity: EntitySnapshot::Edge(FaultTreeEdge::new("e1", "n1", "n2")),
        };
        let delete = RemoteOp::Delete {
            kind: EntityKind::Node,
            id: "n3".to_string(),
        };
        assert!(node.retry_rank() < edge.retry_rank());
        assert!(edge.retry_rank() < delete.retry_rank());
        assert!(edge.references_node("n2"));
        assert!(!node.references_node("n1"));
    }
}
