//! Remote persistence contract and client-side sync bookkeeping.
//!
//! - [`RemoteStore`] is the contract against the backend (or the bundled
//!   SQLite adapter).
//! - [`RemoteOp`] is one remote call derived from a command.
//! - [`SyncTracker`] issues per-entity sequence numbers, discards stale
//!   acknowledgements and flags entities whose latest write failed.
//! - [`RetryPolicy`] bounds how hard the reconciler retries a call.

pub mod memory;
pub mod remote;
pub mod retry;
pub mod tracker;

pub use memory::MemoryRemote;
pub use remote::{RemoteOp, RemoteStore};
pub use retry::RetryPolicy;
pub use tracker::{Completion, SyncState, SyncTicket, SyncTracker};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fault_tree::{EdgeFields, FaultTreeEdge, FaultTreeNode, NodeFields};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Node,
    Edge,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Edge => "edge",
        }
    }
}

/// Identity of a node or edge for sequencing and sync flags.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn node(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Node,
            id: id.into(),
        }
    }

    pub fn edge(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Edge,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Full snapshot of one entity, as sent on create.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum EntitySnapshot {
    Node(FaultTreeNode),
    Edge(FaultTreeEdge),
}

impl EntitySnapshot {
    pub fn key(&self) -> EntityKey {
        match self {
            EntitySnapshot::Node(node) => EntityKey::node(&node.id),
            EntitySnapshot::Edge(edge) => EntityKey::edge(&edge.id),
        }
    }
}

/// Partial update of one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields", rename_all = "snake_case")]
pub enum EntityPatch {
    Node(NodeFields),
    Edge(EdgeFields),
}

impl EntityPatch {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPatch::Node(_) => EntityKind::Node,
            EntityPatch::Edge(_) => EntityKind::Edge,
        }
    }

    /// True when every field set in `other` is also set in `self`.
    pub fn covers(&self, other: &EntityPatch) -> bool {
        match (self, other) {
            (EntityPatch::Node(mine), EntityPatch::Node(theirs)) => {
                (theirs.label.is_none() || mine.label.is_some())
                    && (theirs.node_type.is_none() || mine.node_type.is_some())
                    && (theirs.metadata.is_none() || mine.metadata.is_some())
                    && (theirs.collapsed.is_none() || mine.collapsed.is_some())
            }
            (EntityPatch::Edge(mine), EntityPatch::Edge(theirs)) => {
                (theirs.gate.is_none() || mine.gate.is_some())
                    && (theirs.metadata.is_none() || mine.metadata.is_some())
            }
            _ => false,
        }
    }
}
