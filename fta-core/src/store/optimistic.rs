use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::command::DeletedNode;
use crate::errors::{GraphError, GraphResult};
use crate::fault_tree::{FaultTreeEdge, FaultTreeNode, GraphSnapshot, NodeFields, Position};
use crate::feed::EntityChange;
use crate::sync::{EntityKey, EntityKind, EntityPatch, EntitySnapshot};

/// The nodes and edges the user sees, updated before the remote confirms.
///
/// Insertion order is preserved so rendering and snapshots are stable. Every
/// edge references two nodes present in the store.
#[derive(Debug, Clone, Default)]
pub struct OptimisticStore {
    nodes: IndexMap<String, FaultTreeNode>,
    edges: IndexMap<String, FaultTreeEdge>,
}

impl OptimisticStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a fetched graph, dropping edges with missing endpoints.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut store = Self::new();
        store.load(snapshot);
        store
    }

    // ----- mutations -----

    /// Inserts the node, replacing any node with the same id.
    pub fn add_node(&mut self, node: FaultTreeNode) {
        trace!("store: add node {}", node.id);
        self.nodes.insert(node.id.clone(), node);
    }

    /// Removes a node and every edge touching it.
    pub fn delete_node(&mut self, id: &str) -> Option<DeletedNode> {
        let node = self.nodes.shift_remove(id)?;
        let incident: Vec<String> = self
            .edges
            .values()
            .filter(|edge| edge.touches(id))
            .map(|edge| edge.id.clone())
            .collect();
        let edges = incident
            .iter()
            .filter_map(|edge_id| self.edges.shift_remove(edge_id))
            .collect::<Vec<_>>();
        trace!("store: delete node {} with {} edges", id, edges.len());
        Some(DeletedNode { node, edges })
    }

    pub fn update_node(&mut self, id: &str, fields: &NodeFields) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        fields.apply_to(node);
        Ok(())
    }

    pub fn update_node_position(&mut self, id: &str, position: Position) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        node.position = position;
        Ok(())
    }

    /// Inserts the edge, replacing any edge with the same id.
    pub fn add_edge(&mut self, edge: FaultTreeEdge) -> GraphResult<()> {
        self.check_edge(&edge)?;
        trace!("store: add edge {} ({} -> {})", edge.id, edge.source, edge.target);
        self.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    pub fn delete_edge(&mut self, id: &str) -> Option<FaultTreeEdge> {
        self.edges.shift_remove(id)
    }

    /// Rejects self-loops and edges whose endpoints are not in the store.
    pub fn check_edge(&self, edge: &FaultTreeEdge) -> GraphResult<()> {
        if edge.source == edge.target {
            return Err(GraphError::SelfLoop(edge.id.clone()));
        }
        for endpoint in [&edge.source, &edge.target] {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphError::DanglingEdge {
                    edge: edge.id.clone(),
                    node: endpoint.clone(),
                });
            }
        }
        Ok(())
    }

    // ----- queries -----

    pub fn node(&self, id: &str) -> Option<&FaultTreeNode> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&FaultTreeEdge> {
        self.edges.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FaultTreeNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &FaultTreeEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn contains_edge(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        match key.kind {
            EntityKind::Node => self.contains_node(&key.id),
            EntityKind::Edge => self.contains_edge(&key.id),
        }
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    /// Direct causes of `id`, in edge order.
    pub fn children(&self, id: &str) -> Vec<&FaultTreeNode> {
        self.edges
            .values()
            .filter(|edge| edge.source == id)
            .filter_map(|edge| self.nodes.get(&edge.target))
            .collect()
    }

    /// Nodes not hidden beneath a collapsed ancestor.
    pub fn visible_nodes(&self) -> Vec<&FaultTreeNode> {
        let mut hidden: HashSet<&str> = HashSet::new();
        let mut frontier: Vec<&str> = self
            .nodes
            .values()
            .filter(|node| node.collapsed)
            .map(|node| node.id.as_str())
            .collect();

        while let Some(id) = frontier.pop() {
            for edge in self.edges.values().filter(|edge| edge.source == id) {
                if hidden.insert(edge.target.as_str()) {
                    frontier.push(edge.target.as_str());
                }
            }
        }

        self.nodes
            .values()
            .filter(|node| !hidden.contains(node.id.as_str()))
            .collect()
    }

    // ----- external updates -----

    /// Applies a change made by another client. Last writer wins per entity;
    /// an edge whose endpoints are missing locally is ignored.
    pub fn apply_change(&mut self, change: &EntityChange) -> bool {
        match change {
            EntityChange::Upserted {
                entity: EntitySnapshot::Node(node),
            } => {
                self.add_node(node.clone());
                true
            }
            EntityChange::Upserted {
                entity: EntitySnapshot::Edge(edge),
            } => match self.add_edge(edge.clone()) {
                Ok(()) => true,
                Err(err) => {
                    debug!("Ignoring remote edge {}: {}", edge.id, err);
                    false
                }
            },
            EntityChange::Patched { id, patch } => match patch {
                EntityPatch::Node(fields) => self.update_node(id, fields).is_ok(),
                EntityPatch::Edge(fields) => match self.edges.get_mut(id) {
                    Some(edge) => {
                        fields.apply_to(edge);
                        true
                    }
                    None => false,
                },
            },
            EntityChange::Moved { id, position } => {
                self.update_node_position(id, *position).is_ok()
            }
            EntityChange::Deleted { kind, id } => match kind {
                EntityKind::Node => self.delete_node(id).is_some(),
                EntityKind::Edge => self.delete_edge(id).is_some(),
            },
        }
    }

    /// Replaces the contents with `snapshot`, keeping the local version of
    /// every entity for which `keep` returns true.
    pub fn replace_all<F>(&mut self, snapshot: GraphSnapshot, keep: F)
    where
        F: Fn(&EntityKey) -> bool,
    {
        let mut nodes: IndexMap<String, FaultTreeNode> = snapshot
            .nodes
            .into_iter()
            .filter(|node| !keep(&EntityKey::node(&node.id)))
            .map(|node| (node.id.clone(), node))
            .collect();
        for (id, node) in &self.nodes {
            if keep(&EntityKey::node(id)) {
                nodes.insert(id.clone(), node.clone());
            }
        }

        let mut edges: IndexMap<String, FaultTreeEdge> = snapshot
            .edges
            .into_iter()
            .filter(|edge| !keep(&EntityKey::edge(&edge.id)))
            .map(|edge| (edge.id.clone(), edge))
            .collect();
        for (id, edge) in &self.edges {
            if keep(&EntityKey::edge(id)) {
                edges.insert(id.clone(), edge.clone());
            }
        }
        edges.retain(|_, edge| nodes.contains_key(&edge.source) && nodes.contains_key(&edge.target));

        debug!(
            "store: replaced with {} nodes, {} edges",
            nodes.len(),
            edges.len()
        );
        self.nodes = nodes;
        self.edges = edges;
    }

    fn load(&mut self, snapshot: GraphSnapshot) {
        self.replace_all(snapshot, |_| false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> FaultTreeNode {
        FaultTreeNode::new(id, id.to_uppercase(), Position::default())
    }

    fn tree() -> OptimisticStore {
        let mut store = OptimisticStore::new();
        for id in ["top", "mid", "leaf"] {
            store.add_node(node(id));
        }
        store.add_edge(FaultTreeEdge::new("e1", "top", "mid")).unwrap();
        store.add_edge(FaultTreeEdge::new("e2", "mid", "leaf")).unwrap();
        store
    }

    #[test]
    fn test_delete_node_takes_incident_edges() {
        let mut store = tree();
        let deleted = store.delete_node("mid").unwrap();
        assert_eq!(deleted.node.id, "mid");
        assert_eq!(deleted.edges.len(), 2);
        assert_eq!(store.edge_count(), 0);
        assert!(store.delete_node("mid").is_none());
    }

    #[test]
    fn test_add_edge_validates_endpoints() {
        let mut store = tree();
        assert!(matches!(
            store.add_edge(FaultTreeEdge::new("e3", "top", "ghost")),
            Err(GraphError::DanglingEdge { .. })
        ));
        assert!(matches!(
            store.add_edge(FaultTreeEdge::new("e4", "top", "top")),
            Err(GraphError::SelfLoop(_))
        ));
    }

    #[test]
    fn test_update_missing_node_fails() {
        let mut store = tree();
        let err = store
            .update_node("ghost", &NodeFields::default().with_label("x"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_collapsed_node_hides_descendants() {
        let mut store = tree();
        store
            .update_node("top", &NodeFields::default().with_collapsed(true))
            .unwrap();
        let visible: Vec<&str> = store.visible_nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(visible, vec!["top"]);
        assert_eq!(store.children("top").len(), 1);
    }

    #[test]
    fn test_replace_all_keeps_unsynced_entities() {
        let mut store = tree();
        store
            .update_node("leaf", &NodeFields::default().with_label("local edit"))
            .unwrap();

        let mut remote = tree().snapshot();
        remote.nodes[0].label = "Remote top".to_string();
        remote.nodes[2].label = "Remote leaf".to_string();

        store.replace_all(remote, |key| key == &EntityKey::node("leaf"));
        assert_eq!(store.node("top").unwrap().label, "Remote top");
        assert_eq!(store.node("leaf").unwrap().label, "local edit");
        assert_eq!(store.edge_count(), 2);
    }

    #[test]
    fn test_apply_change_is_per_entity() {
        let mut store = tree();
        assert!(store.apply_change(&EntityChange::Moved {
            id: "leaf".to_string(),
            position: Position::new(4.0, 2.0),
        }));
        assert_eq!(store.node("leaf").unwrap().position, Position::new(4.0, 2.0));

        assert!(store.apply_change(&EntityChange::Deleted {
            kind: EntityKind::Node,
            id: "leaf".to_string(),
        }));
        assert_eq!(store.edge_count(), 1);
        assert!(!store.apply_change(&EntityChange::Moved {
            id: "leaf".to_string(),
            position: Position::default(),
        }));
    }
}
