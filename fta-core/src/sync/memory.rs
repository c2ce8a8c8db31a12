use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::Mutex;

use crate::errors::{CoreError, CoreResult};
use crate::fault_tree::{FaultTreeEdge, FaultTreeNode, GraphSnapshot, Position};

use super::{EntityKind, EntityPatch, EntitySnapshot, RemoteStore};

#[derive(Debug, Default)]
struct MemoryGraph {
    nodes: IndexMap<String, FaultTreeNode>,
    edges: IndexMap<String, FaultTreeEdge>,
}

/// In-process [`RemoteStore`] with switchable outages, used by the tests.
#[derive(Debug)]
pub struct MemoryRemote {
    graph: Mutex<MemoryGraph>,
    available: AtomicBool,
    fail_next: AtomicU32,
    calls: AtomicU64,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self {
            graph: Mutex::new(MemoryGraph::default()),
            available: AtomicBool::new(true),
            fail_next: AtomicU32::new(0),
            calls: AtomicU64::new(0),
        }
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: GraphSnapshot) -> Self {
        let graph = MemoryGraph {
            nodes: snapshot
                .nodes
                .into_iter()
                .map(|node| (node.id.clone(), node))
                .collect(),
            edges: snapshot
                .edges
                .into_iter()
                .map(|edge| (edge.id.clone(), edge))
                .collect(),
        };
        Self {
            graph: Mutex::new(graph),
            ..Self::default()
        }
    }

    /// While unavailable every call fails with a retryable error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Fail the next `count` calls, then recover.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> GraphSnapshot {
        let graph = self.graph.lock().await;
        GraphSnapshot {
            nodes: graph.nodes.values().cloned().collect(),
            edges: graph.edges.values().cloned().collect(),
        }
    }

    pub async fn node(&self, id: &str) -> Option<FaultTreeNode> {
        self.graph.lock().await.nodes.get(id).cloned()
    }

    pub async fn edge(&self, id: &str) -> Option<FaultTreeEdge> {
        self.graph.lock().await.edges.get(id).cloned()
    }

    /// Write made by another client, bypassing the outage switches.
    pub async fn put_node(&self, node: FaultTreeNode) {
        self.graph.lock().await.nodes.insert(node.id.clone(), node);
    }

    fn check_available(&self) -> CoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(CoreError::unavailable("remote store is offline"));
        }
        let failed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CoreError::unavailable("injected remote failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn create_entity(&self, entity: &EntitySnapshot) -> CoreResult<String> {
        self.check_available()?;
        let mut graph = self.graph.lock().await;
        match entity {
            // A repeated create leaves the stored entity untouched.
            EntitySnapshot::Node(node) => {
                graph
                    .nodes
                    .entry(node.id.clone())
                    .or_insert_with(|| node.clone());
                Ok(node.id.clone())
            }
            EntitySnapshot::Edge(edge) => {
                if graph.edges.contains_key(&edge.id) {
                    return Ok(edge.id.clone());
                }
                for endpoint in [&edge.source, &edge.target] {
                    if !graph.nodes.contains_key(endpoint) {
                        return Err(CoreError::validation(format!(
                            "Edge {} references unknown node {}",
                            edge.id, endpoint
                        )));
                    }
                }
                graph.edges.insert(edge.id.clone(), edge.clone());
                Ok(edge.id.clone())
            }
        }
    }

    async fn delete_entity(&self, kind: EntityKind, id: &str) -> CoreResult<()> {
        self.check_available()?;
        let mut graph = self.graph.lock().await;
        match kind {
            EntityKind::Node => {
                graph.nodes.shift_remove(id);
                graph.edges.retain(|_, edge| !edge.touches(id));
            }
            EntityKind::Edge => {
                graph.edges.shift_remove(id);
            }
        }
        Ok(())
    }

    async fn update_entity(&self, id: &str, patch: &EntityPatch) -> CoreResult<()> {
        self.check_available()?;
        let mut graph = self.graph.lock().await;
        match patch {
            EntityPatch::Node(fields) => {
                let node = graph
                    .nodes
                    .get_mut(id)
                    .ok_or_else(|| CoreError::not_found("Node", id))?;
                fields.apply_to(node);
            }
            EntityPatch::Edge(fields) => {
                let edge = graph
                    .edges
                    .get_mut(id)
                    .ok_or_else(|| CoreError::not_found("Edge", id))?;
                fields.apply_to(edge);
            }
        }
        Ok(())
    }

    async fn move_entity(&self, id: &str, position: Position) -> CoreResult<()> {
        self.check_available()?;
        let mut graph = self.graph.lock().await;
        let node = graph
            .nodes
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Node", id))?;
        node.position = position;
        Ok(())
    }

    async fn move_entities(&self, moves: &[(String, Position)]) -> CoreResult<()> {
        self.check_available()?;
        let mut graph = self.graph.lock().await;
        if let Some((missing, _)) = moves.iter().find(|(id, _)| !graph.nodes.contains_key(id)) {
            return Err(CoreError::not_found("Node", missing));
        }
        for (id, position) in moves {
            if let Some(node) = graph.nodes.get_mut(id) {
                node.position = *position;
            }
        }
        Ok(())
    }

    async fn fetch_graph(&self) -> CoreResult<GraphSnapshot> {
        self.check_available()?;
        Ok(self.snapshot().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let remote = MemoryRemote::new();
        let node = FaultTreeNode::new("n1", "Seal leak", Position::default());
        remote
            .create_entity(&EntitySnapshot::Node(node.clone()))
            .await
            .unwrap();
        remote
            .create_entity(&EntitySnapshot::Node(node))
            .await
            .unwrap();
        assert_eq!(remote.snapshot().await.nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_create_keeps_the_stored_entity() {
        let remote = MemoryRemote::new();
        for label in ["Seal leak", "Gasket rupture"] {
            remote
                .create_entity(&EntitySnapshot::Node(FaultTreeNode::new(
                    "n1",
                    label,
                    Position::default(),
                )))
                .await
                .unwrap();
        }
        assert_eq!(remote.node("n1").await.unwrap().label, "Seal leak");
    }

    #[tokio::test]
    async fn test_node_delete_cascades_and_missing_delete_succeeds() {
        let remote = MemoryRemote::new();
        for id in ["a", "b"] {
            remote
                .create_entity(&EntitySnapshot::Node(FaultTreeNode::new(id, id, Position::default())))
                .await
                .unwrap();
        }
        remote
            .create_entity(&EntitySnapshot::Edge(FaultTreeEdge::new("e1", "a", "b")))
            .await
            .unwrap();

        remote.delete_entity(EntityKind::Node, "b").await.unwrap();
        assert!(remote.edge("e1").await.is_none());
        remote.delete_entity(EntityKind::Node, "b").await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_failures_are_retryable_and_recover() {
        let remote = MemoryRemote::new();
        remote.fail_next(1);
        let err = remote.fetch_graph().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(remote.fetch_graph().await.is_ok());
        assert_eq!(remote.call_count(), 2);
    }
}
