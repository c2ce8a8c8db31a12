use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::database::entities::{analyses, fault_tree_edges, fault_tree_nodes};
use crate::errors::{CoreError, CoreResult};
use crate::fault_tree::{
    EdgeFields, FaultTreeEdge, FaultTreeNode, GraphSnapshot, NodeFields, Position,
};
use crate::feed::{ChangeEvent, ChangeFeed, EntityChange};
use crate::services::ValidationService;
use crate::sync::{EntityKind, EntityPatch, EntitySnapshot, RemoteStore};

pub const SERVICE_ORIGIN: &str = "fta-service";

/// Database-backed fault tree of one analysis.
///
/// Every mutation bumps the analysis version inside the same transaction and,
/// once committed, publishes one [`ChangeEvent`] per touched entity.
#[derive(Clone)]
pub struct FaultTreeService {
    db: DatabaseConnection,
    analysis_id: String,
    feed: Option<ChangeFeed>,
    origin: String,
}

impl FaultTreeService {
    pub fn new(db: DatabaseConnection, analysis_id: impl Into<String>) -> Self {
        Self {
            db,
            analysis_id: analysis_id.into(),
            feed: None,
            origin: SERVICE_ORIGIN.to_string(),
        }
    }

    /// Publish changes to `feed`, tagged with the writing client's id.
    pub fn with_feed(mut self, feed: ChangeFeed, origin: impl Into<String>) -> Self {
        self.feed = Some(feed);
        self.origin = origin.into();
        self
    }

    pub fn analysis_id(&self) -> &str {
        &self.analysis_id
    }

    async fn bump_analysis_version<C: ConnectionTrait>(&self, conn: &C) -> CoreResult<i32> {
        let analysis = analyses::Entity::find_by_id(self.analysis_id.clone())
            .one(conn)
            .await?
            .ok_or_else(|| CoreError::not_found("Analysis", &self.analysis_id))?;

        let new_version = analysis.version + 1;

        let mut analysis_active: analyses::ActiveModel = analysis.into();
        analysis_active.version = Set(new_version);
        analysis_active.updated_at = Set(Utc::now());
        analysis_active.update(conn).await?;

        Ok(new_version)
    }

    async fn publish(&self, changes: Vec<EntityChange>) {
        let Some(feed) = &self.feed else {
            return;
        };
        for change in changes {
            feed.publish(ChangeEvent::new(&self.analysis_id, &self.origin, change))
                .await;
        }
    }

    async fn find_node<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> CoreResult<Option<fault_tree_nodes::Model>> {
        Ok(fault_tree_nodes::Entity::find_by_id(id.to_string())
            .filter(fault_tree_nodes::Column::AnalysisId.eq(self.analysis_id.as_str()))
            .one(conn)
            .await?)
    }

    async fn find_edge<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> CoreResult<Option<fault_tree_edges::Model>> {
        Ok(fault_tree_edges::Entity::find_by_id(id.to_string())
            .filter(fault_tree_edges::Column::AnalysisId.eq(self.analysis_id.as_str()))
            .one(conn)
            .await?)
    }

    /// `Ok(false)` when this analysis already holds `id`; a conflict when
    /// another analysis does.
    fn is_new_id(&self, entity: &str, id: &str, owner: Option<String>) -> CoreResult<bool> {
        match owner {
            Some(analysis_id) if analysis_id == self.analysis_id => Ok(false),
            Some(_) => Err(CoreError::conflict(format!(
                "{} id {} is already used by another analysis",
                entity, id
            ))),
            None => Ok(true),
        }
    }

    pub async fn fetch_graph(&self) -> CoreResult<GraphSnapshot> {
        let nodes = fault_tree_nodes::Entity::find()
            .filter(fault_tree_nodes::Column::AnalysisId.eq(self.analysis_id.as_str()))
            .order_by_asc(fault_tree_nodes::Column::CreatedAt)
            .order_by_asc(fault_tree_nodes::Column::Id)
            .all(&self.db)
            .await?;

        let edges = fault_tree_edges::Entity::find()
            .filter(fault_tree_edges::Column::AnalysisId.eq(self.analysis_id.as_str()))
            .order_by_asc(fault_tree_edges::Column::CreatedAt)
            .order_by_asc(fault_tree_edges::Column::Id)
            .all(&self.db)
            .await?;

        Ok(GraphSnapshot {
            nodes: nodes.into_iter().map(FaultTreeNode::from).collect(),
            edges: edges.into_iter().map(FaultTreeEdge::from).collect(),
        })
    }

    /// Creates a node under its client-generated id. Repeating the call for
    /// an id this analysis already holds is a no-op.
    pub async fn create_node(&self, node: &FaultTreeNode) -> CoreResult<String> {
        let id = ValidationService::validate_entity_id(&node.id)
            .map_err(|e| CoreError::validation(e.to_string()))?;
        let label = ValidationService::validate_label(&node.label)
            .map_err(|e| CoreError::validation(e.to_string()))?;
        let position = ValidationService::validate_position(node.position)
            .map_err(|e| CoreError::validation(e.to_string()))?;
        ValidationService::validate_metadata(&node.metadata)
            .map_err(|e| CoreError::validation(e.to_string()))?;

        let txn = self.db.begin().await?;

        let owner = fault_tree_nodes::Entity::find_by_id(id.clone())
            .one(&txn)
            .await?
            .map(|existing| existing.analysis_id);
        if !self.is_new_id("Node", &id, owner)? {
            debug!("Node {} already exists, treating create as a repeat", id);
            return Ok(id);
        }

        let now = Utc::now();
        let model = fault_tree_nodes::ActiveModel {
            id: Set(id.clone()),
            analysis_id: Set(self.analysis_id.clone()),
            node_type: Set(node.node_type.as_storage_name().to_string()),
            label: Set(label.clone()),
            position_x: Set(position.x),
            position_y: Set(position.y),
            metadata_json: Set(encode_metadata(&node.metadata)?),
            collapsed: Set(node.collapsed),
            created_at: Set(now),
            updated_at: Set(now),
        };
        model.insert(&txn).await?;
        self.bump_analysis_version(&txn).await?;
        txn.commit().await?;

        info!("Created node {} in analysis {}", id, self.analysis_id);
        let stored = FaultTreeNode {
            label,
            position,
            ..node.clone()
        };
        self.publish(vec![EntityChange::Upserted {
            entity: EntitySnapshot::Node(stored),
        }])
        .await;
        Ok(id)
    }

    /// Creates an edge; both endpoints must already exist in this analysis.
    pub async fn create_edge(&self, edge: &FaultTreeEdge) -> CoreResult<String> {
        let id = ValidationService::validate_entity_id(&edge.id)
            .map_err(|e| CoreError::validation(e.to_string()))?;
        ValidationService::validate_metadata(&edge.metadata)
            .map_err(|e| CoreError::validation(e.to_string()))?;
        if edge.source == edge.target {
            return Err(CoreError::validation(format!(
                "Edge {} connects node {} to itself",
                id, edge.source
            )));
        }

        let txn = self.db.begin().await?;

        let owner = fault_tree_edges::Entity::find_by_id(id.clone())
            .one(&txn)
            .await?
            .map(|existing| existing.analysis_id);
        if !self.is_new_id("Edge", &id, owner)? {
            debug!("Edge {} already exists, treating create as a repeat", id);
            return Ok(id);
        }

        for endpoint in [&edge.source, &edge.target] {
            if self.find_node(&txn, endpoint).await?.is_none() {
                return Err(CoreError::validation(format!(
                    "Edge {} references unknown node {}",
                    id, endpoint
                )));
            }
        }

        let now = Utc::now();
        let model = fault_tree_edges::ActiveModel {
            id: Set(id.clone()),
            analysis_id: Set(self.analysis_id.clone()),
            source_node_id: Set(edge.source.clone()),
            target_node_id: Set(edge.target.clone()),
            gate_type: Set(edge.gate.as_storage_name().to_string()),
            metadata_json: Set(encode_metadata(&edge.metadata)?),
            created_at: Set(now),
            updated_at: Set(now),
        };
        model.insert(&txn).await?;
        self.bump_analysis_version(&txn).await?;
        txn.commit().await?;

        info!("Created edge {} in analysis {}", id, self.analysis_id);
        self.publish(vec![EntityChange::Upserted {
            entity: EntitySnapshot::Edge(edge.clone()),
        }])
        .await;
        Ok(id)
    }

    /// Deletes a node and every edge touching it. Deleting a node that is
    /// already gone succeeds without touching the version.
    pub async fn delete_node(&self, id: &str) -> CoreResult<()> {
        let txn = self.db.begin().await?;

        if self.find_node(&txn, id).await?.is_none() {
            debug!("Node {} already deleted", id);
            return Ok(());
        }

        let incident = fault_tree_edges::Entity::find()
            .filter(fault_tree_edges::Column::AnalysisId.eq(self.analysis_id.as_str()))
            .filter(
                fault_tree_edges::Column::SourceNodeId
                    .eq(id)
                    .or(fault_tree_edges::Column::TargetNodeId.eq(id)),
            )
            .all(&txn)
            .await?;

        fault_tree_edges::Entity::delete_many()
            .filter(fault_tree_edges::Column::AnalysisId.eq(self.analysis_id.as_str()))
            .filter(
                fault_tree_edges::Column::SourceNodeId
                    .eq(id)
                    .or(fault_tree_edges::Column::TargetNodeId.eq(id)),
            )
            .exec(&txn)
            .await?;

        fault_tree_nodes::Entity::delete_by_id(id.to_string())
            .exec(&txn)
            .await?;
        self.bump_analysis_version(&txn).await?;
        txn.commit().await?;

        info!(
            "Deleted node {} and {} connected edges from analysis {}",
            id,
            incident.len(),
            self.analysis_id
        );
        let mut changes: Vec<EntityChange> = incident
            .into_iter()
            .map(|edge| EntityChange::Deleted {
                kind: EntityKind::Edge,
                id: edge.id,
            })
            .collect();
        changes.push(EntityChange::Deleted {
            kind: EntityKind::Node,
            id: id.to_string(),
        });
        self.publish(changes).await;
        Ok(())
    }

    pub async fn delete_edge(&self, id: &str) -> CoreResult<()> {
        let txn = self.db.begin().await?;

        if self.find_edge(&txn, id).await?.is_none() {
            debug!("Edge {} already deleted", id);
            return Ok(());
        }

        fault_tree_edges::Entity::delete_by_id(id.to_string())
            .exec(&txn)
            .await?;
        self.bump_analysis_version(&txn).await?;
        txn.commit().await?;

        self.publish(vec![EntityChange::Deleted {
            kind: EntityKind::Edge,
            id: id.to_string(),
        }])
        .await;
        Ok(())
    }

    /// Writes only the fields present in `fields`.
    pub async fn update_node(&self, id: &str, fields: &NodeFields) -> CoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let label = fields
            .label
            .as_deref()
            .map(ValidationService::validate_label)
            .transpose()
            .map_err(|e| CoreError::validation(e.to_string()))?;
        let metadata = fields
            .metadata
            .as_ref()
            .map(|metadata| {
                ValidationService::validate_metadata(metadata)
                    .map_err(|e| CoreError::validation(e.to_string()))?;
                encode_metadata(metadata)
            })
            .transpose()?;

        let txn = self.db.begin().await?;
        let node = self
            .find_node(&txn, id)
            .await?
            .ok_or_else(|| CoreError::not_found("Node", id))?;

        let mut node_active: fault_tree_nodes::ActiveModel = node.into();
        if let Some(label) = &label {
            node_active.label = Set(label.clone());
        }
        if let Some(node_type) = fields.node_type {
            node_active.node_type = Set(node_type.as_storage_name().to_string());
        }
        if let Some(metadata_json) = metadata {
            node_active.metadata_json = Set(metadata_json);
        }
        if let Some(collapsed) = fields.collapsed {
            node_active.collapsed = Set(collapsed);
        }
        node_active.updated_at = Set(Utc::now());
        node_active.update(&txn).await?;
        self.bump_analysis_version(&txn).await?;
        txn.commit().await?;

        let mut published = fields.clone();
        if label.is_some() {
            published.label = label;
        }
        self.publish(vec![EntityChange::Patched {
            id: id.to_string(),
            patch: EntityPatch::Node(published),
        }])
        .await;
        Ok(())
    }

    pub async fn update_edge(&self, id: &str, fields: &EdgeFields) -> CoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let metadata = fields
            .metadata
            .as_ref()
            .map(|metadata| {
                ValidationService::validate_metadata(metadata)
                    .map_err(|e| CoreError::validation(e.to_string()))?;
                encode_metadata(metadata)
            })
            .transpose()?;

        let txn = self.db.begin().await?;
        let edge = self
            .find_edge(&txn, id)
            .await?
            .ok_or_else(|| CoreError::not_found("Edge", id))?;

        let mut edge_active: fault_tree_edges::ActiveModel = edge.into();
        if let Some(gate) = fields.gate {
            edge_active.gate_type = Set(gate.as_storage_name().to_string());
        }
        if let Some(metadata_json) = metadata {
            edge_active.metadata_json = Set(metadata_json);
        }
        edge_active.updated_at = Set(Utc::now());
        edge_active.update(&txn).await?;
        self.bump_analysis_version(&txn).await?;
        txn.commit().await?;

        self.publish(vec![EntityChange::Patched {
            id: id.to_string(),
            patch: EntityPatch::Edge(fields.clone()),
        }])
        .await;
        Ok(())
    }

    pub async fn move_node(&self, id: &str, position: Position) -> CoreResult<()> {
        self.move_nodes(&[(id.to_string(), position)]).await
    }

    /// Moves every node or none of them.
    pub async fn move_nodes(&self, moves: &[(String, Position)]) -> CoreResult<()> {
        if moves.is_empty() {
            return Ok(());
        }
        for (_, position) in moves {
            ValidationService::validate_position(*position)
                .map_err(|e| CoreError::validation(e.to_string()))?;
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();
        for (id, position) in moves {
            let node = self
                .find_node(&txn, id)
                .await?
                .ok_or_else(|| CoreError::not_found("Node", id))?;

            let mut node_active: fault_tree_nodes::ActiveModel = node.into();
            node_active.position_x = Set(position.x);
            node_active.position_y = Set(position.y);
            node_active.updated_at = Set(now);
            node_active.update(&txn).await?;
        }
        self.bump_analysis_version(&txn).await?;
        txn.commit().await?;

        debug!("Moved {} nodes in analysis {}", moves.len(), self.analysis_id);
        self.publish(
            moves
                .iter()
                .map(|(id, position)| EntityChange::Moved {
                    id: id.clone(),
                    position: *position,
                })
                .collect(),
        )
        .await;
        Ok(())
    }
}

fn encode_metadata(metadata: &Value) -> CoreResult<String> {
    serde_json::to_string(metadata)
        .map_err(|e| CoreError::internal(format!("Failed to encode metadata: {}", e)))
}

#[async_trait]
impl RemoteStore for FaultTreeService {
    async fn create_entity(&self, entity: &EntitySnapshot) -> CoreResult<String> {
        match entity {
            EntitySnapshot::Node(node) => self.create_node(node).await,
            EntitySnapshot::Edge(edge) => self.create_edge(edge).await,
        }
    }

    async fn delete_entity(&self, kind: EntityKind, id: &str) -> CoreResult<()> {
        match kind {
            EntityKind::Node => self.delete_node(id).await,
            EntityKind::Edge => self.delete_edge(id).await,
        }
    }

    async fn update_entity(&self, id: &str, patch: &EntityPatch) -> CoreResult<()> {
        match patch {
            EntityPatch::Node(fields) => self.update_node(id, fields).await,
            EntityPatch::Edge(fields) => self.update_edge(id, fields).await,
        }
    }

    async fn move_entity(&self, id: &str, position: Position) -> CoreResult<()> {
        self.move_node(id, position).await
    }

    async fn move_entities(&self, moves: &[(String, Position)]) -> CoreResult<()> {
        self.move_nodes(moves).await
    }

    async fn fetch_graph(&self) -> CoreResult<GraphSnapshot> {
        FaultTreeService::fetch_graph(self).await
    }
}
