use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::edge::FaultTreeEdge;
use super::node::FaultTreeNode;
use super::{FaultTreeNodeType, GateType};

/// Partial set of node fields carried by update commands.
///
/// `None` means "field not part of this update"; position changes travel
/// through move commands instead.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<FaultTreeNodeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
}

impl NodeFields {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_node_type(mut self, node_type: FaultTreeNodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = Some(collapsed);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.node_type.is_none()
            && self.metadata.is_none()
            && self.collapsed.is_none()
    }

    pub fn apply_to(&self, node: &mut FaultTreeNode) {
        if let Some(label) = &self.label {
            node.label = label.clone();
        }
        if let Some(node_type) = self.node_type {
            node.node_type = node_type;
        }
        if let Some(metadata) = &self.metadata {
            node.metadata = metadata.clone();
        }
        if let Some(collapsed) = self.collapsed {
            node.collapsed = collapsed;
        }
    }

    /// The node's current values for exactly the fields present in `self`.
    pub fn capture_from(&self, node: &FaultTreeNode) -> NodeFields {
        NodeFields {
            label: self.label.as_ref().map(|_| node.label.clone()),
            node_type: self.node_type.map(|_| node.node_type),
            metadata: self.metadata.as_ref().map(|_| node.metadata.clone()),
            collapsed: self.collapsed.map(|_| node.collapsed),
        }
    }
}

/// Partial set of edge fields for remote edge updates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl EdgeFields {
    pub fn is_empty(&self) -> bool {
        self.gate.is_none() && self.metadata.is_none()
    }

    pub fn apply_to(&self, edge: &mut FaultTreeEdge) {
        if let Some(gate) = self.gate {
            edge.gate = gate;
        }
        if let Some(metadata) = &self.metadata {
            edge.metadata = metadata.clone();
        }
    }
}
