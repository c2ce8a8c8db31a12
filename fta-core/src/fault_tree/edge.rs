use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::entities::fault_tree_edges;

use super::node::empty_metadata;
use super::GateType;

// Fault tree edge snapshot; `source` is the parent event, `target` the cause
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultTreeEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub gate: GateType,
    #[serde(default = "empty_metadata")]
    pub metadata: Value,
}

impl FaultTreeEdge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            gate: GateType::default(),
            metadata: empty_metadata(),
        }
    }

    pub fn with_gate(mut self, gate: GateType) -> Self {
        self.gate = gate;
        self
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

impl From<fault_tree_edges::Model> for FaultTreeEdge {
    fn from(model: fault_tree_edges::Model) -> Self {
        let metadata = serde_json::from_str(&model.metadata_json).unwrap_or_else(|_| empty_metadata());

        Self {
            id: model.id,
            source: model.source_node_id,
            target: model.target_node_id,
            gate: GateType::from_storage_name(&model.gate_type),
            metadata,
        }
    }
}
