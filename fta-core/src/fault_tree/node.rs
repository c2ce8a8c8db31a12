use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::entities::fault_tree_nodes;

use super::position::Position;
use super::risk::RiskScore;
use super::FaultTreeNodeType;

// Fault tree node snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultTreeNode {
    pub id: String,
    #[serde(default)]
    pub node_type: FaultTreeNodeType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "empty_metadata")]
    pub metadata: Value,
    #[serde(default)]
    pub collapsed: bool,
}

pub(crate) fn empty_metadata() -> Value {
    Value::Object(Default::default())
}

impl FaultTreeNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            node_type: FaultTreeNodeType::default(),
            label: label.into(),
            position,
            metadata: empty_metadata(),
            collapsed: false,
        }
    }

    pub fn with_type(mut self, node_type: FaultTreeNodeType) -> Self {
        self.node_type = node_type;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_risk(mut self, risk: RiskScore) -> Self {
        risk.write_to(&mut self.metadata);
        self
    }

    pub fn collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = collapsed;
        self
    }

    pub fn risk(&self) -> Option<RiskScore> {
        RiskScore::from_metadata(&self.metadata)
    }

    pub fn rpn(&self) -> Option<u16> {
        self.risk().map(|risk| risk.rpn())
    }
}

impl From<fault_tree_nodes::Model> for FaultTreeNode {
    fn from(model: fault_tree_nodes::Model) -> Self {
        let metadata = serde_json::from_str(&model.metadata_json).unwrap_or_else(|_| empty_metadata());

        Self {
            id: model.id,
            node_type: FaultTreeNodeType::from_storage_name(&model.node_type),
            label: model.label,
            position: Position {
                x: model.position_x,
                y: model.position_y,
            },
            metadata,
            collapsed: model.collapsed,
        }
    }
}
