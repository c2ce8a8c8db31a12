pub mod edge;
pub mod fields;
pub mod node;
pub mod position;
pub mod risk;

pub use edge::*;
pub use fields::*;
pub use node::*;
pub use position::*;
pub use risk::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Fault tree event types (matching canvas node type names)
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub enum FaultTreeNodeType {
    #[serde(rename = "TopEventNode", alias = "TopEvent")]
    TopEvent,
    #[serde(rename = "IntermediateEventNode", alias = "IntermediateEvent")]
    IntermediateEvent,
    #[default]
    #[serde(rename = "BasicEventNode", alias = "BasicEvent")]
    BasicEvent,
    #[serde(rename = "UndevelopedEventNode", alias = "UndevelopedEvent")]
    UndevelopedEvent,
    #[serde(rename = "ConditioningEventNode", alias = "ConditioningEvent")]
    ConditioningEvent,
}

impl FaultTreeNodeType {
    pub fn as_storage_name(&self) -> &'static str {
        match self {
            FaultTreeNodeType::TopEvent => "TopEventNode",
            FaultTreeNodeType::IntermediateEvent => "IntermediateEventNode",
            FaultTreeNodeType::BasicEvent => "BasicEventNode",
            FaultTreeNodeType::UndevelopedEvent => "UndevelopedEventNode",
            FaultTreeNodeType::ConditioningEvent => "ConditioningEventNode",
        }
    }

    /// Unknown names fall back to a basic event.
    pub fn from_storage_name(name: &str) -> Self {
        match name {
            "TopEventNode" | "TopEvent" => FaultTreeNodeType::TopEvent,
            "IntermediateEventNode" | "IntermediateEvent" => FaultTreeNodeType::IntermediateEvent,
            "UndevelopedEventNode" | "UndevelopedEvent" => FaultTreeNodeType::UndevelopedEvent,
            "ConditioningEventNode" | "ConditioningEvent" => FaultTreeNodeType::ConditioningEvent,
            _ => FaultTreeNodeType::BasicEvent,
        }
    }
}

// Logic gate joining a parent event to its causes
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateType {
    And,
    #[default]
    Or,
    Xor,
    Inhibit,
    PriorityAnd,
}

impl GateType {
    pub fn as_storage_name(&self) -> &'static str {
        match self {
            GateType::And => "and",
            GateType::Or => "or",
            GateType::Xor => "xor",
            GateType::Inhibit => "inhibit",
            GateType::PriorityAnd => "priority_and",
        }
    }

    pub fn from_storage_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "and" => GateType::And,
            "xor" => GateType::Xor,
            "inhibit" => GateType::Inhibit,
            "priority_and" => GateType::PriorityAnd,
            _ => GateType::Or,
        }
    }
}

/// Full node/edge graph of one analysis
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<FaultTreeNode>,
    pub edges: Vec<FaultTreeEdge>,
}

fn short_uuid() -> String {
    Uuid::new_v4().simple().to_string().chars().take(12).collect()
}

/// Client-generated node id, so retried creates stay idempotent.
pub fn new_node_id() -> String {
    format!("node_{}", short_uuid())
}

pub fn new_edge_id() -> String {
    format!("edge_{}", short_uuid())
}
