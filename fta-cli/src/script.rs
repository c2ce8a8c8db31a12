use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use fta::fault_tree::{
    new_edge_id, FaultTreeEdge, FaultTreeNode, FaultTreeNodeType, GateType, NodeFields, Position,
};
use fta::sync::RemoteStore;
use fta::{EditSession, GraphResult, SyncReport};

/// One line of an edit script. Ids are chosen by the script author so later
/// steps can refer to earlier nodes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    AddNode {
        id: String,
        #[serde(default)]
        label: String,
        #[serde(default, rename = "type")]
        node_type: FaultTreeNodeType,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        metadata: Option<Value>,
    },
    DeleteNode {
        id: String,
    },
    UpdateNode {
        id: String,
        #[serde(default)]
        label: Option<String>,
        #[serde(default, rename = "type")]
        node_type: Option<FaultTreeNodeType>,
        #[serde(default)]
        metadata: Option<Value>,
        #[serde(default)]
        collapsed: Option<bool>,
    },
    MoveNode {
        id: String,
        x: f64,
        y: f64,
    },
    AddEdge {
        #[serde(default)]
        id: Option<String>,
        source: String,
        target: String,
        #[serde(default)]
        gate: GateType,
    },
    DeleteEdge {
        id: String,
    },
    BatchMove {
        moves: Vec<ScriptMove>,
    },
    Undo,
    Redo,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptMove {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// Reads a YAML or JSON list of steps; JSON is valid YAML so one parser covers both.
pub fn load_script(path: &Path) -> Result<Vec<ScriptStep>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&contents).with_context(|| format!("Failed to parse script {}", path.display()))
}

pub fn parse_script(contents: &str) -> Result<Vec<ScriptStep>> {
    Ok(serde_yaml::from_str(contents)?)
}

impl ScriptStep {
    /// Runs the step. History steps with nothing to undo or redo yield `Ok(None)`.
    pub async fn run<R: RemoteStore + ?Sized>(
        self,
        session: &mut EditSession<R>,
    ) -> GraphResult<Option<SyncReport>> {
        let report = match self {
            ScriptStep::AddNode {
                id,
                label,
                node_type,
                x,
                y,
                metadata,
            } => {
                let mut node = FaultTreeNode::new(id, label, Position::new(x, y)).with_type(node_type);
                if let Some(metadata) = metadata {
                    node = node.with_metadata(metadata);
                }
                session.add_node(node).await?
            }
            ScriptStep::DeleteNode { id } => session.delete_node(&id).await?,
            ScriptStep::UpdateNode {
                id,
                label,
                node_type,
                metadata,
                collapsed,
            } => {
                let fields = NodeFields {
                    label,
                    node_type,
                    metadata,
                    collapsed,
                };
                session.update_node(&id, fields).await?
            }
            ScriptStep::MoveNode { id, x, y } => session.move_node(&id, Position::new(x, y)).await?,
            ScriptStep::AddEdge {
                id,
                source,
                target,
                gate,
            } => {
                let id = id.unwrap_or_else(new_edge_id);
                session
                    .add_edge(FaultTreeEdge::new(id, source, target).with_gate(gate))
                    .await?
            }
            ScriptStep::DeleteEdge { id } => session.delete_edge(&id).await?,
            ScriptStep::BatchMove { moves } => {
                let moves = moves
                    .into_iter()
                    .map(|m| (m.id, Position::new(m.x, m.y)))
                    .collect();
                session.batch_move(moves).await?
            }
            ScriptStep::Undo => return Ok(session.undo().await),
            ScriptStep::Redo => return Ok(session.redo().await),
        };
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_script_parses() {
        let steps = parse_script(
            r#"
- op: add_node
  id: top
  label: Loss of cooling
  type: TopEvent
- op: add_node
  id: pump
  label: Pump failure
  x: 10
  y: 80
- op: add_edge
  source: top
  target: pump
  gate: and
- op: batch_move
  moves:
    - { id: top, x: 5, y: 5 }
- op: undo
"#,
        )
        .unwrap();

        assert_eq!(steps.len(), 5);
        assert!(matches!(
            &steps[0],
            ScriptStep::AddNode { node_type: FaultTreeNodeType::TopEvent, .. }
        ));
        assert!(matches!(&steps[2], ScriptStep::AddEdge { gate: GateType::And, id: None, .. }));
        assert_eq!(steps[4], ScriptStep::Undo);
    }

    #[test]
    fn test_json_script_parses() {
        let steps =
            parse_script(r#"[{"op": "move_node", "id": "n1", "x": 100, "y": 50}, {"op": "redo"}]"#)
                .unwrap();
        assert_eq!(
            steps[0],
            ScriptStep::MoveNode {
                id: "n1".to_string(),
                x: 100.0,
                y: 50.0
            }
        );
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        assert!(parse_script("- op: explode\n  id: n1").is_err());
    }
}
