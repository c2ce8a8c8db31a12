use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One fault-tree analysis; `version` is bumped on every graph mutation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analyses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: i32,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::fault_tree_nodes::Entity")]
    FaultTreeNodes,
    #[sea_orm(has_many = "super::fault_tree_edges::Entity")]
    FaultTreeEdges,
}

impl Related<super::fault_tree_nodes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FaultTreeNodes.def()
    }
}

impl Related<super::fault_tree_edges::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FaultTreeEdges.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
