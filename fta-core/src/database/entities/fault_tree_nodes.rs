use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fault_tree_nodes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub analysis_id: String,
    pub node_type: String,
    pub label: String,
    pub position_x: f64,
    pub position_y: f64,
    pub metadata_json: String,
    pub collapsed: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::analyses::Entity",
        from = "Column::AnalysisId",
        to = "super::analyses::Column::Id"
    )]
    Analyses,
}

impl Related<super::analyses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Analyses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
