use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Analyses::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Analyses::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Analyses::Name).string().not_null())
                    .col(ColumnDef::new(Analyses::Description).text())
                    .col(ColumnDef::new(Analyses::Version).integer().not_null().default(0))
                    .col(ColumnDef::new(Analyses::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Analyses::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FaultTreeNodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FaultTreeNodes::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FaultTreeNodes::AnalysisId).string().not_null())
                    .col(ColumnDef::new(FaultTreeNodes::NodeType).string().not_null())
                    .col(ColumnDef::new(FaultTreeNodes::Label).string().not_null())
                    .col(ColumnDef::new(FaultTreeNodes::PositionX).double().not_null())
                    .col(ColumnDef::new(FaultTreeNodes::PositionY).double().not_null())
                    .col(
                        ColumnDef::new(FaultTreeNodes::MetadataJson)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(FaultTreeNodes::Collapsed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(FaultTreeNodes::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(FaultTreeNodes::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_fault_tree_nodes_analysis_id")
                            .from(FaultTreeNodes::Table, FaultTreeNodes::AnalysisId)
                            .to(Analyses::Table, Analyses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FaultTreeEdges::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FaultTreeEdges::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FaultTreeEdges::AnalysisId).string().not_null())
                    .col(ColumnDef::new(FaultTreeEdges::SourceNodeId).string().not_null())
                    .col(ColumnDef::new(FaultTreeEdges::TargetNodeId).string().not_null())
                    .col(
                        ColumnDef::new(FaultTreeEdges::GateType)
                            .string()
                            .not_null()
                            .default("or"),
                    )
                    .col(
                        ColumnDef::new(FaultTreeEdges::MetadataJson)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(ColumnDef::new(FaultTreeEdges::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(FaultTreeEdges::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_fault_tree_edges_analysis_id")
                            .from(FaultTreeEdges::Table, FaultTreeEdges::AnalysisId)
                            .to(Analyses::Table, Analyses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fault_tree_nodes_analysis_id")
                    .table(FaultTreeNodes::Table)
                    .col(FaultTreeNodes::AnalysisId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fault_tree_edges_analysis_id")
                    .table(FaultTreeEdges::Table)
                    .col(FaultTreeEdges::AnalysisId)
                    .to_owned(),
            )
            .await?;

        // Cascading node deletes look edges up by either endpoint.
        manager
            .create_index(
                Index::create()
                    .name("idx_fault_tree_edges_source")
                    .table(FaultTreeEdges::Table)
                    .col(FaultTreeEdges::SourceNodeId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fault_tree_edges_target")
                    .table(FaultTreeEdges::Table)
                    .col(FaultTreeEdges::TargetNodeId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FaultTreeEdges::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FaultTreeNodes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Analyses::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Analyses {
    Table,
    Id,
    Name,
    Description,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FaultTreeNodes {
    Table,
    Id,
    AnalysisId,
    NodeType,
    Label,
    PositionX,
    PositionY,
    MetadataJson,
    Collapsed,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FaultTreeEdges {
    Table,
    Id,
    AnalysisId,
    SourceNodeId,
    TargetNodeId,
    GateType,
    MetadataJson,
    CreatedAt,
    UpdatedAt,
}
