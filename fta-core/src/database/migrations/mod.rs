pub use sea_orm_migration::prelude::*;

use tracing::info;

mod m20260301_000001_create_fault_tree_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260301_000001_create_fault_tree_tables::Migration)]
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MigrateDirection {
    Up,
    Down,
    Fresh,
}

pub async fn run_migrations(
    db: &sea_orm::DatabaseConnection,
    direction: MigrateDirection,
) -> Result<(), DbErr> {
    match direction {
        MigrateDirection::Up => {
            info!("Running migrations up");
            Migrator::up(db, None).await
        }
        MigrateDirection::Down => {
            info!("Rolling back last migration");
            Migrator::down(db, Some(1)).await
        }
        MigrateDirection::Fresh => {
            info!("Dropping all tables and re-running migrations");
            Migrator::fresh(db).await
        }
    }
}
