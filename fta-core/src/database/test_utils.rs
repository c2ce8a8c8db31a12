use sea_orm::{Database, DatabaseConnection};

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to test database");

    use sea_orm_migration::MigratorTrait;
    crate::database::migrations::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}
