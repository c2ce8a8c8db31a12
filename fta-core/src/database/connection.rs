use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::time::Duration;

pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url);

    // Every in-memory SQLite connection is its own database, so keep exactly one.
    let (max, min) = if database_url.contains(":memory:") {
        (1, 1)
    } else {
        (10, 1)
    };

    opt.max_connections(max)
        .min_connections(min)
        .connect_timeout(Duration::from_secs(5))
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    Database::connect(opt).await
}

pub fn get_database_url(database_path: Option<&str>) -> String {
    match database_path {
        Some(":memory:") => "sqlite::memory:".to_string(),
        Some(path) => format!("sqlite://{}?mode=rwc", path),
        None => "sqlite://fta.db?mode=rwc".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_urls() {
        assert_eq!(get_database_url(Some(":memory:")), "sqlite::memory:");
        assert_eq!(
            get_database_url(Some("/tmp/studio.db")),
            "sqlite:///tmp/studio.db?mode=rwc"
        );
        assert_eq!(get_database_url(None), "sqlite://fta.db?mode=rwc");
    }
}
