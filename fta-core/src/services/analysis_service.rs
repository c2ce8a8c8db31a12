use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use tracing::info;
use uuid::Uuid;

use crate::database::entities::analyses;
use crate::errors::{CoreError, CoreResult};
use crate::services::ValidationService;

#[derive(Clone)]
pub struct AnalysisService {
    db: DatabaseConnection,
}

impl AnalysisService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create_analysis(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> CoreResult<analyses::Model> {
        let name = ValidationService::validate_analysis_name(name)
            .map_err(|e| CoreError::validation(e.to_string()))?;
        let description = description
            .map(ValidationService::validate_analysis_description)
            .transpose()
            .map_err(|e| CoreError::validation(e.to_string()))?
            .filter(|d| !d.is_empty());

        let now = Utc::now();
        let analysis = analyses::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            name: Set(name),
            description: Set(description),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = analysis
            .insert(&self.db)
            .await
            .map_err(|e| CoreError::internal(format!("Failed to create analysis: {}", e)))?;
        info!("Created analysis {} ({})", created.name, created.id);
        Ok(created)
    }

    pub async fn get_analysis(&self, id: &str) -> CoreResult<analyses::Model> {
        analyses::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| CoreError::not_found("Analysis", id))
    }

    /// All analyses, oldest first
    pub async fn list_analyses(&self) -> CoreResult<Vec<analyses::Model>> {
        Ok(analyses::Entity::find()
            .order_by_asc(analyses::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }
}
