use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::Value;

use crate::fault_tree::{Position, RiskScore, RISK_METADATA_KEY};

const MAX_ID_LEN: usize = 64;
const MAX_LABEL_LEN: usize = 200;
const MAX_COORDINATE: f64 = 1_000_000.0;

/// Input checks applied before anything is written to the database
pub struct ValidationService;

impl ValidationService {
    /// Sanitize and validate an analysis name
    pub fn validate_analysis_name(name: &str) -> Result<String> {
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(anyhow!("Analysis name cannot be empty"));
        }

        if trimmed.chars().count() > 100 {
            return Err(anyhow!("Analysis name is too long (max 100 characters)"));
        }

        let sanitized = trimmed
            .chars()
            .filter(|c| c.is_alphanumeric() || " -_().".contains(*c))
            .collect::<String>();

        if sanitized.is_empty() {
            return Err(anyhow!("Analysis name contains only invalid characters"));
        }

        Ok(sanitized)
    }

    pub fn validate_analysis_description(description: &str) -> Result<String> {
        let trimmed = description.trim();

        if trimmed.chars().count() > 1000 {
            return Err(anyhow!(
                "Analysis description is too long (max 1000 characters)"
            ));
        }

        Ok(trimmed.to_string())
    }

    /// Node and edge ids are client-generated; letters, digits, `_` and `-`
    pub fn validate_entity_id(id: &str) -> Result<String> {
        if id.is_empty() {
            return Err(anyhow!("Entity ID cannot be empty"));
        }

        if id.len() > MAX_ID_LEN {
            return Err(anyhow!(
                "Entity ID is too long (max {} characters)",
                MAX_ID_LEN
            ));
        }

        let regex = Regex::new(r"^[A-Za-z0-9_-]+$")
            .map_err(|e| anyhow!("Failed to compile entity ID regex: {}", e))?;
        if !regex.is_match(id) {
            return Err(anyhow!(
                "Entity ID can only contain letters, numbers, underscores and hyphens"
            ));
        }

        Ok(id.to_string())
    }

    /// Labels may be empty (a freshly dropped node) but not oversized.
    /// The text is stored as entered so the editor's copy matches.
    pub fn validate_label(label: &str) -> Result<String> {
        if label.trim().chars().count() > MAX_LABEL_LEN {
            return Err(anyhow!(
                "Label is too long (max {} characters)",
                MAX_LABEL_LEN
            ));
        }
        Ok(label.to_string())
    }

    pub fn validate_position(position: Position) -> Result<Position> {
        if !position.is_finite() {
            return Err(anyhow!("Position coordinates must be finite numbers"));
        }
        if position.x.abs() > MAX_COORDINATE || position.y.abs() > MAX_COORDINATE {
            return Err(anyhow!(
                "Position ({}, {}) is outside the canvas bounds",
                position.x,
                position.y
            ));
        }
        Ok(position)
    }

    /// Metadata must be a JSON object; a `risk` entry must hold valid scores
    pub fn validate_metadata(metadata: &Value) -> Result<()> {
        if !metadata.is_object() {
            return Err(anyhow!("Metadata must be a JSON object"));
        }
        if metadata.get(RISK_METADATA_KEY).is_some() && RiskScore::from_metadata(metadata).is_none() {
            return Err(anyhow!(
                "Risk scores must have severity, occurrence and detection between 1 and 10"
            ));
        }
        Ok(())
    }
}
