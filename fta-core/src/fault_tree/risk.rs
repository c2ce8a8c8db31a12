use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{GraphError, GraphResult};

/// Metadata key under which a node's risk scores are stored
pub const RISK_METADATA_KEY: &str = "risk";

const MIN_SCORE: u8 = 1;
const MAX_SCORE: u8 = 10;

/// Severity / Occurrence / Detection scores attached to a failure mode.
///
/// Each score is on the usual 1–10 FMEA scale. The Risk Priority Number is
/// their product and therefore ranges from 1 to 1000.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    pub severity: u8,
    pub occurrence: u8,
    pub detection: u8,
}

impl RiskScore {
    pub fn new(severity: u8, occurrence: u8, detection: u8) -> GraphResult<Self> {
        for (name, score) in [
            ("severity", severity),
            ("occurrence", occurrence),
            ("detection", detection),
        ] {
            if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
                return Err(GraphError::Validation(format!(
                    "{} score {} is outside {}..={}",
                    name, score, MIN_SCORE, MAX_SCORE
                )));
            }
        }

        Ok(Self {
            severity,
            occurrence,
            detection,
        })
    }

    /// Risk Priority Number: Severity × Occurrence × Detection
    pub fn rpn(&self) -> u16 {
        u16::from(self.severity) * u16::from(self.occurrence) * u16::from(self.detection)
    }

    /// Read scores from free-form node metadata. Missing or out-of-range
    /// scores yield `None`.
    pub fn from_metadata(metadata: &Value) -> Option<Self> {
        let raw: RiskScore = serde_json::from_value(metadata.get(RISK_METADATA_KEY)?.clone()).ok()?;
        RiskScore::new(raw.severity, raw.occurrence, raw.detection).ok()
    }

    /// Write scores into node metadata, creating the metadata object if needed.
    pub fn write_to(&self, metadata: &mut Value) {
        if !metadata.is_object() {
            *metadata = Value::Object(Default::default());
        }
        if let Value::Object(map) = metadata {
            map.insert(
                RISK_METADATA_KEY.to_string(),
                serde_json::json!({
                    "severity": self.severity,
                    "occurrence": self.occurrence,
                    "detection": self.detection,
                }),
            );
        }
    }
}
