//! Per-entity change notifications for collaborators editing the same analysis.
//!
//! Writers publish a [`ChangeEvent`] for each entity they touch instead of an
//! "everything changed" signal, so subscribers patch their local copy in
//! place.

pub mod channel;

pub use channel::ChangeFeed;

use serde::{Deserialize, Serialize};

use crate::fault_tree::Position;
use crate::sync::{EntityKey, EntityKind, EntityPatch, EntitySnapshot};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityChange {
    Upserted { entity: EntitySnapshot },
    Patched { id: String, patch: EntityPatch },
    Moved { id: String, position: Position },
    Deleted { kind: EntityKind, id: String },
}

impl EntityChange {
    pub fn key(&self) -> EntityKey {
        match self {
            EntityChange::Upserted { entity } => entity.key(),
            EntityChange::Patched { id, patch } => EntityKey {
                kind: patch.kind(),
                id: id.clone(),
            },
            EntityChange::Moved { id, .. } => EntityKey::node(id),
            EntityChange::Deleted { kind, id } => EntityKey {
                kind: *kind,
                id: id.clone(),
            },
        }
    }
}

/// One change to one entity of an analysis, tagged with the writing client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub analysis_id: String,
    pub origin: String,
    pub change: EntityChange,
}

impl ChangeEvent {
    pub fn new(analysis_id: impl Into<String>, origin: impl Into<String>, change: EntityChange) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            origin: origin.into(),
            change,
        }
    }
}
