//! Entity — an opaque domain record identified by `(model, id)`.
//!
//! The engine never owns entity persistence; it consumes immutable
//! snapshots of the field map taken at mutation time and writes single
//! fields back through a gateway port.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::field::FieldValue;
use crate::id::EntityId;

/// The kind of domain record a rule or link applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityModel {
    Lead,
    Project,
    Quote,
}

impl std::fmt::Display for EntityModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lead => f.write_str("lead"),
            Self::Project => f.write_str("project"),
            Self::Quote => f.write_str("quote"),
        }
    }
}

impl std::str::FromStr for EntityModel {
    type Err = UnknownModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lead" => Ok(Self::Lead),
            "project" => Ok(Self::Project),
            "quote" => Ok(Self::Quote),
            other => Err(UnknownModelError {
                model: other.to_string(),
            }),
        }
    }
}

/// Parse failure for [`EntityModel`].
#[derive(Debug, thiserror::Error)]
#[error("unknown entity model: {model}")]
pub struct UnknownModelError {
    pub model: String,
}

/// Identity of a domain record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub model: EntityModel,
    pub entity_id: EntityId,
}

impl EntityRef {
    #[must_use]
    pub fn new(model: EntityModel, entity_id: EntityId) -> Self {
        Self { model, entity_id }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.model, self.entity_id)
    }
}

/// Immutable view of an entity's field map at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub model: EntityModel,
    pub entity_id: EntityId,
    pub fields: HashMap<String, FieldValue>,
}

impl EntitySnapshot {
    /// Create an empty snapshot for the given record.
    #[must_use]
    pub fn new(model: EntityModel, entity_id: EntityId) -> Self {
        Self {
            model,
            entity_id,
            fields: HashMap::new(),
        }
    }

    /// Add a field value (builder-style, used heavily in tests and seeds).
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Read a field value; absent fields read as [`FieldValue::Null`].
    #[must_use]
    pub fn field(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Null)
    }

    /// The record identity this snapshot was taken from.
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.model, self.entity_id)
    }
}
