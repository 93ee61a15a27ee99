//! Field registry — per-model schema of field names, types, and validators.
//!
//! Built once from configuration and shared as an immutable snapshot per
//! evaluation. Nothing mutates a registry in place; a new configuration
//! version produces a new registry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entity::EntityModel;
use crate::error::{EvaluationError, ValidationError};
use crate::field::FieldValue;

/// Declared type of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Date,
    DateTime,
}

impl FieldType {
    /// Whether values of this type carry a calendar date.
    #[must_use]
    pub fn is_date(self) -> bool {
        matches!(self, Self::Date | Self::DateTime)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Number => f.write_str("number"),
            Self::Boolean => f.write_str("boolean"),
            Self::Date => f.write_str("date"),
            Self::DateTime => f.write_str("date_time"),
        }
    }
}

/// Schema entry for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
}

impl FieldDef {
    /// Define an optional field.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }

    /// Mark the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Coerce a raw value into this field's declared type.
    ///
    /// `Null` passes through. Text that parses as the declared type is
    /// converted (e.g. `"2024-05-01"` for a date field); anything else is
    /// a typed mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::TypeMismatch`] when the value cannot be
    /// read as the declared type.
    pub fn normalize(&self, value: &FieldValue) -> Result<FieldValue, EvaluationError> {
        if value.is_empty() {
            return Ok(FieldValue::Null);
        }
        let normalized = match self.field_type {
            FieldType::Text => match value {
                FieldValue::Text(text) => Some(FieldValue::Text(text.clone())),
                FieldValue::Number(_) | FieldValue::Boolean(_) => {
                    Some(FieldValue::Text(value.to_string()))
                }
                _ => None,
            },
            FieldType::Number => value.as_number().map(FieldValue::Number),
            FieldType::Boolean => value.as_boolean().map(FieldValue::Boolean),
            FieldType::Date => value.as_date().map(FieldValue::Date),
            FieldType::DateTime => value.as_datetime().map(FieldValue::DateTime),
        };
        normalized.ok_or_else(|| EvaluationError::TypeMismatch {
            field: self.name.clone(),
            expected: self.field_type,
        })
    }

    /// Check a value against the declared type without coercing it.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::TypeMismatch`] on failure.
    pub fn validate(&self, value: &FieldValue) -> Result<(), EvaluationError> {
        self.normalize(value).map(|_| ())
    }
}

/// Versioned, immutable per-model field schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRegistry {
    version: u32,
    fields: HashMap<EntityModel, HashMap<String, FieldDef>>,
}

impl FieldRegistry {
    /// Create a builder for constructing a [`FieldRegistry`].
    #[must_use]
    pub fn builder() -> FieldRegistryBuilder {
        FieldRegistryBuilder::default()
    }

    /// The configuration version this registry was built from.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Look up a field definition.
    #[must_use]
    pub fn definition(&self, model: EntityModel, field: &str) -> Option<&FieldDef> {
        self.fields.get(&model).and_then(|fields| fields.get(field))
    }

    /// Whether a field is declared for the model.
    #[must_use]
    pub fn contains(&self, model: EntityModel, field: &str) -> bool {
        self.definition(model, field).is_some()
    }

    /// Resolve a field definition, mapping absence to a validation error.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownField`] when the field is not
    /// declared for the model.
    pub fn require(&self, model: EntityModel, field: &str) -> Result<&FieldDef, ValidationError> {
        self.definition(model, field)
            .ok_or_else(|| ValidationError::UnknownField {
                model,
                field: field.to_string(),
            })
    }
}

/// Step-by-step builder for [`FieldRegistry`].
#[derive(Debug, Default)]
pub struct FieldRegistryBuilder {
    version: u32,
    fields: HashMap<EntityModel, HashMap<String, FieldDef>>,
}

impl FieldRegistryBuilder {
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn field(mut self, model: EntityModel, def: FieldDef) -> Self {
        self.fields
            .entry(model)
            .or_default()
            .insert(def.name.clone(), def);
        self
    }

    /// Consume the builder and return an immutable [`FieldRegistry`].
    #[must_use]
    pub fn build(self) -> FieldRegistry {
        FieldRegistry {
            version: self.version,
            fields: self.fields,
        }
    }
}
