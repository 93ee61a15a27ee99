//! Field links — declarative two-way bindings between an entity field
//! and a task's completion state.
//!
//! The field→task direction is the completion condition: when the bound
//! field satisfies it, open tasks carrying the link are auto-completed.
//! The task→field direction is the write-back action applied whenever a
//! linked task transitions to done.

use serde::{Deserialize, Serialize};

use crate::entity::EntityModel;
use crate::error::{EvaluationError, TaskflowError, ValidationError};
use crate::field::{FieldDef, FieldRegistry, FieldType, FieldValue};
use crate::id::LinkId;
use crate::time::Timestamp;

/// When a field value counts as "done" for the linked task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionCondition {
    /// Any non-null, non-blank value.
    NonNull,
    /// Typed equality against a literal.
    Equals { value: FieldValue },
    /// The value parses as a valid calendar date.
    DateSet,
}

impl CompletionCondition {
    /// Evaluate against the field's new value.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::AmbiguousCondition`] when the condition
    /// kind contradicts the field's declared type (e.g. `DateSet` on a
    /// boolean field, or an `Equals` literal the field type cannot hold).
    pub fn is_met(&self, value: &FieldValue, def: &FieldDef) -> Result<bool, EvaluationError> {
        match self {
            Self::NonNull => Ok(!value.is_empty()),
            Self::Equals { value: expected } => {
                let expected =
                    def.normalize(expected)
                        .map_err(|_| EvaluationError::AmbiguousCondition {
                            field: def.name.clone(),
                            declared: def.field_type,
                        })?;
                match def.normalize(value) {
                    Ok(actual) => Ok(!actual.is_empty() && actual == expected),
                    // The stored value itself is malformed; not met.
                    Err(_) => Ok(false),
                }
            }
            Self::DateSet => {
                if !def.field_type.is_date() {
                    return Err(EvaluationError::AmbiguousCondition {
                        field: def.name.clone(),
                        declared: def.field_type,
                    });
                }
                Ok(value.as_date().is_some())
            }
        }
    }
}

impl std::fmt::Display for CompletionCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonNull => f.write_str("non_null"),
            Self::Equals { value } => write!(f, "equals({value})"),
            Self::DateSet => f.write_str("date_set"),
        }
    }
}

/// What completing the linked task writes back into the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteBackAction {
    /// Write the completion timestamp (as a date or datetime, per the
    /// field's declared type).
    SetNow,
    /// Write a literal value.
    SetValue { value: FieldValue },
    /// Write boolean `true`.
    SetTrue,
}

impl WriteBackAction {
    /// The value this action writes at `now`, shaped for the field type.
    #[must_use]
    pub fn value_at(&self, now: Timestamp, field_type: FieldType) -> FieldValue {
        match self {
            Self::SetNow => match field_type {
                FieldType::Date => FieldValue::Date(now.date_naive()),
                _ => FieldValue::DateTime(now),
            },
            Self::SetValue { value } => value.clone(),
            Self::SetTrue => FieldValue::Boolean(true),
        }
    }
}

impl std::fmt::Display for WriteBackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetNow => f.write_str("set_now"),
            Self::SetValue { value } => write!(f, "set_value({value})"),
            Self::SetTrue => f.write_str("set_true"),
        }
    }
}

/// A two-way binding between one entity field and task completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLink {
    pub id: LinkId,
    pub model: EntityModel,
    pub field_path: String,
    #[serde(default)]
    pub label: Option<String>,
    pub completion: CompletionCondition,
    pub on_complete: WriteBackAction,
}

impl FieldLink {
    /// Check the link against the field registry at authoring time.
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::Validation`] when the field is not
    /// declared for the model, a date-bound condition or write-back
    /// targets a non-date field, or `SetTrue` targets a non-boolean
    /// field.
    pub fn validate(&self, registry: &FieldRegistry) -> Result<(), TaskflowError> {
        let def = registry.require(self.model, &self.field_path)?;
        if matches!(self.completion, CompletionCondition::DateSet) && !def.field_type.is_date() {
            return Err(ValidationError::NotADateField {
                model: self.model,
                field: self.field_path.clone(),
            }
            .into());
        }
        match &self.on_complete {
            WriteBackAction::SetNow => {
                if !def.field_type.is_date() {
                    return Err(ValidationError::NotADateField {
                        model: self.model,
                        field: self.field_path.clone(),
                    }
                    .into());
                }
            }
            WriteBackAction::SetTrue => {
                if def.field_type != FieldType::Boolean {
                    return Err(ValidationError::IncompatibleWriteBack {
                        field: self.field_path.clone(),
                        declared: def.field_type,
                    }
                    .into());
                }
            }
            WriteBackAction::SetValue { value } => {
                def.validate(value)
                    .map_err(|_| ValidationError::IncompatibleWriteBack {
                        field: self.field_path.clone(),
                        declared: def.field_type,
                    })?;
            }
        }
        Ok(())
    }
}
