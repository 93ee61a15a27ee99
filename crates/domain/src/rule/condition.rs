//! Condition — a typed guard that must hold for a rule to fire.
//!
//! Comparisons dispatch on the field's declared type in the registry,
//! never on raw string equality. All conditions in a rule must be
//! satisfied (logical AND); a failing condition is not an error.

use serde::{Deserialize, Serialize};

use crate::entity::EntitySnapshot;
use crate::error::EvaluationError;
use crate::field::{FieldRegistry, FieldType, FieldValue};

/// The fixed comparison operator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    In,
    Contains,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equals => f.write_str("equals"),
            Self::NotEquals => f.write_str("not_equals"),
            Self::GreaterThan => f.write_str("greater_than"),
            Self::LessThan => f.write_str("less_than"),
            Self::In => f.write_str("in"),
            Self::Contains => f.write_str("contains"),
        }
    }
}

/// A predicate over one entity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: FieldValue,
}

impl Condition {
    /// Evaluate against a snapshot, using the registry's declared type.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::UnknownField`] when the field is not
    /// declared, or [`EvaluationError::TypeMismatch`] when either side
    /// cannot be read as the declared type.
    pub fn evaluate(
        &self,
        snapshot: &EntitySnapshot,
        registry: &FieldRegistry,
    ) -> Result<bool, EvaluationError> {
        let def = registry
            .definition(snapshot.model, &self.field)
            .ok_or_else(|| EvaluationError::UnknownField {
                field: self.field.clone(),
            })?;
        let actual = def.normalize(snapshot.field(&self.field))?;

        match self.operator {
            Operator::Equals => Ok(actual == def.normalize(&self.value)?),
            Operator::NotEquals => Ok(actual != def.normalize(&self.value)?),
            Operator::GreaterThan => {
                let expected = def.normalize(&self.value)?;
                Ok(compare(&actual, &expected, def.field_type, &self.field)?
                    .is_some_and(std::cmp::Ordering::is_gt))
            }
            Operator::LessThan => {
                let expected = def.normalize(&self.value)?;
                Ok(compare(&actual, &expected, def.field_type, &self.field)?
                    .is_some_and(std::cmp::Ordering::is_lt))
            }
            Operator::In => {
                let FieldValue::List(members) = &self.value else {
                    return Err(EvaluationError::TypeMismatch {
                        field: self.field.clone(),
                        expected: def.field_type,
                    });
                };
                for member in members {
                    if actual == def.normalize(member)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Operator::Contains => match (&actual, &self.value) {
                (FieldValue::Text(haystack), FieldValue::Text(needle)) => {
                    Ok(haystack.contains(needle.as_str()))
                }
                (FieldValue::Null, _) => Ok(false),
                _ => Err(EvaluationError::TypeMismatch {
                    field: self.field.clone(),
                    expected: FieldType::Text,
                }),
            },
        }
    }
}

/// Ordering comparison for the declared type; `None` when either side is
/// unset (an unset field is neither greater nor less than anything).
fn compare(
    actual: &FieldValue,
    expected: &FieldValue,
    declared: FieldType,
    field: &str,
) -> Result<Option<std::cmp::Ordering>, EvaluationError> {
    if actual.is_empty() || expected.is_empty() {
        return Ok(None);
    }
    let ordering = match (actual, expected) {
        (FieldValue::Number(a), FieldValue::Number(b)) => a.partial_cmp(b),
        (FieldValue::Date(a), FieldValue::Date(b)) => Some(a.cmp(b)),
        (FieldValue::DateTime(a), FieldValue::DateTime(b)) => Some(a.cmp(b)),
        (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
        _ => {
            return Err(EvaluationError::TypeMismatch {
                field: field.to_string(),
                expected: declared,
            });
        }
    };
    Ok(ordering)
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}
