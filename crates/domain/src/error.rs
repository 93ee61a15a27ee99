//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts via `#[from]`.
//! Validation errors are rejected synchronously at authoring time;
//! evaluation errors are isolated per rule/link at runtime and never
//! abort processing of an event.

use crate::entity::EntityModel;
use crate::field::FieldType;

/// Top-level error for the taskflow engine.
#[derive(Debug, thiserror::Error)]
pub enum TaskflowError {
    /// A domain invariant or authoring-time check failed.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// A referenced record does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// A typed comparison or calculation failed during evaluation.
    #[error("evaluation error")]
    Evaluation(#[from] EvaluationError),

    /// An error bubbled up from a storage adapter.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Authoring-time failures: a rule, link, or task definition that must be
/// rejected before it ever reaches evaluation.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A rule or task was given an empty name/title.
    #[error("name must not be empty")]
    EmptyName,

    /// A rule was defined without any actions.
    #[error("rule must define at least one action")]
    NoActions,

    /// A rule was defined without a trigger.
    #[error("rule must define a trigger")]
    MissingTrigger,

    /// A referenced field is not declared in the registry for the model.
    #[error("unknown field `{field}` for model `{model}`")]
    UnknownField { model: EntityModel, field: String },

    /// A date anchor or date-bound link points at a non-date field.
    #[error("field `{field}` on model `{model}` is not date-typed")]
    NotADateField { model: EntityModel, field: String },

    /// A write-back action cannot produce a value of the field's type.
    #[error("write-back incompatible with field `{field}` declared as {declared}")]
    IncompatibleWriteBack { field: String, declared: FieldType },

    /// An instance-key template contained an unknown placeholder.
    #[error("unknown placeholder `{{{placeholder}}}` in instance key template")]
    UnknownPlaceholder { placeholder: String },

    /// An instance-key template rendered (or was authored) empty.
    #[error("instance key must not be empty")]
    EmptyInstanceKey,

    /// A task was built without a related entity.
    #[error("task must reference a related entity")]
    MissingRelated,

    /// Attempted to mutate a task already in a terminal state.
    #[error("task is already {status}")]
    TerminalTask { status: String },
}

/// A referenced record was not found.
#[derive(Debug, thiserror::Error)]
#[error("{entity} not found: {id}")]
pub struct NotFoundError {
    /// Human-readable record kind (e.g. `"Task"`).
    pub entity: &'static str,
    /// The identifier that failed to resolve.
    pub id: String,
}

/// Runtime evaluation failures, isolated per rule or link.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    /// A field referenced at evaluation time is missing from the registry.
    #[error("field `{field}` is not declared in the registry")]
    UnknownField { field: String },

    /// A value could not be read as the field's declared type.
    #[error("value of `{field}` does not match declared type {expected}")]
    TypeMismatch { field: String, expected: FieldType },

    /// A link's completion condition contradicts the field's declared type.
    #[error("completion condition is ambiguous for `{field}` declared as {declared}")]
    AmbiguousCondition { field: String, declared: FieldType },

    /// Calendar arithmetic left the representable date range.
    #[error("date offset out of range")]
    DateOverflow,
}
