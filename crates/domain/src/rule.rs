//! Automation rules — trigger → conditions → create-task actions.
//!
//! Rules are authored externally and loaded as immutable versioned
//! snapshots. Validation happens at authoring time against the field
//! registry; an invalid rule never reaches evaluation.

mod action;
mod condition;
mod trigger;

pub use action::{CreateTaskAction, DueDateSpec, KeyTemplate};
pub use condition::{Condition, Operator};
pub use trigger::Trigger;

use serde::{Deserialize, Serialize};

use crate::error::{TaskflowError, ValidationError};
use crate::field::FieldRegistry;
use crate::id::RuleId;

/// A rule that reacts to entity mutations by materializing tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub name: String,
    pub enabled: bool,
    pub trigger: Trigger,
    pub conditions: Vec<Condition>,
    pub actions: Vec<CreateTaskAction>,
}

impl AutomationRule {
    /// Create a builder for constructing an [`AutomationRule`].
    #[must_use]
    pub fn builder() -> AutomationRuleBuilder {
        AutomationRuleBuilder::default()
    }

    /// Check domain invariants against the field registry.
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `actions` is empty ([`ValidationError::NoActions`])
    /// - the trigger, a condition, or an action references a field that
    ///   is not declared for the trigger's model, or an action's due-date
    ///   anchor is not date-typed
    pub fn validate(&self, registry: &FieldRegistry) -> Result<(), TaskflowError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.actions.is_empty() {
            return Err(ValidationError::NoActions.into());
        }
        let model = self.trigger.model();
        if let Trigger::FieldUpdated { field, .. } = &self.trigger {
            registry.require(model, field)?;
        }
        for condition in &self.conditions {
            registry.require(model, &condition.field)?;
        }
        for action in &self.actions {
            action.validate(model, registry)?;
        }
        Ok(())
    }
}

/// Step-by-step builder for [`AutomationRule`].
#[derive(Debug, Default)]
pub struct AutomationRuleBuilder {
    id: Option<RuleId>,
    name: Option<String>,
    enabled: Option<bool>,
    trigger: Option<Trigger>,
    conditions: Vec<Condition>,
    actions: Vec<CreateTaskAction>,
}

impl AutomationRuleBuilder {
    #[must_use]
    pub fn id(mut self, id: RuleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn action(mut self, action: CreateTaskAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Consume the builder, validate, and return an [`AutomationRule`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::Validation`] if required fields are
    /// missing, empty, or inconsistent with the registry.
    pub fn build(self, registry: &FieldRegistry) -> Result<AutomationRule, TaskflowError> {
        let trigger = self.trigger.ok_or(ValidationError::MissingTrigger)?;
        let rule = AutomationRule {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            trigger,
            conditions: self.conditions,
            actions: self.actions,
        };
        rule.validate(registry)?;
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityModel;
    use crate::field::{FieldDef, FieldType, FieldValue};
    use crate::task::TaskPriority;

    fn registry() -> FieldRegistry {
        FieldRegistry::builder()
            .field(EntityModel::Lead, FieldDef::new("status", FieldType::Text))
            .field(
                EntityModel::Lead,
                FieldDef::new("survey_date", FieldType::Date),
            )
            .build()
    }

    fn valid_action() -> CreateTaskAction {
        CreateTaskAction {
            title: "Book survey".to_string(),
            description: Some("Call the customer".to_string()),
            kind: "call".to_string(),
            priority: TaskPriority::Medium,
            assign_to: None,
            due: DueDateSpec::RelativeToField {
                field: "survey_date".to_string(),
                offset_days: -2,
            },
            reschedule_on_trigger_change: true,
            instance_key: KeyTemplate::new("book-survey:{entity}"),
            linked_field: None,
        }
    }

    fn valid_rule() -> AutomationRule {
        AutomationRule::builder()
            .name("Survey reminder")
            .trigger(Trigger::FieldUpdated {
                model: EntityModel::Lead,
                field: "survey_date".to_string(),
            })
            .action(valid_action())
            .build(&registry())
            .unwrap()
    }

    #[test]
    fn should_build_valid_rule_when_required_fields_provided() {
        let rule = valid_rule();
        assert_eq!(rule.name, "Survey reminder");
        assert!(rule.enabled);
        assert!(rule.conditions.is_empty());
        assert_eq!(rule.actions.len(), 1);
    }

    #[test]
    fn should_default_to_enabled_when_not_specified() {
        assert!(valid_rule().enabled);
    }

    #[test]
    fn should_build_disabled_rule_when_enabled_is_false() {
        let rule = AutomationRule::builder()
            .name("Disabled")
            .enabled(false)
            .trigger(Trigger::StatusChanged {
                model: EntityModel::Lead,
            })
            .action(valid_action())
            .build(&registry())
            .unwrap();
        assert!(!rule.enabled);
    }

    #[test]
    fn should_return_validation_error_when_name_is_empty() {
        let result = AutomationRule::builder()
            .trigger(Trigger::StatusChanged {
                model: EntityModel::Lead,
            })
            .action(valid_action())
            .build(&registry());
        assert!(matches!(
            result,
            Err(TaskflowError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_return_validation_error_when_actions_is_empty() {
        let result = AutomationRule::builder()
            .name("No actions")
            .trigger(Trigger::StatusChanged {
                model: EntityModel::Lead,
            })
            .build(&registry());
        assert!(matches!(
            result,
            Err(TaskflowError::Validation(ValidationError::NoActions))
        ));
    }

    #[test]
    fn should_reject_trigger_on_undeclared_field() {
        let result = AutomationRule::builder()
            .name("Bad trigger")
            .trigger(Trigger::FieldUpdated {
                model: EntityModel::Lead,
                field: "missing".to_string(),
            })
            .action(valid_action())
            .build(&registry());
        assert!(matches!(
            result,
            Err(TaskflowError::Validation(
                ValidationError::UnknownField { .. }
            ))
        ));
    }

    #[test]
    fn should_reject_condition_on_undeclared_field() {
        let result = AutomationRule::builder()
            .name("Bad condition")
            .trigger(Trigger::StatusChanged {
                model: EntityModel::Lead,
            })
            .condition(Condition {
                field: "missing".to_string(),
                operator: Operator::Equals,
                value: FieldValue::Null,
            })
            .action(valid_action())
            .build(&registry());
        assert!(matches!(
            result,
            Err(TaskflowError::Validation(
                ValidationError::UnknownField { .. }
            ))
        ));
    }

    #[test]
    fn should_accumulate_multiple_conditions_and_actions() {
        let rule = AutomationRule::builder()
            .name("Multi")
            .trigger(Trigger::StatusChanged {
                model: EntityModel::Lead,
            })
            .condition(Condition {
                field: "status".to_string(),
                operator: Operator::Equals,
                value: FieldValue::Text("won".to_string()),
            })
            .condition(Condition {
                field: "survey_date".to_string(),
                operator: Operator::NotEquals,
                value: FieldValue::Null,
            })
            .action(valid_action())
            .action(valid_action())
            .build(&registry())
            .unwrap();
        assert_eq!(rule.conditions.len(), 2);
        assert_eq!(rule.actions.len(), 2);
    }

    #[test]
    fn should_set_custom_id_via_builder() {
        let id = RuleId::new();
        let rule = AutomationRule::builder()
            .id(id)
            .name("Custom id")
            .trigger(Trigger::StatusChanged {
                model: EntityModel::Lead,
            })
            .action(valid_action())
            .build(&registry())
            .unwrap();
        assert_eq!(rule.id, id);
    }

    #[test]
    fn should_roundtrip_rule_through_serde_json() {
        let rule = valid_rule();
        let json = serde_json::to_string(&rule).unwrap();
        let parsed: AutomationRule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rule);
    }
}
