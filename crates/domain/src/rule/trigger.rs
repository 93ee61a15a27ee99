//! Trigger — the mutation pattern that makes a rule eligible to evaluate.

use serde::{Deserialize, Serialize};

use crate::entity::EntityModel;
use crate::event::MutationEvent;

/// Describes which mutations a rule reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fires when a specific field of the model changes.
    FieldUpdated { model: EntityModel, field: String },
    /// Fires when an entity of the model transitions status.
    StatusChanged { model: EntityModel },
}

impl Trigger {
    /// The entity model this trigger watches.
    #[must_use]
    pub fn model(&self) -> EntityModel {
        match self {
            Self::FieldUpdated { model, .. } | Self::StatusChanged { model } => *model,
        }
    }

    /// Check whether this trigger matches a given mutation event.
    #[must_use]
    pub fn matches(&self, event: &MutationEvent) -> bool {
        if self.model() != event.model {
            return false;
        }
        match self {
            Self::FieldUpdated { field, .. } => event.changed(field),
            Self::StatusChanged { .. } => event.status_changed.is_some(),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FieldUpdated { model, field } => write!(f, "field_updated({model}.{field})"),
            Self::StatusChanged { model } => write!(f, "status_changed({model})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntitySnapshot;
    use crate::field::FieldValue;
    use crate::id::{EntityId, TenantId};

    fn field_event(model: EntityModel, field: &str) -> MutationEvent {
        MutationEvent::builder(TenantId::new(), EntitySnapshot::new(model, EntityId::new()))
            .change(
                field,
                FieldValue::Null,
                FieldValue::Text("x".to_string()),
            )
            .build()
    }

    fn status_event(model: EntityModel) -> MutationEvent {
        MutationEvent::builder(TenantId::new(), EntitySnapshot::new(model, EntityId::new()))
            .status_change("open", "won")
            .build()
    }

    #[test]
    fn should_match_field_updated_when_field_changed() {
        let trigger = Trigger::FieldUpdated {
            model: EntityModel::Lead,
            field: "status".to_string(),
        };
        assert!(trigger.matches(&field_event(EntityModel::Lead, "status")));
    }

    #[test]
    fn should_not_match_field_updated_when_other_field_changed() {
        let trigger = Trigger::FieldUpdated {
            model: EntityModel::Lead,
            field: "status".to_string(),
        };
        assert!(!trigger.matches(&field_event(EntityModel::Lead, "value")));
    }

    #[test]
    fn should_not_match_when_model_differs() {
        let trigger = Trigger::FieldUpdated {
            model: EntityModel::Quote,
            field: "status".to_string(),
        };
        assert!(!trigger.matches(&field_event(EntityModel::Lead, "status")));
    }

    #[test]
    fn should_match_status_changed_when_status_present() {
        let trigger = Trigger::StatusChanged {
            model: EntityModel::Project,
        };
        assert!(trigger.matches(&status_event(EntityModel::Project)));
    }

    #[test]
    fn should_not_match_status_changed_without_status_transition() {
        let trigger = Trigger::StatusChanged {
            model: EntityModel::Project,
        };
        assert!(!trigger.matches(&field_event(EntityModel::Project, "status")));
    }

    #[test]
    fn should_expose_watched_model() {
        let trigger = Trigger::StatusChanged {
            model: EntityModel::Quote,
        };
        assert_eq!(trigger.model(), EntityModel::Quote);
    }

    #[test]
    fn should_display_trigger_variants() {
        let trigger = Trigger::FieldUpdated {
            model: EntityModel::Lead,
            field: "status".to_string(),
        };
        assert_eq!(trigger.to_string(), "field_updated(lead.status)");
        let trigger = Trigger::StatusChanged {
            model: EntityModel::Quote,
        };
        assert_eq!(trigger.to_string(), "status_changed(quote)");
    }

    #[test]
    fn should_roundtrip_trigger_through_serde_json() {
        let triggers = vec![
            Trigger::FieldUpdated {
                model: EntityModel::Lead,
                field: "status".to_string(),
            },
            Trigger::StatusChanged {
                model: EntityModel::Project,
            },
        ];
        for trigger in &triggers {
            let json = serde_json::to_string(trigger).unwrap();
            let parsed: Trigger = serde_json::from_str(&json).unwrap();
            assert_eq!(&parsed, trigger);
        }
    }
}
