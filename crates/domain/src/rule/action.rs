//! Action — the task a rule materializes when it fires.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityModel, EntitySnapshot};
use crate::error::ValidationError;
use crate::field::FieldRegistry;
use crate::id::{LinkId, UserId};
use crate::task::TaskPriority;

/// How a task's due date is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DueDateSpec {
    /// Offset in calendar days from a date field on the entity.
    ///
    /// Negative offsets mean "N days before the anchor". A null anchor
    /// leaves the task unscheduled.
    RelativeToField { field: String, offset_days: i64 },
    /// Offset in calendar days from the triggering event's timestamp.
    FixedOffset { offset_days: i64 },
}

impl std::fmt::Display for DueDateSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RelativeToField { field, offset_days } => {
                write!(f, "relative_to_field({field}, {offset_days:+}d)")
            }
            Self::FixedOffset { offset_days } => write!(f, "fixed_offset({offset_days:+}d)"),
        }
    }
}

/// Template for the task idempotency key, with entity-scoped placeholders.
///
/// Supported placeholders: `{model}`, `{entity}`, and `{field:NAME}` for
/// the rendered value of an entity field. The rendered key is scoped by
/// tenant at the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyTemplate(String);

impl KeyTemplate {
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// The raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the template at authoring time.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyInstanceKey`] for an empty
    /// template, [`ValidationError::UnknownPlaceholder`] for a
    /// placeholder outside the supported set, and
    /// [`ValidationError::UnknownField`] for a `{field:…}` placeholder
    /// naming an undeclared field.
    pub fn validate(
        &self,
        model: EntityModel,
        registry: &FieldRegistry,
    ) -> Result<(), ValidationError> {
        if self.0.trim().is_empty() {
            return Err(ValidationError::EmptyInstanceKey);
        }
        for placeholder in placeholders(&self.0) {
            match placeholder {
                "model" | "entity" => {}
                other => {
                    if let Some(field) = other.strip_prefix("field:") {
                        registry.require(model, field)?;
                    } else {
                        return Err(ValidationError::UnknownPlaceholder {
                            placeholder: other.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Render the template against an entity snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownPlaceholder`] for a placeholder
    /// outside the supported set (templates are normally validated at
    /// authoring time, so this indicates a stale definition).
    pub fn render(&self, snapshot: &EntitySnapshot) -> Result<String, ValidationError> {
        let mut out = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                out.push('{');
                rest = after;
                continue;
            };
            let placeholder = &after[..end];
            match placeholder {
                "model" => out.push_str(&snapshot.model.to_string()),
                "entity" => out.push_str(&snapshot.entity_id.to_string()),
                other => {
                    if let Some(field) = other.strip_prefix("field:") {
                        out.push_str(&snapshot.field(field).to_string());
                    } else {
                        return Err(ValidationError::UnknownPlaceholder {
                            placeholder: other.to_string(),
                        });
                    }
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        if out.trim().is_empty() {
            return Err(ValidationError::EmptyInstanceKey);
        }
        Ok(out)
    }
}

fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    template.split('{').skip(1).filter_map(|part| {
        let end = part.find('}')?;
        Some(&part[..end])
    })
}

/// The task a rule creates (or reschedules) when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskAction {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form task category shown to users (e.g. `"call"`, `"order"`).
    pub kind: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub assign_to: Option<UserId>,
    pub due: DueDateSpec,
    /// Whether an anchor change moves the due date of an existing open task.
    #[serde(default)]
    pub reschedule_on_trigger_change: bool,
    pub instance_key: KeyTemplate,
    /// Binds the task's completion to a field link.
    #[serde(default)]
    pub linked_field: Option<LinkId>,
}

impl CreateTaskAction {
    /// Validate the action against the registry for the triggering model.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the title is empty, the due-date
    /// anchor is undeclared or not date-typed, or the instance-key
    /// template is invalid.
    pub fn validate(
        &self,
        model: EntityModel,
        registry: &FieldRegistry,
    ) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if let DueDateSpec::RelativeToField { field, .. } = &self.due {
            let def = registry.require(model, field)?;
            if !def.field_type.is_date() {
                return Err(ValidationError::NotADateField {
                    model,
                    field: field.clone(),
                });
            }
        }
        self.instance_key.validate(model, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityModel;
    use crate::field::{FieldDef, FieldType, FieldValue};
    use crate::id::EntityId;

    fn registry() -> FieldRegistry {
        FieldRegistry::builder()
            .field(
                EntityModel::Project,
                FieldDef::new("install_date", FieldType::Date),
            )
            .field(
                EntityModel::Project,
                FieldDef::new("reference", FieldType::Text),
            )
            .build()
    }

    fn action(template: &str) -> CreateTaskAction {
        CreateTaskAction {
            title: "Order blanks".to_string(),
            description: None,
            kind: "order".to_string(),
            priority: TaskPriority::High,
            assign_to: None,
            due: DueDateSpec::RelativeToField {
                field: "install_date".to_string(),
                offset_days: -20,
            },
            reschedule_on_trigger_change: true,
            instance_key: KeyTemplate::new(template),
            linked_field: None,
        }
    }

    #[test]
    fn should_render_model_and_entity_placeholders() {
        let id = EntityId::new();
        let snapshot = EntitySnapshot::new(EntityModel::Project, id);
        let key = KeyTemplate::new("order-blanks:{model}:{entity}")
            .render(&snapshot)
            .unwrap();
        assert_eq!(key, format!("order-blanks:project:{id}"));
    }

    #[test]
    fn should_render_field_placeholder() {
        let snapshot = EntitySnapshot::new(EntityModel::Project, EntityId::new())
            .with_field("reference", FieldValue::Text("JOB-17".to_string()));
        let key = KeyTemplate::new("order:{field:reference}")
            .render(&snapshot)
            .unwrap();
        assert_eq!(key, "order:JOB-17");
    }

    #[test]
    fn should_render_same_key_for_same_entity_twice() {
        let snapshot = EntitySnapshot::new(EntityModel::Project, EntityId::new());
        let template = KeyTemplate::new("k:{model}:{entity}");
        assert_eq!(
            template.render(&snapshot).unwrap(),
            template.render(&snapshot).unwrap()
        );
    }

    #[test]
    fn should_error_on_unknown_placeholder_at_render() {
        let snapshot = EntitySnapshot::new(EntityModel::Project, EntityId::new());
        let err = KeyTemplate::new("k:{rule}").render(&snapshot).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownPlaceholder { .. }));
    }

    #[test]
    fn should_leave_unclosed_brace_literal() {
        let snapshot = EntitySnapshot::new(EntityModel::Project, EntityId::new());
        let key = KeyTemplate::new("k:{oops").render(&snapshot).unwrap();
        assert_eq!(key, "k:{oops");
    }

    #[test]
    fn should_validate_known_placeholders() {
        let template = KeyTemplate::new("order:{model}:{entity}:{field:reference}");
        assert!(template.validate(EntityModel::Project, &registry()).is_ok());
    }

    #[test]
    fn should_reject_field_placeholder_for_undeclared_field() {
        let template = KeyTemplate::new("order:{field:missing}");
        let err = template
            .validate(EntityModel::Project, &registry())
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownField { .. }));
    }

    #[test]
    fn should_reject_empty_template() {
        let template = KeyTemplate::new("   ");
        let err = template
            .validate(EntityModel::Project, &registry())
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyInstanceKey);
    }

    #[test]
    fn should_validate_action_with_date_anchor() {
        assert!(
            action("order:{entity}")
                .validate(EntityModel::Project, &registry())
                .is_ok()
        );
    }

    #[test]
    fn should_reject_action_anchored_to_non_date_field() {
        let mut a = action("order:{entity}");
        a.due = DueDateSpec::RelativeToField {
            field: "reference".to_string(),
            offset_days: 1,
        };
        let err = a.validate(EntityModel::Project, &registry()).unwrap_err();
        assert!(matches!(err, ValidationError::NotADateField { .. }));
    }

    #[test]
    fn should_reject_action_anchored_to_undeclared_field() {
        let mut a = action("order:{entity}");
        a.due = DueDateSpec::RelativeToField {
            field: "missing".to_string(),
            offset_days: 1,
        };
        let err = a.validate(EntityModel::Project, &registry()).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownField { .. }));
    }

    #[test]
    fn should_reject_action_with_empty_title() {
        let mut a = action("order:{entity}");
        a.title = "  ".to_string();
        let err = a.validate(EntityModel::Project, &registry()).unwrap_err();
        assert_eq!(err, ValidationError::EmptyName);
    }

    #[test]
    fn should_display_due_date_specs() {
        let spec = DueDateSpec::RelativeToField {
            field: "install_date".to_string(),
            offset_days: -20,
        };
        assert_eq!(spec.to_string(), "relative_to_field(install_date, -20d)");
        let spec = DueDateSpec::FixedOffset { offset_days: 3 };
        assert_eq!(spec.to_string(), "fixed_offset(+3d)");
    }

    #[test]
    fn should_roundtrip_action_through_serde_json() {
        let a = action("order:{entity}");
        let json = serde_json::to_string(&a).unwrap();
        let parsed: CreateTaskAction = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, a);
    }
}
