//! Definitions file — the TOML schema for registry, rules, and links.
//!
//! The file is the daemon's stand-in for the external settings store.
//! Everything here is a thin DTO over the domain types; ids may be
//! omitted and are generated on load, while cross-references (an
//! action's `linked_field`) require explicit ids. The parsed batch goes
//! through [`ConfigService`] so invalid definitions are rejected before
//! the engine sees an event.

use serde::Deserialize;

use taskflow_app::services::config_service::{ConfigService, StaticConfig};
use taskflow_domain::entity::EntityModel;
use taskflow_domain::field::{FieldDef, FieldRegistry, FieldType};
use taskflow_domain::id::{LinkId, RuleId};
use taskflow_domain::link::{CompletionCondition, FieldLink, WriteBackAction};
use taskflow_domain::rule::{AutomationRule, Condition, CreateTaskAction, Trigger};

/// Parsed definitions file.
#[derive(Debug, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
}

/// One field registry entry.
#[derive(Debug, Deserialize)]
pub struct FieldEntry {
    pub model: EntityModel,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
}

/// One automation rule.
#[derive(Debug, Deserialize)]
pub struct RuleEntry {
    #[serde(default)]
    pub id: RuleId,
    pub name: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    pub trigger: Trigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<CreateTaskAction>,
}

/// One field link.
#[derive(Debug, Deserialize)]
pub struct LinkEntry {
    #[serde(default)]
    pub id: LinkId,
    pub model: EntityModel,
    pub field_path: String,
    #[serde(default)]
    pub label: Option<String>,
    pub completion: CompletionCondition,
    pub on_complete: WriteBackAction,
}

fn enabled_default() -> bool {
    true
}

impl Definitions {
    /// Parse a definitions file.
    ///
    /// # Errors
    ///
    /// Returns a TOML error for malformed input.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Validate the batch and build the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`taskflow_domain::error::TaskflowError::Validation`] for
    /// the first definition that contradicts the registry.
    pub fn into_config(self) -> Result<StaticConfig, taskflow_domain::error::TaskflowError> {
        let mut builder = FieldRegistry::builder().version(self.version);
        for field in self.fields {
            let mut def = FieldDef::new(field.name, field.field_type);
            if field.required {
                def = def.required();
            }
            builder = builder.field(field.model, def);
        }
        let registry = builder.build();

        let rules: Vec<AutomationRule> = self
            .rules
            .into_iter()
            .map(|entry| AutomationRule {
                id: entry.id,
                name: entry.name,
                enabled: entry.enabled,
                trigger: entry.trigger,
                conditions: entry.conditions,
                actions: entry.actions,
            })
            .collect();

        let links: Vec<FieldLink> = self
            .links
            .into_iter()
            .map(|entry| FieldLink {
                id: entry.id,
                model: entry.model,
                field_path: entry.field_path,
                label: entry.label,
                completion: entry.completion,
                on_complete: entry.on_complete,
            })
            .collect();

        ConfigService::load(registry, rules, links, self.version)
    }
}
