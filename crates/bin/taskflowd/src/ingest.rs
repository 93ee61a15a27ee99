//! Wire format for mutation events arriving on stdin.
//!
//! One JSON object per line, mirroring the entity store's change-event
//! contract: identity, changed fields with old/new values, an optional
//! status transition, and the post-mutation snapshot of the field map.

use std::collections::HashMap;

use serde::Deserialize;

use taskflow_domain::entity::{EntityModel, EntitySnapshot};
use taskflow_domain::event::MutationEvent;
use taskflow_domain::field::FieldValue;
use taskflow_domain::id::{EntityId, TenantId};
use taskflow_domain::time::Timestamp;

/// A mutation event as received from the outside world.
#[derive(Debug, Deserialize)]
pub struct WireEvent {
    pub tenant_id: TenantId,
    pub model: EntityModel,
    pub entity_id: EntityId,
    #[serde(default)]
    pub changed_fields: HashMap<String, WireChange>,
    #[serde(default)]
    pub status_changed: Option<WireStatus>,
    #[serde(default)]
    pub snapshot: HashMap<String, FieldValue>,
    #[serde(default)]
    pub occurred_at: Option<Timestamp>,
}

/// Old and new value of one changed field.
#[derive(Debug, Deserialize)]
pub struct WireChange {
    #[serde(default)]
    pub old: FieldValue,
    pub new: FieldValue,
}

/// A status transition.
#[derive(Debug, Deserialize)]
pub struct WireStatus {
    pub old: String,
    pub new: String,
}

impl WireEvent {
    /// Convert into the domain event fed to the pipeline.
    #[must_use]
    pub fn into_event(self) -> MutationEvent {
        let snapshot = EntitySnapshot {
            model: self.model,
            entity_id: self.entity_id,
            fields: self.snapshot,
        };
        let mut builder = MutationEvent::builder(self.tenant_id, snapshot);
        for (field, change) in self.changed_fields {
            builder = builder.change(field, change.old, change.new);
        }
        if let Some(status) = self.status_changed {
            builder = builder.status_change(status.old, status.new);
        }
        if let Some(ts) = self.occurred_at {
            builder = builder.occurred_at(ts);
        }
        builder.build()
    }
}
