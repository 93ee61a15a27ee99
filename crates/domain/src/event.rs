//! Events — entity mutations entering the engine, and the audit records
//! the engine publishes while reacting to them.
//!
//! A mutation event carries everything an evaluation needs: the changed
//! fields with old/new values, an optional status transition, a snapshot
//! of the entity, and a causal origin. Field writes performed by the
//! engine itself re-enter the pipeline as synthetic events with an
//! incremented causal depth; [`MAX_CASCADE_DEPTH`] bounds that chain.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityModel, EntitySnapshot};
use crate::field::FieldValue;
use crate::id::{EntityId, EventId, TaskId, TenantId};
use crate::time::Timestamp;

/// Hard bound on the synthetic-mutation chain spawned by one root event.
pub const MAX_CASCADE_DEPTH: u8 = 8;

/// Where a mutation came from, with causal depth for synthetic writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum EventOrigin {
    /// A user (or the external entity store on a user's behalf).
    User,
    /// A write performed by the engine, `depth` hops from the root event.
    System { depth: u8 },
}

impl EventOrigin {
    /// Causal depth of this origin; user mutations are depth 0.
    #[must_use]
    pub fn depth(&self) -> u8 {
        match self {
            Self::User => 0,
            Self::System { depth } => *depth,
        }
    }

    /// Origin for a write caused by processing an event with this origin.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::System {
            depth: self.depth().saturating_add(1),
        }
    }

    /// Whether this mutation was produced by the engine itself.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::System { .. })
    }
}

/// Old and new value of a single changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: FieldValue,
    pub new: FieldValue,
}

/// An entity status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub old: String,
    pub new: String,
}

/// A mutation to a domain entity, as emitted by the external entity store
/// or synthesized by the engine's write-back path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub id: EventId,
    pub tenant_id: TenantId,
    pub model: EntityModel,
    pub entity_id: EntityId,
    pub changed_fields: HashMap<String, FieldChange>,
    pub status_changed: Option<StatusChange>,
    pub snapshot: EntitySnapshot,
    pub origin: EventOrigin,
    pub occurred_at: Timestamp,
}

impl MutationEvent {
    /// Create a builder for constructing a [`MutationEvent`].
    #[must_use]
    pub fn builder(tenant_id: TenantId, snapshot: EntitySnapshot) -> MutationEventBuilder {
        MutationEventBuilder {
            tenant_id,
            snapshot,
            changed_fields: HashMap::new(),
            status_changed: None,
            origin: EventOrigin::User,
            occurred_at: None,
        }
    }

    /// Whether the event changed the given field.
    #[must_use]
    pub fn changed(&self, field: &str) -> bool {
        self.changed_fields.contains_key(field)
    }
}

/// Step-by-step builder for [`MutationEvent`].
#[derive(Debug)]
pub struct MutationEventBuilder {
    tenant_id: TenantId,
    snapshot: EntitySnapshot,
    changed_fields: HashMap<String, FieldChange>,
    status_changed: Option<StatusChange>,
    origin: EventOrigin,
    occurred_at: Option<Timestamp>,
}

impl MutationEventBuilder {
    #[must_use]
    pub fn change(mut self, field: impl Into<String>, old: FieldValue, new: FieldValue) -> Self {
        self.changed_fields
            .insert(field.into(), FieldChange { old, new });
        self
    }

    #[must_use]
    pub fn status_change(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.status_changed = Some(StatusChange {
            old: old.into(),
            new: new.into(),
        });
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: EventOrigin) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn occurred_at(mut self, ts: Timestamp) -> Self {
        self.occurred_at = Some(ts);
        self
    }

    /// Consume the builder and return a [`MutationEvent`].
    #[must_use]
    pub fn build(self) -> MutationEvent {
        MutationEvent {
            id: EventId::new(),
            tenant_id: self.tenant_id,
            model: self.snapshot.model,
            entity_id: self.snapshot.entity_id,
            changed_fields: self.changed_fields,
            status_changed: self.status_changed,
            snapshot: self.snapshot,
            origin: self.origin,
            occurred_at: self.occurred_at.unwrap_or_else(crate::time::now),
        }
    }
}

/// What kind of engine occurrence an audit [`Event`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RuleFired,
    TaskCreated,
    TaskRescheduled,
    TaskCompleted,
    FieldWrittenBack,
    CascadeDepthExceeded,
    RuleFailed,
    LinkSkipped,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RuleFired => f.write_str("rule_fired"),
            Self::TaskCreated => f.write_str("task_created"),
            Self::TaskRescheduled => f.write_str("task_rescheduled"),
            Self::TaskCompleted => f.write_str("task_completed"),
            Self::FieldWrittenBack => f.write_str("field_written_back"),
            Self::CascadeDepthExceeded => f.write_str("cascade_depth_exceeded"),
            Self::RuleFailed => f.write_str("rule_failed"),
            Self::LinkSkipped => f.write_str("link_skipped"),
        }
    }
}

/// An immutable audit record of something the engine did or refused to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub task_id: Option<TaskId>,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl Event {
    /// Create a new audit event stamped with the current time.
    #[must_use]
    pub fn new(event_type: EventType, task_id: Option<TaskId>, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            task_id,
            data,
            timestamp: crate::time::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityModel;

    fn snapshot() -> EntitySnapshot {
        EntitySnapshot::new(EntityModel::Lead, EntityId::new())
            .with_field("status", FieldValue::Text("new".to_string()))
    }

    #[test]
    fn should_report_user_origin_as_depth_zero() {
        assert_eq!(EventOrigin::User.depth(), 0);
        assert!(!EventOrigin::User.is_synthetic());
    }

    #[test]
    fn should_increment_depth_for_child_origin() {
        let child = EventOrigin::User.child();
        assert_eq!(child, EventOrigin::System { depth: 1 });
        assert_eq!(child.child().depth(), 2);
        assert!(child.is_synthetic());
    }

    #[test]
    fn should_saturate_depth_instead_of_overflowing() {
        let deep = EventOrigin::System { depth: u8::MAX };
        assert_eq!(deep.child().depth(), u8::MAX);
    }

    #[test]
    fn should_build_event_with_defaults() {
        let tenant = TenantId::new();
        let event = MutationEvent::builder(tenant, snapshot()).build();
        assert_eq!(event.tenant_id, tenant);
        assert_eq!(event.model, EntityModel::Lead);
        assert_eq!(event.origin, EventOrigin::User);
        assert!(event.changed_fields.is_empty());
        assert!(event.status_changed.is_none());
    }

    #[test]
    fn should_record_field_changes() {
        let event = MutationEvent::builder(TenantId::new(), snapshot())
            .change(
                "status",
                FieldValue::Text("new".to_string()),
                FieldValue::Text("won".to_string()),
            )
            .build();
        assert!(event.changed("status"));
        assert!(!event.changed("value"));
        let change = &event.changed_fields["status"];
        assert_eq!(change.new, FieldValue::Text("won".to_string()));
    }

    #[test]
    fn should_record_status_transition() {
        let event = MutationEvent::builder(TenantId::new(), snapshot())
            .status_change("open", "won")
            .build();
        let status = event.status_changed.unwrap();
        assert_eq!(status.old, "open");
        assert_eq!(status.new, "won");
    }

    #[test]
    fn should_take_model_and_entity_from_snapshot() {
        let snap = snapshot();
        let entity_id = snap.entity_id;
        let event = MutationEvent::builder(TenantId::new(), snap).build();
        assert_eq!(event.entity_id, entity_id);
    }

    #[test]
    fn should_roundtrip_mutation_event_through_serde_json() {
        let event = MutationEvent::builder(TenantId::new(), snapshot())
            .change("status", FieldValue::Null, FieldValue::Boolean(true))
            .origin(EventOrigin::System { depth: 2 })
            .build();
        let json = serde_json::to_string(&event).unwrap();
        let parsed: MutationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn should_create_audit_event_with_fresh_id() {
        let a = Event::new(EventType::TaskCreated, None, serde_json::json!({}));
        let b = Event::new(EventType::TaskCreated, None, serde_json::json!({}));
        assert_ne!(a.id, b.id);
        assert_eq!(a.event_type, EventType::TaskCreated);
    }

    #[test]
    fn should_display_event_type_snake_case() {
        assert_eq!(
            EventType::CascadeDepthExceeded.to_string(),
            "cascade_depth_exceeded"
        );
    }
}
