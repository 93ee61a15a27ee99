//! In-memory port implementations shared by the engine's unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use taskflow_domain::entity::{EntityModel, EntityRef, EntitySnapshot};
use taskflow_domain::error::{NotFoundError, TaskflowError};
use taskflow_domain::event::Event;
use taskflow_domain::field::FieldValue;
use taskflow_domain::id::{EntityId, LinkId, TaskId, TenantId};
use taskflow_domain::task::{Task, TaskStatus};

use crate::ports::{
    EntityGateway, EventPublisher, TaskDraft, TaskRepository, UpsertOutcome, WriteReceipt,
};

/// In-memory task repository with the same upsert semantics the SQLite
/// adapter implements with a unique index.
#[derive(Clone, Default)]
pub struct InMemoryTaskRepo {
    store: Arc<Mutex<HashMap<TaskId, Task>>>,
}

impl InMemoryTaskRepo {
    pub fn insert(&self, task: Task) {
        self.store.lock().unwrap().insert(task.id, task);
    }

    pub fn count(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.store.lock().unwrap().get(&id).cloned()
    }

    pub fn set_status(&self, id: TaskId, status: TaskStatus) {
        let mut store = self.store.lock().unwrap();
        if let Some(task) = store.get_mut(&id) {
            task.status = status;
        }
    }

    pub fn all(&self) -> Vec<Task> {
        self.store.lock().unwrap().values().cloned().collect()
    }
}

impl TaskRepository for InMemoryTaskRepo {
    async fn upsert(
        &self,
        draft: TaskDraft,
        reschedule: bool,
    ) -> Result<UpsertOutcome, TaskflowError> {
        let mut store = self.store.lock().unwrap();
        let existing = store
            .values()
            .find(|task| {
                task.tenant_id == draft.tenant_id
                    && task.related == draft.related
                    && task.instance_key == draft.instance_key
                    && task.status != TaskStatus::Cancelled
            })
            .map(|task| task.id);

        match existing {
            None => {
                let task = draft.into_task()?;
                store.insert(task.id, task.clone());
                Ok(UpsertOutcome::Created(task))
            }
            Some(id) => {
                let task = store.get_mut(&id).expect("existing id resolves");
                if !task.status.is_terminal() && reschedule && task.due_at != draft.due_at {
                    task.reschedule(draft.due_at, taskflow_domain::time::now());
                    Ok(UpsertOutcome::Rescheduled(task.clone()))
                } else {
                    Ok(UpsertOutcome::Unchanged(task.clone()))
                }
            }
        }
    }

    async fn get_by_id(&self, id: TaskId) -> Result<Option<Task>, TaskflowError> {
        Ok(self.store.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, task: Task) -> Result<Task, TaskflowError> {
        let mut store = self.store.lock().unwrap();
        if !store.contains_key(&task.id) {
            return Err(NotFoundError {
                entity: "Task",
                id: task.id.to_string(),
            }
            .into());
        }
        store.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_by_instance_key(
        &self,
        tenant_id: TenantId,
        related: EntityRef,
        instance_key: &str,
    ) -> Result<Option<Task>, TaskflowError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .values()
            .find(|task| {
                task.tenant_id == tenant_id
                    && task.related == related
                    && task.instance_key == instance_key
                    && task.status != TaskStatus::Cancelled
            })
            .cloned())
    }

    async fn find_open_by_link(
        &self,
        tenant_id: TenantId,
        related: EntityRef,
        link: LinkId,
    ) -> Result<Vec<Task>, TaskflowError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|task| {
                task.tenant_id == tenant_id
                    && task.related == related
                    && task.linked_field == Some(link)
                    && !task.status.is_terminal()
            })
            .cloned()
            .collect())
    }
}

/// In-memory entity store acting as the write-back gateway.
#[derive(Clone, Default)]
pub struct InMemoryEntityStore {
    entities: Arc<Mutex<HashMap<(EntityModel, EntityId), HashMap<String, FieldValue>>>>,
}

impl InMemoryEntityStore {
    /// Seed the store with an entity snapshot.
    pub fn seed(&self, snapshot: &EntitySnapshot) {
        self.entities.lock().unwrap().insert(
            (snapshot.model, snapshot.entity_id),
            snapshot.fields.clone(),
        );
    }

    pub fn field(&self, model: EntityModel, entity_id: EntityId, name: &str) -> FieldValue {
        self.entities
            .lock()
            .unwrap()
            .get(&(model, entity_id))
            .and_then(|fields| fields.get(name).cloned())
            .unwrap_or(FieldValue::Null)
    }
}

impl EntityGateway for InMemoryEntityStore {
    async fn write_field(
        &self,
        _tenant_id: TenantId,
        model: EntityModel,
        entity_id: EntityId,
        field: &str,
        value: FieldValue,
    ) -> Result<WriteReceipt, TaskflowError> {
        let mut entities = self.entities.lock().unwrap();
        let fields = entities.entry((model, entity_id)).or_default();
        let previous = fields
            .insert(field.to_string(), value)
            .unwrap_or(FieldValue::Null);
        let snapshot = EntitySnapshot {
            model,
            entity_id,
            fields: fields.clone(),
        };
        Ok(WriteReceipt { previous, snapshot })
    }
}

/// Publisher that records every event for assertions.
#[derive(Clone, Default)]
pub struct SpyPublisher {
    events: Arc<Mutex<Vec<Event>>>,
}

impl SpyPublisher {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_of(&self, event_type: taskflow_domain::event::EventType) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }
}

impl EventPublisher for SpyPublisher {
    async fn publish(&self, event: Event) -> Result<(), TaskflowError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
