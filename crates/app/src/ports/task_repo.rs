//! Task repository port — persistence for tasks with an atomic,
//! idempotency-keyed upsert.

use std::future::Future;

use taskflow_domain::entity::EntityRef;
use taskflow_domain::error::TaskflowError;
use taskflow_domain::id::{LinkId, TaskId, TenantId, UserId};
use taskflow_domain::task::{Task, TaskPriority};
use taskflow_domain::time::Timestamp;

/// Everything needed to create a task, before identity is assigned.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub tenant_id: TenantId,
    pub title: String,
    pub description: Option<String>,
    pub kind: String,
    pub priority: TaskPriority,
    pub related: EntityRef,
    pub assigned_to: Option<UserId>,
    pub due_at: Option<Timestamp>,
    pub instance_key: String,
    pub linked_field: Option<LinkId>,
}

impl TaskDraft {
    /// Materialize the draft into a new open [`Task`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::Validation`] when the draft violates task
    /// invariants (empty title or instance key).
    pub fn into_task(self) -> Result<Task, TaskflowError> {
        let mut builder = Task::builder()
            .tenant_id(self.tenant_id)
            .title(self.title)
            .kind(self.kind)
            .priority(self.priority)
            .related(self.related)
            .instance_key(self.instance_key);
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        if let Some(user) = self.assigned_to {
            builder = builder.assigned_to(user);
        }
        if let Some(due_at) = self.due_at {
            builder = builder.due_at(due_at);
        }
        if let Some(link) = self.linked_field {
            builder = builder.linked_field(link);
        }
        builder.build()
    }
}

/// What an upsert did.
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    /// No matching task existed; one was created.
    Created(Task),
    /// An open task existed and its due date was moved.
    Rescheduled(Task),
    /// A task existed and was left untouched (terminal, rescheduling
    /// disabled, or the due date already matched).
    Unchanged(Task),
}

impl UpsertOutcome {
    /// The task the outcome refers to.
    #[must_use]
    pub fn task(&self) -> &Task {
        match self {
            Self::Created(task) | Self::Rescheduled(task) | Self::Unchanged(task) => task,
        }
    }
}

/// Repository for persisting and querying [`Task`]s.
///
/// Implementations must make [`upsert`](Self::upsert) atomic with respect
/// to the idempotency key `(tenant_id, related.model, related.entity_id,
/// instance_key)` — a unique constraint or equivalent compare-and-swap —
/// so that concurrent duplicate creates collapse into one task.
pub trait TaskRepository {
    /// Create the task, or adjust the existing non-cancelled task with
    /// the same idempotency key.
    ///
    /// When a task exists: if it is open, `reschedule` is true, and the
    /// draft's due date differs, the due date is updated in place;
    /// otherwise the stored task is returned unchanged. Terminal tasks
    /// are never mutated.
    fn upsert(
        &self,
        draft: TaskDraft,
        reschedule: bool,
    ) -> impl Future<Output = Result<UpsertOutcome, TaskflowError>> + Send;

    /// Get a task by its unique identifier.
    fn get_by_id(
        &self,
        id: TaskId,
    ) -> impl Future<Output = Result<Option<Task>, TaskflowError>> + Send;

    /// Persist an updated task (status transitions and the like).
    fn update(&self, task: Task) -> impl Future<Output = Result<Task, TaskflowError>> + Send;

    /// Find the non-cancelled task with the given idempotency key.
    fn find_by_instance_key(
        &self,
        tenant_id: TenantId,
        related: EntityRef,
        instance_key: &str,
    ) -> impl Future<Output = Result<Option<Task>, TaskflowError>> + Send;

    /// Find open (non-terminal) tasks bound to a field link for an entity.
    fn find_open_by_link(
        &self,
        tenant_id: TenantId,
        related: EntityRef,
        link: LinkId,
    ) -> impl Future<Output = Result<Vec<Task>, TaskflowError>> + Send;
}
