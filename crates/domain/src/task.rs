//! Task — the work item the engine materializes and tracks.
//!
//! Idempotency invariant: for a tenant, `(related.model,
//! related.entity_id, instance_key)` identifies at most one non-cancelled
//! task. Terminal tasks (`Done`, `Cancelled`) are immutable to
//! rescheduling; completion stamps `completed_at` exactly once.

use serde::{Deserialize, Serialize};

use crate::entity::EntityRef;
use crate::error::{TaskflowError, ValidationError};
use crate::id::{LinkId, TaskId, TenantId, UserId};
use crate::time::Timestamp;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Open,
    InProgress,
    Blocked,
    Done,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::InProgress => f.write_str("in_progress"),
            Self::Blocked => f.write_str("blocked"),
            Self::Done => f.write_str("done"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Priority of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
            Self::Urgent => f.write_str("urgent"),
        }
    }
}

/// A work item bound to an entity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub tenant_id: TenantId,
    pub title: String,
    pub description: Option<String>,
    /// Free-form category (e.g. `"call"`, `"order"`).
    pub kind: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub related: EntityRef,
    pub assigned_to: Option<UserId>,
    pub due_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    /// Tenant-scoped idempotency key rendered from the rule's template.
    pub instance_key: String,
    /// Field link whose completion state this task is bound to.
    pub linked_field: Option<LinkId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// Create a builder for constructing a [`Task`].
    #[must_use]
    pub fn builder() -> TaskBuilder {
        TaskBuilder::default()
    }

    /// Whether the task can still be completed or rescheduled.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Transition the task to `Done`, stamping `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TerminalTask`] when the task is already
    /// done or cancelled.
    pub fn complete(&mut self, at: Timestamp) -> Result<(), TaskflowError> {
        if self.status.is_terminal() {
            return Err(ValidationError::TerminalTask {
                status: self.status.to_string(),
            }
            .into());
        }
        self.status = TaskStatus::Done;
        self.completed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Move the due date of a non-terminal task.
    ///
    /// Returns `false` (and leaves the task untouched) when the task is
    /// terminal; a done task never has its due date mutated.
    pub fn reschedule(&mut self, due_at: Option<Timestamp>, at: Timestamp) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.due_at = due_at;
        self.updated_at = at;
        true
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::Validation`] when the title or instance
    /// key is empty.
    pub fn validate(&self) -> Result<(), TaskflowError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.instance_key.trim().is_empty() {
            return Err(ValidationError::EmptyInstanceKey.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Task`].
#[derive(Debug, Default)]
pub struct TaskBuilder {
    id: Option<TaskId>,
    tenant_id: Option<TenantId>,
    title: Option<String>,
    description: Option<String>,
    kind: Option<String>,
    status: Option<TaskStatus>,
    priority: Option<TaskPriority>,
    related: Option<EntityRef>,
    assigned_to: Option<UserId>,
    due_at: Option<Timestamp>,
    instance_key: Option<String>,
    linked_field: Option<LinkId>,
}

impl TaskBuilder {
    #[must_use]
    pub fn id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn tenant_id(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn related(mut self, related: EntityRef) -> Self {
        self.related = Some(related);
        self
    }

    #[must_use]
    pub fn assigned_to(mut self, user: UserId) -> Self {
        self.assigned_to = Some(user);
        self
    }

    #[must_use]
    pub fn due_at(mut self, due_at: Timestamp) -> Self {
        self.due_at = Some(due_at);
        self
    }

    #[must_use]
    pub fn instance_key(mut self, key: impl Into<String>) -> Self {
        self.instance_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn linked_field(mut self, link: LinkId) -> Self {
        self.linked_field = Some(link);
        self
    }

    /// Consume the builder, validate, and return a [`Task`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::Validation`] if required fields are
    /// missing or empty.
    pub fn build(self) -> Result<Task, TaskflowError> {
        let ts = crate::time::now();
        let related = self.related.ok_or(ValidationError::MissingRelated)?;
        let task = Task {
            id: self.id.unwrap_or_default(),
            tenant_id: self.tenant_id.unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            description: self.description,
            kind: self.kind.unwrap_or_else(|| "task".to_string()),
            status: self.status.unwrap_or_default(),
            priority: self.priority.unwrap_or_default(),
            related,
            assigned_to: self.assigned_to,
            due_at: self.due_at,
            completed_at: None,
            instance_key: self.instance_key.unwrap_or_default(),
            linked_field: self.linked_field,
            created_at: ts,
            updated_at: ts,
        };
        task.validate()?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityModel;
    use crate::id::EntityId;

    fn related() -> EntityRef {
        EntityRef::new(EntityModel::Project, EntityId::new())
    }

    fn valid_task() -> Task {
        Task::builder()
            .tenant_id(TenantId::new())
            .title("Order blanks")
            .kind("order")
            .related(related())
            .instance_key("order-blanks:project:x")
            .build()
            .unwrap()
    }

    #[test]
    fn should_build_open_task_with_defaults() {
        let task = valid_task();
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert!(task.due_at.is_none());
        assert!(task.completed_at.is_none());
        assert!(task.is_open());
    }

    #[test]
    fn should_reject_empty_title() {
        let result = Task::builder()
            .related(related())
            .instance_key("k")
            .build();
        assert!(matches!(
            result,
            Err(TaskflowError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_reject_empty_instance_key() {
        let result = Task::builder().title("T").related(related()).build();
        assert!(matches!(
            result,
            Err(TaskflowError::Validation(
                ValidationError::EmptyInstanceKey
            ))
        ));
    }

    #[test]
    fn should_complete_open_task_and_stamp_completed_at() {
        let mut task = valid_task();
        let at = crate::time::now();
        task.complete(at).unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.completed_at, Some(at));
        assert!(!task.is_open());
    }

    #[test]
    fn should_refuse_to_complete_done_task_twice() {
        let mut task = valid_task();
        task.complete(crate::time::now()).unwrap();
        let err = task.complete(crate::time::now()).unwrap_err();
        assert!(matches!(
            err,
            TaskflowError::Validation(ValidationError::TerminalTask { .. })
        ));
    }

    #[test]
    fn should_refuse_to_complete_cancelled_task() {
        let mut task = valid_task();
        task.status = TaskStatus::Cancelled;
        assert!(task.complete(crate::time::now()).is_err());
    }

    #[test]
    fn should_reschedule_open_task() {
        let mut task = valid_task();
        let due = crate::time::now();
        assert!(task.reschedule(Some(due), crate::time::now()));
        assert_eq!(task.due_at, Some(due));
    }

    #[test]
    fn should_reschedule_in_progress_and_blocked_tasks() {
        for status in [TaskStatus::InProgress, TaskStatus::Blocked] {
            let mut task = valid_task();
            task.status = status;
            assert!(task.reschedule(Some(crate::time::now()), crate::time::now()));
        }
    }

    #[test]
    fn should_not_reschedule_done_task() {
        let mut task = valid_task();
        let original_due = crate::time::now();
        task.due_at = Some(original_due);
        task.complete(crate::time::now()).unwrap();
        assert!(!task.reschedule(None, crate::time::now()));
        assert_eq!(task.due_at, Some(original_due));
    }

    #[test]
    fn should_not_reschedule_cancelled_task() {
        let mut task = valid_task();
        task.status = TaskStatus::Cancelled;
        assert!(!task.reschedule(Some(crate::time::now()), crate::time::now()));
    }

    #[test]
    fn should_report_terminal_statuses() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Open.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn should_order_priorities() {
        assert!(TaskPriority::Low < TaskPriority::Medium);
        assert!(TaskPriority::High < TaskPriority::Urgent);
    }

    #[test]
    fn should_display_status_snake_case() {
        assert_eq!(TaskStatus::InProgress.to_string(), "in_progress");
        assert_eq!(TaskStatus::Done.to_string(), "done");
    }

    #[test]
    fn should_roundtrip_task_through_serde_json() {
        let task = valid_task();
        let json = serde_json::to_string(&task).unwrap();
        let parsed: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, task);
    }
}
