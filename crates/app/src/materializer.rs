//! Task materializer — turns a fired rule action into exactly one task.
//!
//! The idempotency key is rendered from the action's template and handed
//! to the repository, whose upsert is atomic with respect to that key.
//! A missing due-date anchor leaves the task unscheduled; terminal tasks
//! are never touched.

use taskflow_domain::error::TaskflowError;
use taskflow_domain::event::{Event, EventType, MutationEvent};
use taskflow_domain::rule::{AutomationRule, CreateTaskAction};
use taskflow_domain::schedule::{self, DueDate};

use crate::ports::{EventPublisher, TaskDraft, TaskRepository, UpsertOutcome};

/// Applies a rule's create-task actions through the task repository.
pub struct TaskMaterializer<TR, P> {
    tasks: TR,
    publisher: P,
}

impl<TR, P> TaskMaterializer<TR, P>
where
    TR: TaskRepository,
    P: EventPublisher,
{
    /// Create a new materializer.
    pub fn new(tasks: TR, publisher: P) -> Self {
        Self { tasks, publisher }
    }

    /// Apply one action of a fired rule to the triggering event.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the instance-key template cannot
    /// be rendered, an evaluation error when the due-date anchor is
    /// unreadable, or a storage error from the repository. Callers
    /// isolate these per rule.
    pub async fn apply(
        &self,
        rule: &AutomationRule,
        action: &CreateTaskAction,
        event: &MutationEvent,
    ) -> Result<UpsertOutcome, TaskflowError> {
        let due = schedule::due_at(&action.due, &event.snapshot, event.occurred_at)?;
        if due == DueDate::Unscheduled {
            tracing::debug!(
                rule = %rule.name,
                entity = %event.snapshot.entity_ref(),
                "due-date anchor unset, task left unscheduled"
            );
        }
        let instance_key = action.instance_key.render(&event.snapshot)?;
        let draft = TaskDraft {
            tenant_id: event.tenant_id,
            title: action.title.clone(),
            description: action.description.clone(),
            kind: action.kind.clone(),
            priority: action.priority,
            related: event.snapshot.entity_ref(),
            assigned_to: action.assign_to,
            due_at: due.timestamp(),
            instance_key,
            linked_field: action.linked_field,
        };

        let outcome = self
            .tasks
            .upsert(draft, action.reschedule_on_trigger_change)
            .await?;

        match &outcome {
            UpsertOutcome::Created(task) => {
                let audit = Event::new(
                    EventType::TaskCreated,
                    Some(task.id),
                    serde_json::json!({
                        "rule_id": rule.id,
                        "instance_key": task.instance_key,
                        "due_at": task.due_at,
                    }),
                );
                let _ = self.publisher.publish(audit).await;
            }
            UpsertOutcome::Rescheduled(task) => {
                let audit = Event::new(
                    EventType::TaskRescheduled,
                    Some(task.id),
                    serde_json::json!({
                        "rule_id": rule.id,
                        "due_at": task.due_at,
                    }),
                );
                let _ = self.publisher.publish(audit).await;
            }
            UpsertOutcome::Unchanged(_) => {}
        }

        Ok(outcome)
    }
}
