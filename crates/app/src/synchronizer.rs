//! Link synchronizer — keeps entity fields and task completion in sync.
//!
//! Field→task: when a changed field satisfies its link's completion
//! condition, every open task bound to that link is completed. Task→field:
//! every completion of a linked task (user-initiated or automatic) applies
//! the link's write-back action and emits a **synthetic** mutation event
//! carrying the originating event's causal depth + 1, which re-enters the
//! pipeline like any other mutation.
//!
//! Failures are isolated per link: an ambiguous condition or a storage
//! error skips that link, logs, and never aborts the event.

use taskflow_domain::error::TaskflowError;
use taskflow_domain::event::{Event, EventOrigin, EventType, MutationEvent};
use taskflow_domain::field::FieldRegistry;
use taskflow_domain::link::FieldLink;
use taskflow_domain::task::Task;
use taskflow_domain::time::Timestamp;

use crate::ports::{EntityGateway, EventPublisher, LinkSet, TaskRepository};

/// What a link-evaluation pass did.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Tasks transitioned to done by completion conditions.
    pub completed: usize,
    /// Synthetic mutation events produced by write-backs.
    pub synthetic: Vec<MutationEvent>,
}

/// Applies completion conditions and write-back actions through ports.
pub struct LinkSynchronizer<TR, EG, P> {
    tasks: TR,
    entities: EG,
    publisher: P,
}

impl<TR, EG, P> LinkSynchronizer<TR, EG, P>
where
    TR: TaskRepository,
    EG: EntityGateway,
    P: EventPublisher,
{
    /// Create a new synchronizer.
    pub fn new(tasks: TR, entities: EG, publisher: P) -> Self {
        Self {
            tasks,
            entities,
            publisher,
        }
    }

    /// Evaluate every link whose field changed in this event.
    ///
    /// Auto-completions route through [`complete_task`](Self::complete_task),
    /// so write-backs fire exactly as they would for a user completion.
    pub async fn evaluate_links(
        &self,
        event: &MutationEvent,
        links: &LinkSet,
        registry: &FieldRegistry,
        at: Timestamp,
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        for link in links.for_model(event.model) {
            let Some(change) = event.changed_fields.get(&link.field_path) else {
                continue;
            };
            let Some(def) = registry.definition(link.model, &link.field_path) else {
                self.skip_link(link, "field missing from registry").await;
                continue;
            };
            match link.completion.is_met(&change.new, def) {
                Ok(false) => {}
                Ok(true) => {
                    let open = match self
                        .tasks
                        .find_open_by_link(event.tenant_id, event.snapshot.entity_ref(), link.id)
                        .await
                    {
                        Ok(open) => open,
                        Err(err) => {
                            tracing::error!(link = %link.id, error = %err, "open-task lookup failed, link skipped");
                            self.skip_link(link, "open-task lookup failed").await;
                            continue;
                        }
                    };
                    for task in open {
                        let task_id = task.id;
                        match self
                            .complete_task(task, at, event.origin, true, links, registry)
                            .await
                        {
                            Ok(synthetic) => {
                                outcome.completed += 1;
                                outcome.synthetic.extend(synthetic);
                            }
                            Err(err) => {
                                tracing::error!(task = %task_id, error = %err, "auto-completion failed");
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(link = %link.id, field = %link.field_path, error = %err, "completion condition ambiguous, link skipped");
                    self.skip_link(link, "ambiguous completion condition")
                        .await;
                }
            }
        }
        outcome
    }

    /// Transition a task to done and apply its link's write-back.
    ///
    /// `origin` is the causal origin of whatever prompted the completion;
    /// the synthetic event produced by the write-back carries
    /// `origin.child()`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::Validation`] when the task is already
    /// terminal, or a storage error from the repository or gateway.
    pub async fn complete_task(
        &self,
        mut task: Task,
        at: Timestamp,
        origin: EventOrigin,
        auto: bool,
        links: &LinkSet,
        registry: &FieldRegistry,
    ) -> Result<Option<MutationEvent>, TaskflowError> {
        task.complete(at)?;
        let task = self.tasks.update(task).await?;
        let audit = Event::new(
            EventType::TaskCompleted,
            Some(task.id),
            serde_json::json!({
                "instance_key": task.instance_key,
                "auto": auto,
            }),
        );
        let _ = self.publisher.publish(audit).await;

        let Some(link_id) = task.linked_field else {
            return Ok(None);
        };
        let Some(link) = links.by_id(link_id) else {
            tracing::warn!(link = %link_id, task = %task.id, "link no longer configured, write-back skipped");
            return Ok(None);
        };
        let Some(def) = registry.definition(link.model, &link.field_path) else {
            tracing::warn!(field = %link.field_path, "link field missing from registry, write-back skipped");
            return Ok(None);
        };

        let value = link.on_complete.value_at(at, def.field_type);
        let receipt = self
            .entities
            .write_field(
                task.tenant_id,
                task.related.model,
                task.related.entity_id,
                &link.field_path,
                value.clone(),
            )
            .await?;
        let audit = Event::new(
            EventType::FieldWrittenBack,
            Some(task.id),
            serde_json::json!({
                "link_id": link.id,
                "field": link.field_path,
                "value": value,
            }),
        );
        let _ = self.publisher.publish(audit).await;

        let synthetic = MutationEvent::builder(task.tenant_id, receipt.snapshot)
            .change(link.field_path.clone(), receipt.previous, value)
            .origin(origin.child())
            .occurred_at(at)
            .build();
        Ok(Some(synthetic))
    }

    async fn skip_link(&self, link: &FieldLink, reason: &str) {
        let audit = Event::new(
            EventType::LinkSkipped,
            None,
            serde_json::json!({
                "link_id": link.id,
                "field": link.field_path,
                "reason": reason,
            }),
        );
        let _ = self.publisher.publish(audit).await;
    }
}
