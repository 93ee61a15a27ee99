//! Event pipeline — the engine's front door.
//!
//! One call to [`EventPipeline::process`] drains a queue seeded with the
//! incoming mutation: rules are evaluated and materialized, links are
//! synchronized, and any synthetic events produced by write-backs are
//! appended to the queue with their causal depth incremented. The
//! hop-count guard drops synthetic events whose depth reaches
//! [`MAX_CASCADE_DEPTH`], bounding cyclic link configurations.
//!
//! Events for the same `(model, entity_id)` are serialized through a
//! keyed mutex so the idempotency check-then-act and the write-back
//! cascade always observe a consistent snapshot. Events for different
//! entities may be processed concurrently by separate callers.
//!
//! Failure isolation: one rule's failure is logged and published to the
//! audit trail; it never prevents other rules from running or aborts the
//! event.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use taskflow_domain::entity::EntityModel;
use taskflow_domain::error::{NotFoundError, TaskflowError};
use taskflow_domain::event::{Event, EventOrigin, EventType, MAX_CASCADE_DEPTH, MutationEvent};
use taskflow_domain::field::FieldRegistry;
use taskflow_domain::id::{EntityId, TaskId};
use taskflow_domain::rule::AutomationRule;

use crate::evaluator;
use crate::materializer::TaskMaterializer;
use crate::ports::{
    ConfigStore, EntityGateway, EventPublisher, TaskRepository, UpsertOutcome,
};
use crate::synchronizer::LinkSynchronizer;

/// Summary of one pipeline invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub events_processed: usize,
    pub rules_fired: usize,
    pub tasks_created: usize,
    pub tasks_rescheduled: usize,
    pub tasks_completed: usize,
    pub fields_written: usize,
    /// Whether the hop-count guard dropped part of the cascade.
    pub cascade_aborted: bool,
}

impl ProcessReport {
    fn absorb(&mut self, other: ProcessReport) {
        self.events_processed += other.events_processed;
        self.rules_fired += other.rules_fired;
        self.tasks_created += other.tasks_created;
        self.tasks_rescheduled += other.tasks_rescheduled;
        self.tasks_completed += other.tasks_completed;
        self.fields_written += other.fields_written;
        self.cascade_aborted |= other.cascade_aborted;
    }
}

/// Keyed mutexes serializing work per entity identity.
#[derive(Default)]
struct EntityLocks {
    inner: Mutex<HashMap<(EntityModel, EntityId), Arc<tokio::sync::Mutex<()>>>>,
}

impl EntityLocks {
    async fn acquire(&self, model: EntityModel, entity_id: EntityId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().expect("entity lock registry poisoned");
            Arc::clone(
                locks
                    .entry((model, entity_id))
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

/// The wired engine: evaluator → materializer → synchronizer.
pub struct EventPipeline<C, TR, EG, P> {
    config: C,
    tasks: TR,
    materializer: TaskMaterializer<TR, P>,
    synchronizer: LinkSynchronizer<TR, EG, P>,
    publisher: P,
    locks: EntityLocks,
}

impl<C, TR, EG, P> EventPipeline<C, TR, EG, P>
where
    C: ConfigStore,
    TR: TaskRepository + Clone,
    EG: EntityGateway,
    P: EventPublisher + Clone,
{
    /// Wire a pipeline from its collaborators.
    pub fn new(config: C, tasks: TR, entities: EG, publisher: P) -> Self {
        Self {
            config,
            tasks: tasks.clone(),
            materializer: TaskMaterializer::new(tasks.clone(), publisher.clone()),
            synchronizer: LinkSynchronizer::new(tasks, entities, publisher.clone()),
            publisher,
            locks: EntityLocks::default(),
        }
    }

    /// Process one mutation event and the synthetic cascade it spawns.
    ///
    /// # Errors
    ///
    /// Returns an error only when configuration snapshots cannot be
    /// loaded; rule and link failures are isolated and logged instead.
    #[tracing::instrument(skip_all, fields(entity = %event.entity_id, model = %event.model))]
    pub async fn process(&self, event: MutationEvent) -> Result<ProcessReport, TaskflowError> {
        let mut report = ProcessReport::default();
        let mut written: HashSet<(EntityId, String)> = HashSet::new();
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            if event.origin.depth() >= MAX_CASCADE_DEPTH {
                report.cascade_aborted = true;
                tracing::warn!(
                    entity = %event.entity_id,
                    depth = event.origin.depth(),
                    "cascade depth exceeded, dropping synthetic propagation"
                );
                let audit = Event::new(
                    EventType::CascadeDepthExceeded,
                    None,
                    serde_json::json!({
                        "entity_id": event.entity_id,
                        "depth": event.origin.depth(),
                    }),
                );
                let _ = self.publisher.publish(audit).await;
                continue;
            }

            let _guard = self.locks.acquire(event.model, event.entity_id).await;
            report.events_processed += 1;

            let registry = self.config.registry().await?;
            let rules = self.config.rules().await?;
            let links = self.config.links().await?;

            for rule in evaluator::matching_rules(&rules, &event) {
                match self.apply_rule(rule, &event, &registry).await {
                    Ok(Some(applied)) => {
                        report.rules_fired += 1;
                        report.tasks_created += applied.created;
                        report.tasks_rescheduled += applied.rescheduled;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::error!(rule = %rule.name, error = %err, "rule failed, continuing with remaining rules");
                        let audit = Event::new(
                            EventType::RuleFailed,
                            None,
                            serde_json::json!({
                                "rule_id": rule.id,
                                "error": err.to_string(),
                            }),
                        );
                        let _ = self.publisher.publish(audit).await;
                    }
                }
            }

            let sync = self
                .synchronizer
                .evaluate_links(&event, &links, &registry, taskflow_domain::time::now())
                .await;
            report.tasks_completed += sync.completed;
            for synthetic in sync.synthetic {
                note_write(&mut written, &synthetic);
                report.fields_written += 1;
                queue.push_back(synthetic);
            }
        }

        Ok(report)
    }

    /// Complete a task on a user's behalf.
    ///
    /// Routes through the same completion path as auto-completion, so the
    /// link write-back fires and its synthetic event re-enters
    /// [`process`](Self::process).
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::NotFound`] for an unknown task id and
    /// [`TaskflowError::Validation`] when the task is already terminal.
    #[tracing::instrument(skip(self))]
    pub async fn complete_task(&self, task_id: TaskId) -> Result<ProcessReport, TaskflowError> {
        let task = self
            .tasks
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| NotFoundError {
                entity: "Task",
                id: task_id.to_string(),
            })?;

        let registry = self.config.registry().await?;
        let links = self.config.links().await?;

        let synthetic = {
            let _guard = self
                .locks
                .acquire(task.related.model, task.related.entity_id)
                .await;
            self.synchronizer
                .complete_task(
                    task,
                    taskflow_domain::time::now(),
                    EventOrigin::User,
                    false,
                    &links,
                    &registry,
                )
                .await?
            // Guard released here: the synthetic event re-acquires the
            // same entity lock inside process().
        };

        let mut report = ProcessReport {
            tasks_completed: 1,
            ..ProcessReport::default()
        };
        if let Some(event) = synthetic {
            report.fields_written += 1;
            report.absorb(self.process(event).await?);
        }
        Ok(report)
    }

    async fn apply_rule(
        &self,
        rule: &AutomationRule,
        event: &MutationEvent,
        registry: &FieldRegistry,
    ) -> Result<Option<RuleApplication>, TaskflowError> {
        if !evaluator::conditions_met(rule, &event.snapshot, registry)? {
            return Ok(None);
        }
        let audit = Event::new(
            EventType::RuleFired,
            None,
            serde_json::json!({
                "rule_id": rule.id,
                "rule_name": rule.name,
                "entity_id": event.entity_id,
            }),
        );
        let _ = self.publisher.publish(audit).await;

        let mut applied = RuleApplication::default();
        for action in &rule.actions {
            match self.materializer.apply(rule, action, event).await? {
                UpsertOutcome::Created(_) => applied.created += 1,
                UpsertOutcome::Rescheduled(_) => applied.rescheduled += 1,
                UpsertOutcome::Unchanged(_) => {}
            }
        }
        Ok(Some(applied))
    }
}

/// Record a write-back target; a repeat hit within the same root event
/// means two links contend for one field. Last write wins, by decision —
/// see the design notes on write-back conflicts.
fn note_write(written: &mut HashSet<(EntityId, String)>, synthetic: &MutationEvent) {
    for field in synthetic.changed_fields.keys() {
        if !written.insert((synthetic.entity_id, field.clone())) {
            tracing::warn!(
                entity = %synthetic.entity_id,
                field = %field,
                "conflicting write-backs target the same field; last write wins"
            );
        }
    }
}

#[derive(Debug, Default)]
struct RuleApplication {
    created: usize,
    rescheduled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::test_support::{InMemoryEntityStore, InMemoryTaskRepo, SpyPublisher};
    use crate::services::config_service::{ConfigService, StaticConfig};
    use taskflow_domain::entity::{EntityModel, EntitySnapshot};
    use taskflow_domain::field::{FieldDef, FieldRegistry, FieldType, FieldValue};
    use taskflow_domain::id::{EntityId, LinkId, RuleId, TaskId, TenantId};
    use taskflow_domain::link::{CompletionCondition, FieldLink, WriteBackAction};
    use taskflow_domain::rule::{
        Condition, CreateTaskAction, DueDateSpec, KeyTemplate, Operator, Trigger,
    };
    use taskflow_domain::task::{TaskPriority, TaskStatus};

    fn registry() -> FieldRegistry {
        FieldRegistry::builder()
            .field(EntityModel::Lead, FieldDef::new("status", FieldType::Text))
            .field(
                EntityModel::Lead,
                FieldDef::new("survey_date", FieldType::Date),
            )
            .field(
                EntityModel::Project,
                FieldDef::new("install_date", FieldType::Date),
            )
            .field(
                EntityModel::Project,
                FieldDef::new("blanks_date_ordered", FieldType::Date),
            )
            .field(
                EntityModel::Project,
                FieldDef::new("spray_date_ordered", FieldType::Date),
            )
            .build()
    }

    fn order_blanks_rule(linked: Option<LinkId>) -> AutomationRule {
        AutomationRule {
            id: RuleId::new(),
            name: "Order blanks before install".to_string(),
            enabled: true,
            trigger: Trigger::FieldUpdated {
                model: EntityModel::Project,
                field: "install_date".to_string(),
            },
            conditions: Vec::new(),
            actions: vec![CreateTaskAction {
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
                instance_key: KeyTemplate::new("order-blanks:{entity}"),
                linked_field: linked,
            }],
        }
    }

    struct Harness {
        pipeline: EventPipeline<StaticConfig, InMemoryTaskRepo, InMemoryEntityStore, SpyPublisher>,
        tasks: InMemoryTaskRepo,
        entities: InMemoryEntityStore,
        publisher: SpyPublisher,
    }

    fn harness(
        registry: FieldRegistry,
        rules: Vec<AutomationRule>,
        links: Vec<FieldLink>,
    ) -> Harness {
        let config = ConfigService::load(registry, rules, links, 1).unwrap();
        let tasks = InMemoryTaskRepo::default();
        let entities = InMemoryEntityStore::default();
        let publisher = SpyPublisher::default();
        let pipeline = EventPipeline::new(
            config,
            tasks.clone(),
            entities.clone(),
            publisher.clone(),
        );
        Harness {
            pipeline,
            tasks,
            entities,
            publisher,
        }
    }

    fn install_date_event(tenant: TenantId, entity_id: EntityId, date: &str) -> MutationEvent {
        let snapshot = EntitySnapshot::new(EntityModel::Project, entity_id)
            .with_field("install_date", FieldValue::Text(date.to_string()));
        MutationEvent::builder(tenant, snapshot)
            .change(
                "install_date",
                FieldValue::Null,
                FieldValue::Text(date.to_string()),
            )
            .build()
    }

    #[tokio::test]
    async fn should_create_exactly_one_task_and_be_idempotent_on_replay() {
        let h = harness(registry(), vec![order_blanks_rule(None)], Vec::new());
        let tenant = TenantId::new();
        let entity_id = EntityId::new();

        let event = install_date_event(tenant, entity_id, "2024-01-31");
        let first = h.pipeline.process(event.clone()).await.unwrap();
        assert_eq!(first.rules_fired, 1);
        assert_eq!(first.tasks_created, 1);
        assert_eq!(h.tasks.count(), 1);

        let replay = h.pipeline.process(event).await.unwrap();
        assert_eq!(replay.tasks_created, 0);
        assert_eq!(h.tasks.count(), 1);
    }

    #[tokio::test]
    async fn should_isolate_failing_rule_and_run_the_rest() {
        // First rule (lowest id) carries a condition that errors at
        // evaluation time; the second must still fire.
        let mut failing = order_blanks_rule(None);
        failing.id = RuleId::from_uuid(uuid::Uuid::from_u128(1));
        failing.conditions = vec![Condition {
            field: "install_date".to_string(),
            operator: Operator::Equals,
            value: FieldValue::Boolean(true),
        }];
        let mut healthy = order_blanks_rule(None);
        healthy.id = RuleId::from_uuid(uuid::Uuid::from_u128(2));
        healthy.actions[0].instance_key = KeyTemplate::new("order-blanks-2:{entity}");

        let h = harness(registry(), vec![failing, healthy], Vec::new());
        let report = h
            .pipeline
            .process(install_date_event(TenantId::new(), EntityId::new(), "2024-01-31"))
            .await
            .unwrap();

        assert_eq!(report.rules_fired, 1);
        assert_eq!(report.tasks_created, 1);
        assert_eq!(h.publisher.count_of(EventType::RuleFailed), 1);
    }

    #[tokio::test]
    async fn should_auto_complete_linked_task_and_write_back_in_same_pass() {
        let link_id = LinkId::new();
        let link = FieldLink {
            id: link_id,
            model: EntityModel::Project,
            field_path: "blanks_date_ordered".to_string(),
            label: None,
            completion: CompletionCondition::NonNull,
            on_complete: WriteBackAction::SetNow,
        };
        let h = harness(registry(), vec![order_blanks_rule(Some(link_id))], vec![link]);
        let tenant = TenantId::new();
        let entity_id = EntityId::new();

        // Rule fires and creates the linked task.
        h.pipeline
            .process(install_date_event(tenant, entity_id, "2024-03-01"))
            .await
            .unwrap();
        assert_eq!(h.tasks.count(), 1);

        // Field gets set → task auto-completes in the same pass, and the
        // write-back lands on the entity.
        let snapshot = EntitySnapshot::new(EntityModel::Project, entity_id)
            .with_field("blanks_date_ordered", FieldValue::Text("2024-05-01".to_string()));
        let event = MutationEvent::builder(tenant, snapshot)
            .change(
                "blanks_date_ordered",
                FieldValue::Null,
                FieldValue::Text("2024-05-01".to_string()),
            )
            .build();
        let report = h.pipeline.process(event).await.unwrap();

        assert_eq!(report.tasks_completed, 1);
        assert_eq!(report.fields_written, 1);
        let task = h.tasks.all().pop().unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert!(task.completed_at.is_some());
        assert!(matches!(
            h.entities
                .field(EntityModel::Project, entity_id, "blanks_date_ordered"),
            FieldValue::Date(_)
        ));
    }

    #[tokio::test]
    async fn should_write_back_exactly_once_when_user_completes_task() {
        let link_id = LinkId::new();
        let link = FieldLink {
            id: link_id,
            model: EntityModel::Project,
            field_path: "blanks_date_ordered".to_string(),
            label: None,
            completion: CompletionCondition::NonNull,
            on_complete: WriteBackAction::SetNow,
        };
        let h = harness(registry(), vec![order_blanks_rule(Some(link_id))], vec![link]);
        let tenant = TenantId::new();
        let entity_id = EntityId::new();

        h.pipeline
            .process(install_date_event(tenant, entity_id, "2024-03-01"))
            .await
            .unwrap();
        let task = h.tasks.all().pop().unwrap();

        let report = h.pipeline.complete_task(task.id).await.unwrap();

        // One write-back; the synthetic event it spawns re-evaluates the
        // link but finds no open task, so no second write happens.
        assert_eq!(report.tasks_completed, 1);
        assert_eq!(report.fields_written, 1);
        assert_eq!(h.publisher.count_of(EventType::FieldWrittenBack), 1);
        assert!(!report.cascade_aborted);
    }

    #[tokio::test]
    async fn should_error_when_completing_unknown_task() {
        let h = harness(registry(), Vec::new(), Vec::new());
        let result = h.pipeline.complete_task(TaskId::new()).await;
        assert!(matches!(result, Err(TaskflowError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_bound_runaway_link_cascade_with_hop_count_guard() {
        // A rule keyed on the linked field's *value* re-creates a fresh
        // linked task on every synthetic write: field set → task created
        // → link completes it → write-back changes the value → new key →
        // new task → … . Without the guard this never terminates.
        let link_id = LinkId::new();
        let link = FieldLink {
            id: link_id,
            model: EntityModel::Project,
            field_path: "blanks_date_ordered".to_string(),
            label: None,
            completion: CompletionCondition::NonNull,
            on_complete: WriteBackAction::SetNow,
        };
        let rule = AutomationRule {
            id: RuleId::new(),
            name: "Re-order on every change".to_string(),
            enabled: true,
            trigger: Trigger::FieldUpdated {
                model: EntityModel::Project,
                field: "blanks_date_ordered".to_string(),
            },
            conditions: Vec::new(),
            actions: vec![CreateTaskAction {
                title: "Order blanks".to_string(),
                description: None,
                kind: "order".to_string(),
                priority: TaskPriority::Medium,
                assign_to: None,
                due: DueDateSpec::FixedOffset { offset_days: 1 },
                reschedule_on_trigger_change: false,
                instance_key: KeyTemplate::new("cycle:{field:blanks_date_ordered}"),
                linked_field: Some(link_id),
            }],
        };

        // The field must be datetime-typed so each write-back produces a
        // distinct value (and therefore a distinct instance key).
        let registry = FieldRegistry::builder()
            .field(
                EntityModel::Project,
                FieldDef::new("blanks_date_ordered", FieldType::DateTime),
            )
            .build();
        let h = harness(registry, vec![rule], vec![link]);
        let tenant = TenantId::new();
        let entity_id = EntityId::new();

        let snapshot = EntitySnapshot::new(EntityModel::Project, entity_id).with_field(
            "blanks_date_ordered",
            FieldValue::Text("2024-05-01T09:00:00Z".to_string()),
        );
        let event = MutationEvent::builder(tenant, snapshot)
            .change(
                "blanks_date_ordered",
                FieldValue::Null,
                FieldValue::Text("2024-05-01T09:00:00Z".to_string()),
            )
            .build();

        let report = h.pipeline.process(event).await.unwrap();

        assert!(report.cascade_aborted);
        assert!(
            report.fields_written <= usize::from(MAX_CASCADE_DEPTH),
            "cascade must stay bounded, wrote {} fields",
            report.fields_written
        );
        assert_eq!(h.publisher.count_of(EventType::CascadeDepthExceeded), 1);
    }

    #[tokio::test]
    async fn should_skip_rules_for_other_models() {
        let h = harness(registry(), vec![order_blanks_rule(None)], Vec::new());
        let snapshot = EntitySnapshot::new(EntityModel::Lead, EntityId::new())
            .with_field("status", FieldValue::Text("won".to_string()));
        let event = MutationEvent::builder(TenantId::new(), snapshot)
            .change(
                "status",
                FieldValue::Null,
                FieldValue::Text("won".to_string()),
            )
            .build();
        let report = h.pipeline.process(event).await.unwrap();
        assert_eq!(report.rules_fired, 0);
        assert_eq!(h.tasks.count(), 0);
    }
}
