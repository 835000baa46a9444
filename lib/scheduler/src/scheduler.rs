//! Trigger Scheduler.
//!
//! On every tick the scheduler reads the active workflows, evaluates each
//! schedule trigger node against the current wall-clock minute and hands
//! matching workflows to a [`TriggerSink`]. A workflow fires at most once per
//! minute, however many ticks land inside it.

use crate::error::TriggerEvaluationError;
use crate::schedule::ScheduleRule;
use async_trait::async_trait;
use aura_core::WorkflowId;
use aura_workflow::{
    ExecutionMode, Node, NodeTypeRegistry, TriggerKind, Workflow, WorkflowStore,
};
use chrono::{DateTime, Local, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Clock that schedule times are interpreted in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallClock {
    #[default]
    Local,
    Utc,
}

impl WallClock {
    /// Converts an instant to this clock's wall time, truncated to the minute.
    #[must_use]
    pub fn minute_of(self, now: DateTime<Utc>) -> NaiveDateTime {
        let naive = match self {
            Self::Local => now.with_timezone(&Local).naive_local(),
            Self::Utc => now.naive_utc(),
        };
        naive
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(naive)
    }
}

/// Receives workflows whose triggers fired.
#[async_trait]
pub trait TriggerSink: Send + Sync {
    async fn enqueue(&self, workflow_id: WorkflowId, mode: ExecutionMode);
}

/// Evaluates schedule triggers.
pub struct TriggerScheduler {
    store: Arc<WorkflowStore>,
    registry: Arc<NodeTypeRegistry>,
    clock: WallClock,
    last_fired: Mutex<HashMap<WorkflowId, NaiveDateTime>>,
}

impl TriggerScheduler {
    #[must_use]
    pub fn new(store: Arc<WorkflowStore>, registry: Arc<NodeTypeRegistry>) -> Self {
        Self {
            store,
            registry,
            clock: WallClock::default(),
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: WallClock) -> Self {
        self.clock = clock;
        self
    }

    /// Runs one evaluation pass as of `now`.
    ///
    /// Returns the workflows that fired. Evaluation failures are logged and
    /// skipped.
    pub async fn tick(&self, now: DateTime<Utc>, sink: &dyn TriggerSink) -> Vec<WorkflowId> {
        let minute = self.clock.minute_of(now);
        let workflows = match self.store.list().await {
            Ok(workflows) => workflows,
            Err(e) => {
                let error = TriggerEvaluationError::Storage {
                    reason: e.to_string(),
                };
                warn!(error = %error, "trigger evaluation failed");
                return Vec::new();
            }
        };

        let mut fired = Vec::new();
        for workflow in workflows.iter().filter(|w| w.active) {
            if !self.is_due(workflow, minute) {
                continue;
            }
            if !self.claim(workflow.id, minute) {
                debug!(workflow_id = %workflow.id, %minute, "already fired this minute");
                continue;
            }
            info!(workflow_id = %workflow.id, %minute, "schedule trigger fired");
            sink.enqueue(workflow.id, ExecutionMode::Schedule).await;
            fired.push(workflow.id);
        }
        fired
    }

    fn is_due(&self, workflow: &Workflow, minute: NaiveDateTime) -> bool {
        let mut due = false;
        for node in &workflow.nodes {
            match self.evaluate(workflow, node, minute) {
                Ok(matched) => due |= matched,
                Err(error) => warn!(error = %error, "trigger evaluation failed"),
            }
        }
        due
    }

    /// Returns whether `node` is a schedule trigger matching `minute`.
    ///
    /// # Errors
    ///
    /// Returns a [`TriggerEvaluationError`] if the node's type is unknown or
    /// its schedule parameters are unusable.
    pub fn evaluate(
        &self,
        workflow: &Workflow,
        node: &Node,
        minute: NaiveDateTime,
    ) -> Result<bool, TriggerEvaluationError> {
        let node_type = self.registry.get(&node.type_name).ok_or_else(|| {
            TriggerEvaluationError::UnknownNodeType {
                workflow_id: workflow.id,
                node_id: node.id.clone(),
                type_name: node.type_name.clone(),
            }
        })?;
        if node_type.trigger_kind() != Some(TriggerKind::Schedule) {
            return Ok(false);
        }

        let invalid = |reason: String| TriggerEvaluationError::InvalidSchedule {
            workflow_id: workflow.id,
            node_id: node.id.clone(),
            reason,
        };
        let params = node_type
            .descriptor()
            .resolve_parameters(&node.parameters)
            .map_err(|e| invalid(e.to_string()))?;
        let rule = ScheduleRule::from_parameters(&params).map_err(|e| invalid(e.to_string()))?;
        Ok(rule.matches(minute))
    }

    /// Records that `workflow_id` fired in `minute`. Returns false if it
    /// already had.
    fn claim(&self, workflow_id: WorkflowId, minute: NaiveDateTime) -> bool {
        let mut last_fired = self
            .last_fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last_fired.retain(|_, fired| *fired == minute);
        if last_fired.get(&workflow_id) == Some(&minute) {
            return false;
        }
        last_fired.insert(workflow_id, minute);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_workflow::WorkflowDefinition;
    use aura_workflow::nodes::{MANUAL_TRIGGER, SCHEDULE_TRIGGER, manual_trigger, schedule_trigger};
    use chrono::TimeZone;
    use serde_json::{Value as JsonValue, json};

    #[derive(Default)]
    struct RecordingSink {
        enqueued: Mutex<Vec<(WorkflowId, ExecutionMode)>>,
    }

    impl RecordingSink {
        fn enqueued(&self) -> Vec<(WorkflowId, ExecutionMode)> {
            self.enqueued.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TriggerSink for RecordingSink {
        async fn enqueue(&self, workflow_id: WorkflowId, mode: ExecutionMode) {
            self.enqueued.lock().unwrap().push((workflow_id, mode));
        }
    }

    fn scheduler() -> (Arc<WorkflowStore>, TriggerScheduler) {
        let registry = NodeTypeRegistry::new();
        registry.register(schedule_trigger());
        registry.register(manual_trigger());
        let store = Arc::new(WorkflowStore::in_memory());
        let scheduler = TriggerScheduler::new(Arc::clone(&store), Arc::new(registry))
            .with_clock(WallClock::Utc);
        (store, scheduler)
    }

    fn scheduled(name: &str, parameters: JsonValue) -> WorkflowDefinition {
        WorkflowDefinition::new(name)
            .with_node(Node::new("trigger", "Trigger", SCHEDULE_TRIGGER).with_parameters(parameters))
            .active(true)
    }

    fn utc(day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, hour, minute, second)
            .single()
            .expect("valid instant")
    }

    #[test]
    fn utc_clock_truncates_to_the_minute() {
        let minute = WallClock::Utc.minute_of(utc(19, 9, 0, 42));
        assert_eq!(minute.to_string(), "2026-10-19 09:00:00");
    }

    #[tokio::test]
    async fn fires_once_per_matching_minute() {
        let (store, scheduler) = scheduler();
        let workflow = store
            .create(scheduled("digest", json!({"schedule": "daily", "time": "09:00"})))
            .await
            .expect("create");
        let sink = RecordingSink::default();

        assert_eq!(scheduler.tick(utc(19, 9, 0, 5), &sink).await, [workflow.id]);
        assert!(scheduler.tick(utc(19, 9, 0, 40), &sink).await.is_empty());
        assert!(scheduler.tick(utc(19, 9, 1, 5), &sink).await.is_empty());
        assert_eq!(scheduler.tick(utc(20, 9, 0, 5), &sink).await, [workflow.id]);

        assert_eq!(
            sink.enqueued(),
            [
                (workflow.id, ExecutionMode::Schedule),
                (workflow.id, ExecutionMode::Schedule)
            ]
        );
    }

    #[tokio::test]
    async fn inactive_and_manual_workflows_do_not_fire() {
        let (store, scheduler) = scheduler();
        store
            .create(scheduled("paused", json!({"time": "09:00"})).active(false))
            .await
            .expect("create");
        store
            .create(
                WorkflowDefinition::new("by hand")
                    .with_node(Node::new("t", "Start", MANUAL_TRIGGER))
                    .active(true),
            )
            .await
            .expect("create");
        let sink = RecordingSink::default();

        assert!(scheduler.tick(utc(19, 9, 0, 0), &sink).await.is_empty());
        assert!(sink.enqueued().is_empty());
    }

    #[tokio::test]
    async fn broken_triggers_do_not_block_others() {
        let (store, scheduler) = scheduler();
        store
            .create(scheduled("broken", json!({"time": "nine o'clock"})))
            .await
            .expect("create");
        let with_draft_node = store
            .create(
                scheduled("draft", json!({"time": "09:00"}))
                    .with_node(Node::new("later", "Later", "notWrittenYet")),
            )
            .await
            .expect("create");
        let healthy = store
            .create(scheduled("healthy", json!({"time": "09:00"})))
            .await
            .expect("create");
        let sink = RecordingSink::default();

        let mut fired = scheduler.tick(utc(19, 9, 0, 0), &sink).await;
        fired.sort();
        let mut expected = vec![with_draft_node.id, healthy.id];
        expected.sort();
        assert_eq!(fired, expected);
    }

    #[tokio::test]
    async fn evaluate_reports_why_a_trigger_is_unusable() {
        let (store, scheduler) = scheduler();
        let workflow = store
            .create(scheduled("cron", json!({"schedule": "cron", "cron_expression": "every day"})))
            .await
            .expect("create");
        let minute = WallClock::Utc.minute_of(utc(19, 9, 0, 0));

        let err = scheduler
            .evaluate(&workflow, &workflow.nodes[0], minute)
            .unwrap_err();
        assert!(matches!(err, TriggerEvaluationError::InvalidSchedule { .. }));

        let missing_expression = store
            .create(scheduled("cron", json!({"schedule": "cron"})))
            .await
            .expect("create");
        let err = scheduler
            .evaluate(&missing_expression, &missing_expression.nodes[0], minute)
            .unwrap_err();
        assert!(err.to_string().contains("required"), "{err}");
    }

    #[tokio::test]
    async fn weekly_trigger_uses_weekday() {
        let (store, scheduler) = scheduler();
        let workflow = store
            .create(scheduled(
                "weekly",
                json!({"schedule": "weekly", "time": "08:15", "weekday": "tuesday"}),
            ))
            .await
            .expect("create");
        let sink = RecordingSink::default();

        assert!(scheduler.tick(utc(19, 8, 15, 0), &sink).await.is_empty());
        assert_eq!(scheduler.tick(utc(20, 8, 15, 0), &sink).await, [workflow.id]);
    }
}
