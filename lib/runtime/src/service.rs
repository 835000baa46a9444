//! Automation service.
//!
//! The facade that owns the registry, store, ledger, run queue and
//! publisher, and the three periodic tasks that drive them:
//!
//! - **scheduler**: evaluates schedule triggers and enqueues due workflows
//! - **drain**: moves queued runs onto worker tasks while permits remain
//! - **broadcast**: prunes expired history and publishes a [`SystemStatus`]
//!   snapshot
//!
//! Every execution runs on its own task holding one worker permit.

use crate::config::RuntimeConfig;
use crate::error::{ServiceError, SubscriberCallbackError};
use crate::publisher::{StatusPublisher, Subscription};
use crate::queue::{QueuedRun, RunQueue};
use crate::status::{ExecutionSummary, ExecutionUpdate, StatusEvent, SystemStatus};
use async_trait::async_trait;
use aura_core::{ExecutionId, IdGenerator, WorkflowId};
use aura_scheduler::{TriggerScheduler, TriggerSink, WallClock};
use aura_workflow::{
    ErrorInfo, Execution, ExecutionEngine, ExecutionLedger, ExecutionMode, ExecutionObserver,
    ExecutionStatus, NodeType, NodeTypeRegistry, Row, RunRequest, ValidationError, Workflow,
    WorkflowDefinition, WorkflowError, WorkflowPatch, WorkflowStore,
};
use chrono::Utc;
use futures::FutureExt;
use rootcause::Report;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Periodic task settings derived from [`RuntimeConfig`].
#[derive(Debug, Clone, Copy)]
struct Intervals {
    scheduler: Duration,
    drain: Duration,
    broadcast: Duration,
}

struct Inner {
    registry: Arc<NodeTypeRegistry>,
    store: Arc<WorkflowStore>,
    engine: ExecutionEngine,
    ledger: ExecutionLedger,
    queue: RunQueue,
    publisher: StatusPublisher,
    scheduler: TriggerScheduler,
    ids: IdGenerator,
    workers: Arc<Semaphore>,
    worker_count: usize,
    recent_executions: usize,
    shutdown: CancellationToken,
    in_flight: Mutex<HashMap<ExecutionId, CancellationToken>>,
    live: AtomicBool,
}

/// Programmatic surface of the automation platform.
pub struct AutomationService {
    inner: Arc<Inner>,
    intervals: Intervals,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AutomationService {
    #[must_use]
    pub fn new(
        config: &RuntimeConfig,
        store: Arc<WorkflowStore>,
        registry: Arc<NodeTypeRegistry>,
    ) -> Self {
        let clock = if config.scheduler.use_utc {
            WallClock::Utc
        } else {
            WallClock::Local
        };
        let worker_count = config.queue.workers.max(1);
        let inner = Inner {
            engine: ExecutionEngine::new(Arc::clone(&registry))
                .with_default_timeout(config.execution.default_timeout()),
            scheduler: TriggerScheduler::new(Arc::clone(&store), Arc::clone(&registry))
                .with_clock(clock),
            registry,
            store,
            ledger: ExecutionLedger::new(config.ledger.retention()),
            queue: RunQueue::new(),
            publisher: StatusPublisher::new(),
            ids: IdGenerator::new(),
            workers: Arc::new(Semaphore::new(worker_count)),
            worker_count,
            recent_executions: config.status.recent_executions,
            shutdown: CancellationToken::new(),
            in_flight: Mutex::new(HashMap::new()),
            live: AtomicBool::new(false),
        };
        Self {
            inner: Arc::new(inner),
            intervals: Intervals {
                scheduler: config.scheduler.tick_interval(),
                drain: config.queue.poll_interval(),
                broadcast: config.status.broadcast_interval(),
            },
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn register_node_type(&self, node_type: NodeType) {
        self.inner.registry.register(node_type);
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.inner.registry
    }

    /// # Errors
    ///
    /// Returns an error if the definition is invalid or cannot be stored.
    pub async fn create_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> aura_core::Result<Workflow, WorkflowError> {
        self.inner.store.create(definition).await
    }

    /// # Errors
    ///
    /// Returns an error if the stored record cannot be read.
    pub async fn get_workflow(
        &self,
        id: WorkflowId,
    ) -> aura_core::Result<Option<Workflow>, WorkflowError> {
        self.inner.store.get(id).await
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    pub async fn list_workflows(&self) -> aura_core::Result<Vec<Workflow>, WorkflowError> {
        self.inner.store.list().await
    }

    /// # Errors
    ///
    /// Returns an error if the workflow is missing, the result is invalid, or
    /// it cannot be stored.
    pub async fn update_workflow(
        &self,
        id: WorkflowId,
        patch: WorkflowPatch,
    ) -> aura_core::Result<Workflow, WorkflowError> {
        self.inner.store.update(id, patch).await
    }

    /// # Errors
    ///
    /// Returns an error if the workflow is missing or cannot be stored.
    pub async fn set_workflow_active(
        &self,
        id: WorkflowId,
        active: bool,
    ) -> aura_core::Result<Workflow, WorkflowError> {
        self.inner.store.set_active(id, active).await
    }

    /// Queues a manual run and returns its execution id immediately.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the workflow does not exist.
    pub async fn execute_workflow_manually(
        &self,
        workflow_id: WorkflowId,
    ) -> aura_core::Result<ExecutionId, WorkflowError> {
        if self.inner.store.get(workflow_id).await?.is_none() {
            return Err(WorkflowError::from(ValidationError::UnknownWorkflow { workflow_id }).into());
        }
        Ok(self.inner.enqueue(workflow_id, ExecutionMode::Manual, None))
    }

    #[must_use]
    pub fn get_execution(&self, id: ExecutionId) -> Option<Execution> {
        self.inner.ledger.get(id)
    }

    /// All retained executions, most recent first.
    #[must_use]
    pub fn list_executions(&self) -> Vec<Execution> {
        self.inner.ledger.list()
    }

    /// Cancels a queued or running execution.
    ///
    /// Running executions stop at their next await point. Returns false if
    /// the id is neither queued nor running.
    pub fn cancel_execution(&self, id: ExecutionId) -> bool {
        let (queued, token) = {
            let in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match self.inner.queue.remove(id) {
                Some(run) => (Some(run), None),
                None => (None, in_flight.get(&id).cloned()),
            }
        };
        if let Some(run) = queued {
            info!(execution_id = %id, "queued execution canceled");
            self.inner.publish_update(ExecutionUpdate::abandoned(
                &run,
                ExecutionStatus::Canceled,
                None,
            ));
            return true;
        }
        match token {
            Some(token) => {
                info!(execution_id = %id, "canceling running execution");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn system_status(&self) -> SystemStatus {
        self.inner.system_status().await
    }

    /// Registers a callback for status events.
    pub fn subscribe_to_updates<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StatusEvent) -> Result<(), SubscriberCallbackError> + Send + Sync + 'static,
    {
        self.inner.publisher.subscribe(callback)
    }

    /// Starts the periodic tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is already running or was shut down.
    pub fn start(&self) -> Result<(), Report<ServiceError>> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ServiceError::ShutDown.into());
        }
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return Err(ServiceError::AlreadyStarted.into());
        }

        let inner = Arc::clone(&self.inner);
        tasks.push(self.spawn_periodic("scheduler", self.intervals.scheduler, move || {
            let inner = Arc::clone(&inner);
            async move {
                inner.scheduler.tick(Utc::now(), inner.as_ref()).await;
            }
        }));

        let inner = Arc::clone(&self.inner);
        tasks.push(self.spawn_periodic("drain", self.intervals.drain, move || {
            let inner = Arc::clone(&inner);
            async move { inner.drain() }
        }));

        let inner = Arc::clone(&self.inner);
        tasks.push(self.spawn_periodic("broadcast", self.intervals.broadcast, move || {
            let inner = Arc::clone(&inner);
            async move {
                let evicted = inner.ledger.prune(Utc::now());
                if evicted > 0 {
                    debug!(evicted, "expired executions pruned");
                }
                let status = inner.system_status().await;
                let report = inner.publisher.publish(&StatusEvent::System(status));
                debug!(delivered = report.delivered, failed = report.failed, "status broadcast");
            }
        }));

        self.inner.live.store(true, Ordering::Release);
        info!(
            workers = self.inner.worker_count,
            scheduler_secs = self.intervals.scheduler.as_secs(),
            "automation service started"
        );
        Ok(())
    }

    /// Stops the periodic tasks and cancels in-flight executions, waiting
    /// for them to record their final state.
    pub async fn shutdown(&self) {
        info!("automation service shutting down");
        self.inner.live.store(false, Ordering::Release);
        self.inner.shutdown.cancel();

        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "periodic task ended abnormally");
            }
        }

        let permits = u32::try_from(self.inner.worker_count).unwrap_or(u32::MAX);
        match self.inner.workers.acquire_many(permits).await {
            Ok(_all) => debug!("all executions finished"),
            Err(e) => warn!(error = %e, "worker pool closed early"),
        }
        info!(queued = self.inner.queue.len(), "automation service stopped");
    }

    fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, work: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if AssertUnwindSafe(work()).catch_unwind().await.is_err() {
                    error!(task = name, "periodic task panicked");
                }
            }
            debug!(task = name, "periodic task stopped");
        })
    }
}

impl std::fmt::Debug for AutomationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationService")
            .field("workers", &self.inner.worker_count)
            .field("queue_depth", &self.inner.queue.len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn enqueue(&self, workflow_id: WorkflowId, mode: ExecutionMode, seed: Option<Row>) -> ExecutionId {
        let run = QueuedRun::new(self.ids.next_id(), workflow_id, mode, seed);
        let execution_id = run.execution_id;
        let update = ExecutionUpdate::queued(&run);
        self.queue.push(run);
        debug!(%execution_id, %workflow_id, mode = mode.as_str(), "run queued");
        self.publish_update(update);
        execution_id
    }

    fn publish_update(&self, update: ExecutionUpdate) {
        self.publisher.publish(&StatusEvent::Execution(update));
    }

    /// Starts queued runs until the queue is empty or every worker is busy.
    fn drain(self: &Arc<Self>) {
        while !self.queue.is_empty() {
            let Ok(permit) = Arc::clone(&self.workers).try_acquire_owned() else {
                debug!(queued = self.queue.len(), "all workers busy");
                return;
            };
            let Some((run, cancel)) = self.dequeue() else {
                return;
            };
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner.execute(run, cancel).await;
                drop(permit);
            });
        }
    }

    /// Pops the next run and registers its cancel token. Both happen under
    /// the in-flight lock, which `cancel_execution` also holds while it
    /// looks a run up.
    fn dequeue(&self) -> Option<(QueuedRun, CancellationToken)> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let run = self.queue.pop()?;
        let cancel = self.shutdown.child_token();
        in_flight.insert(run.execution_id, cancel.clone());
        Some((run, cancel))
    }

    fn untrack(&self, execution_id: ExecutionId) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&execution_id);
    }

    async fn execute(self: &Arc<Self>, run: QueuedRun, cancel: CancellationToken) {
        let loaded = match self.store.get(run.workflow_id).await {
            Ok(Some(workflow)) => Ok(workflow),
            Ok(None) => {
                warn!(execution_id = %run.execution_id, workflow_id = %run.workflow_id, "queued workflow no longer exists");
                Err(ErrorInfo {
                    name: "UnknownWorkflow".to_string(),
                    message: ValidationError::UnknownWorkflow {
                        workflow_id: run.workflow_id,
                    }
                    .to_string(),
                    node_id: None,
                    causes: Vec::new(),
                })
            }
            Err(e) => {
                warn!(execution_id = %run.execution_id, error = %e, "could not load queued workflow");
                Err(ErrorInfo {
                    name: "StorageError".to_string(),
                    message: e.to_string(),
                    node_id: None,
                    causes: Vec::new(),
                })
            }
        };
        let workflow = match loaded {
            Ok(workflow) => workflow,
            Err(error) => {
                let execution =
                    Execution::abandoned(run.execution_id, run.workflow_id, run.mode, error);
                self.ledger.upsert(execution.clone());
                self.untrack(run.execution_id);
                self.publish_update(ExecutionUpdate::from(&execution));
                return;
            }
        };

        let request = RunRequest {
            execution_id: run.execution_id,
            workflow,
            mode: run.mode,
            seed: run.seed,
        };
        let execution = self
            .engine
            .run(request, cancel, &LedgerObserver { inner: self })
            .await;

        self.untrack(execution.id);
        self.chain_error_workflow(&execution);
    }

    /// Queues the workflow's error workflow when an execution fails.
    fn chain_error_workflow(&self, execution: &Execution) {
        if execution.status != ExecutionStatus::Error || execution.mode == ExecutionMode::ErrorWorkflow {
            return;
        }
        let Some(target) = execution.workflow.settings.error_workflow else {
            return;
        };
        let error = execution.error.as_ref();
        let seed = json!({
            "execution": {
                "id": execution.id.to_string(),
                "error": {
                    "name": error.map(|e| e.name.clone()),
                    "message": error.map(|e| e.message.clone()),
                    "node_id": error.and_then(|e| e.node_id.as_ref()).map(ToString::to_string),
                },
            },
            "workflow": {
                "id": execution.workflow_id.to_string(),
                "name": execution.workflow.name,
            },
        });
        info!(execution_id = %execution.id, error_workflow = %target, "queueing error workflow");
        self.enqueue(target, ExecutionMode::ErrorWorkflow, seed.as_object().cloned());
    }

    /// Writes the final record according to the workflow's retention flags.
    fn retain(&self, execution: &Execution) {
        let settings = &execution.workflow.settings;
        let keep = match execution.status {
            ExecutionStatus::Success => settings.save_successful_executions,
            ExecutionStatus::Error => settings.save_failed_executions,
            _ => true,
        };
        if !keep {
            self.ledger.remove(execution.id);
            debug!(execution_id = %execution.id, "execution not retained");
            return;
        }
        let record = if settings.save_execution_data {
            execution.clone()
        } else {
            execution.clone().without_output_data()
        };
        self.ledger.upsert(record);
    }

    async fn system_status(&self) -> SystemStatus {
        let (workflow_count, active_workflow_count) = match self.store.list().await {
            Ok(workflows) => (
                workflows.len(),
                workflows.iter().filter(|w| w.active).count(),
            ),
            Err(e) => {
                warn!(error = %e, "could not count workflows");
                (0, 0)
            }
        };
        SystemStatus {
            is_live: self.live.load(Ordering::Acquire) && !self.shutdown.is_cancelled(),
            workflow_count,
            active_workflow_count,
            total_executions: self.ledger.len(),
            node_type_count: self.registry.len(),
            queue_depth: self.queue.len(),
            recent_executions: self
                .ledger
                .recent(self.recent_executions)
                .iter()
                .map(ExecutionSummary::from)
                .collect(),
            generated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl TriggerSink for Inner {
    async fn enqueue(&self, workflow_id: WorkflowId, mode: ExecutionMode) {
        Inner::enqueue(self, workflow_id, mode, None);
    }
}

/// Keeps the ledger and subscribers in step with a running execution.
struct LedgerObserver<'a> {
    inner: &'a Inner,
}

impl ExecutionObserver for LedgerObserver<'_> {
    fn execution_started(&self, execution: &Execution) {
        self.inner.ledger.upsert(execution.clone());
        self.inner.publish_update(ExecutionUpdate::from(execution));
    }

    fn execution_finished(&self, execution: &Execution) {
        self.inner.retain(execution);
        self.inner.publish_update(ExecutionUpdate::from(execution));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_ai::CannedGenerator;
    use aura_integration::{Outbox, ReqwestCaller};
    use aura_workflow::nodes::{GENERATE_TEXT, MANUAL_TRIGGER, SCHEDULE_TRIGGER, SET_DATA};
    use aura_workflow::{
        Capabilities, InMemoryKeyValueStore, KeyValueStore, Node, NodeBehavior, NodeContext,
        NodeError, NodeGroup, NodeTypeDescriptor, Parameters, StoreError, WorkflowSettings,
        register_builtin,
    };
    use serde_json::Value as JsonValue;

    struct Boom;

    #[async_trait]
    impl NodeBehavior for Boom {
        async fn execute(
            &self,
            _ctx: &NodeContext,
            _params: &Parameters,
            _inputs: Vec<Row>,
        ) -> Result<Vec<Row>, NodeError> {
            Err(NodeError::failed("boom"))
        }
    }

    struct Slow;

    #[async_trait]
    impl NodeBehavior for Slow {
        async fn execute(
            &self,
            _ctx: &NodeContext,
            _params: &Parameters,
            inputs: Vec<Row>,
        ) -> Result<Vec<Row>, NodeError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(inputs)
        }
    }

    fn config(workers: usize) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.queue.workers = workers;
        config.queue.poll_interval_ms = 10;
        config.scheduler.use_utc = true;
        config
    }

    /// Backend whose reads take `delay`.
    struct SlowReads {
        delay: Duration,
        inner: InMemoryKeyValueStore,
    }

    #[async_trait]
    impl KeyValueStore for SlowReads {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
            self.inner.put(key, value).await
        }

        async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.keys(prefix).await
        }
    }

    fn service_with(config: &RuntimeConfig) -> AutomationService {
        service_over(config, WorkflowStore::in_memory())
    }

    fn service_over(config: &RuntimeConfig, store: WorkflowStore) -> AutomationService {
        let registry = NodeTypeRegistry::new();
        register_builtin(
            &registry,
            &Capabilities {
                generator: Arc::new(CannedGenerator::new()),
                messenger: Arc::new(Outbox::new()),
                http: Arc::new(ReqwestCaller::new(Duration::from_secs(1)).expect("http client")),
            },
        );
        registry.register(NodeType::new(
            NodeTypeDescriptor::new("boom", "Boom", NodeGroup::Action),
            Boom,
        ));
        registry.register(NodeType::new(
            NodeTypeDescriptor::new("slow", "Slow", NodeGroup::Action),
            Slow,
        ));
        AutomationService::new(config, Arc::new(store), Arc::new(registry))
    }

    fn service() -> AutomationService {
        service_with(&config(4))
    }

    fn digest() -> WorkflowDefinition {
        WorkflowDefinition::new("digest")
            .with_node(
                Node::new("trigger", "Every morning", SCHEDULE_TRIGGER)
                    .with_parameters(json!({"schedule": "daily", "time": "09:00"})),
            )
            .with_node(
                Node::new("topic", "Topic", SET_DATA)
                    .with_parameters(json!({"values": {"topic": "demo"}})),
            )
            .with_node(
                Node::new("write", "Write", GENERATE_TEXT)
                    .with_parameters(json!({"prompt": "write about {{topic}}"})),
            )
            .connect("trigger", "topic")
            .connect("topic", "write")
    }

    fn failing(settings: WorkflowSettings) -> WorkflowDefinition {
        WorkflowDefinition::new("fails")
            .with_node(Node::new("b", "Boom", "boom"))
            .with_settings(settings)
    }

    fn slow() -> WorkflowDefinition {
        WorkflowDefinition::new("slow")
            .with_node(Node::new("t", "Start", MANUAL_TRIGGER))
            .with_node(Node::new("s", "Slow", "slow"))
            .connect("t", "s")
    }

    /// Polls until `check` holds, failing the test after five seconds.
    async fn eventually<T>(mut check: impl FnMut() -> Option<T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(value) = check() {
                    return value;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time")
    }

    async fn finished(service: &AutomationService, id: ExecutionId) -> Execution {
        eventually(|| service.get_execution(id).filter(|e| e.finished)).await
    }

    #[tokio::test]
    async fn manual_run_reaches_subscribers_and_ledger() {
        let service = service();
        let updates = Arc::new(Mutex::new(Vec::new()));
        let _subscription = {
            let updates = Arc::clone(&updates);
            service.subscribe_to_updates(move |event| {
                if let Some(update) = event.as_execution() {
                    updates.lock().unwrap().push((update.execution_id, update.status));
                }
                Ok(())
            })
        };
        service.start().expect("start");

        let workflow = service.create_workflow(digest()).await.expect("create");
        let id = service
            .execute_workflow_manually(workflow.id)
            .await
            .expect("queued");
        let execution = finished(&service, id).await;

        assert_eq!(execution.status, ExecutionStatus::Success);
        assert_eq!(execution.mode, ExecutionMode::Manual);
        let order: Vec<&str> = execution.results.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(order, ["trigger", "topic", "write"]);
        let text = execution.results[2].output[0]["text"].as_str().unwrap_or_default();
        assert!(!text.is_empty());

        let statuses = eventually(|| {
            let seen: Vec<ExecutionStatus> = updates
                .lock()
                .unwrap()
                .iter()
                .filter(|(execution_id, _)| *execution_id == id)
                .map(|(_, status)| *status)
                .collect();
            seen.last().is_some_and(ExecutionStatus::is_terminal).then_some(seen)
        })
        .await;
        assert_eq!(
            statuses,
            [
                ExecutionStatus::Queued,
                ExecutionStatus::Running,
                ExecutionStatus::Success
            ]
        );

        service.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_workflow_is_rejected() {
        let service = service();
        let err = service
            .execute_workflow_manually(WorkflowId::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown workflow"), "{err}");
        assert_eq!(service.inner.queue.len(), 0);
    }

    #[tokio::test]
    async fn concurrent_manual_runs_get_distinct_ids() {
        let service = Arc::new(service());
        let workflow = service.create_workflow(digest()).await.expect("create");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.execute_workflow_manually(workflow.id).await })
            })
            .collect();
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.expect("join").expect("queued"));
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 16);
        assert_eq!(service.inner.queue.len(), 16);
    }

    #[tokio::test]
    async fn failed_run_is_recorded_with_its_error() {
        let service = service();
        service.start().expect("start");
        let workflow = service
            .create_workflow(failing(WorkflowSettings::default()))
            .await
            .expect("create");

        let id = service
            .execute_workflow_manually(workflow.id)
            .await
            .expect("queued");
        let execution = finished(&service, id).await;

        assert_eq!(execution.status, ExecutionStatus::Error);
        assert_eq!(execution.results.len(), 1);
        assert_eq!(execution.error.map(|e| e.message), Some("boom".to_string()));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn error_workflow_receives_failure_details_and_does_not_chain() {
        let service = service();
        service.start().expect("start");
        let handler = service
            .create_workflow(
                WorkflowDefinition::new("on failure")
                    .with_node(Node::new("t", "Start", MANUAL_TRIGGER))
                    .with_node(Node::new("b", "Boom", "boom"))
                    .connect("t", "b"),
            )
            .await
            .expect("create");
        service
            .update_workflow(
                handler.id,
                WorkflowPatch::default().with_settings(WorkflowSettings {
                    error_workflow: Some(handler.id),
                    ..WorkflowSettings::default()
                }),
            )
            .await
            .expect("point handler at itself");
        let workflow = service
            .create_workflow(failing(WorkflowSettings {
                error_workflow: Some(handler.id),
                ..WorkflowSettings::default()
            }))
            .await
            .expect("create");

        let id = service
            .execute_workflow_manually(workflow.id)
            .await
            .expect("queued");
        finished(&service, id).await;

        let handled = eventually(|| {
            service
                .list_executions()
                .into_iter()
                .find(|e| e.mode == ExecutionMode::ErrorWorkflow && e.finished)
        })
        .await;
        assert_eq!(handled.workflow_id, handler.id);
        let seed = &handled.results[0].output[0];
        assert_eq!(seed["execution"]["id"], JsonValue::String(id.to_string()));
        assert_eq!(seed["execution"]["error"]["message"], json!("boom"));
        assert_eq!(seed["execution"]["error"]["node_id"], json!("b"));
        assert_eq!(seed["workflow"]["name"], json!("fails"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(service.list_executions().len(), 2);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn retention_flags_shape_the_ledger() {
        let service = service();
        service.start().expect("start");
        let unsaved = service
            .create_workflow(digest().with_settings(WorkflowSettings {
                save_successful_executions: false,
                ..WorkflowSettings::default()
            }))
            .await
            .expect("create");
        let stripped = service
            .create_workflow(digest().with_settings(WorkflowSettings {
                save_execution_data: false,
                ..WorkflowSettings::default()
            }))
            .await
            .expect("create");

        let updates = Arc::new(Mutex::new(Vec::new()));
        let _subscription = {
            let updates = Arc::clone(&updates);
            service.subscribe_to_updates(move |event| {
                if let Some(update) = event.as_execution() {
                    updates.lock().unwrap().push((update.execution_id, update.status));
                }
                Ok(())
            })
        };

        let dropped = service
            .execute_workflow_manually(unsaved.id)
            .await
            .expect("queued");
        let kept = service
            .execute_workflow_manually(stripped.id)
            .await
            .expect("queued");

        let execution = finished(&service, kept).await;
        assert_eq!(execution.results.len(), 3);
        assert!(execution.results.iter().all(|r| r.output.is_empty()));

        eventually(|| {
            updates
                .lock()
                .unwrap()
                .contains(&(dropped, ExecutionStatus::Success))
                .then_some(())
        })
        .await;
        assert!(service.get_execution(dropped).is_none());
        service.shutdown().await;
    }

    #[tokio::test]
    async fn queued_run_can_be_canceled_before_it_starts() {
        let service = service();
        let workflow = service.create_workflow(digest()).await.expect("create");
        let id = service
            .execute_workflow_manually(workflow.id)
            .await
            .expect("queued");

        assert!(service.cancel_execution(id));
        assert!(!service.cancel_execution(id));
        assert_eq!(service.inner.queue.len(), 0);
        assert!(service.get_execution(id).is_none());
    }

    #[tokio::test]
    async fn running_execution_can_be_canceled() {
        let service = service();
        service.start().expect("start");
        let workflow = service.create_workflow(slow()).await.expect("create");
        let id = service
            .execute_workflow_manually(workflow.id)
            .await
            .expect("queued");

        eventually(|| service.get_execution(id)).await;
        assert!(service.cancel_execution(id));
        let execution = finished(&service, id).await;

        assert_eq!(execution.status, ExecutionStatus::Canceled);
        assert!(execution.error.is_none());
        service.shutdown().await;
    }

    #[tokio::test]
    async fn run_can_be_canceled_while_its_workflow_loads() {
        let service = service_over(
            &config(4),
            WorkflowStore::new(Arc::new(SlowReads {
                delay: Duration::from_millis(200),
                inner: InMemoryKeyValueStore::new(),
            })),
        );
        let workflow = service.create_workflow(digest()).await.expect("create");
        let id = service
            .execute_workflow_manually(workflow.id)
            .await
            .expect("queued");

        service.inner.drain();
        assert_eq!(service.inner.queue.len(), 0);
        assert!(service.cancel_execution(id));

        let execution = finished(&service, id).await;
        assert_eq!(execution.status, ExecutionStatus::Canceled);
        assert!(execution.results.is_empty());
    }

    #[tokio::test]
    async fn run_of_a_missing_workflow_is_recorded_as_failed() {
        let service = service();
        let updates = Arc::new(Mutex::new(Vec::new()));
        let _subscription = {
            let updates = Arc::clone(&updates);
            service.subscribe_to_updates(move |event| {
                if let Some(update) = event.as_execution() {
                    updates.lock().unwrap().push(update.clone());
                }
                Ok(())
            })
        };
        let missing = WorkflowId::new();
        let id = service
            .inner
            .enqueue(missing, ExecutionMode::ErrorWorkflow, None);
        service.start().expect("start");

        let execution = finished(&service, id).await;

        assert_eq!(execution.status, ExecutionStatus::Error);
        assert_eq!(execution.workflow_id, missing);
        assert_eq!(execution.mode, ExecutionMode::ErrorWorkflow);
        let error = execution.error.expect("error recorded");
        assert_eq!(error.name, "UnknownWorkflow");
        assert!(error.message.contains(&missing.to_string()), "{}", error.message);
        let last = eventually(|| {
            updates
                .lock()
                .unwrap()
                .iter()
                .rfind(|u| u.execution_id == id && u.status.is_terminal())
                .cloned()
        })
        .await;
        assert_eq!(last.status, ExecutionStatus::Error);
        assert!(last.error.is_some());
        assert!(service.inner.in_flight.lock().unwrap().is_empty());
        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn started_service_broadcasts_status_past_a_broken_subscriber() {
        let mut config = config(4);
        config.status.broadcast_interval_secs = 5;
        let service = service_with(&config);
        service.create_workflow(digest()).await.expect("create");
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let _broken = service.subscribe_to_updates(|_| panic!("subscriber bug"));
        let _healthy = {
            let snapshots = Arc::clone(&snapshots);
            service.subscribe_to_updates(move |event| {
                if let StatusEvent::System(status) = event {
                    snapshots.lock().unwrap().push(status.clone());
                }
                Ok(())
            })
        };
        service.start().expect("start");

        tokio::time::sleep(Duration::from_secs(11)).await;

        let received = snapshots.lock().unwrap().clone();
        assert!(received.len() >= 3, "got {} snapshots", received.len());
        let latest = received.last().expect("snapshot");
        assert!(latest.is_live);
        assert_eq!(latest.workflow_count, 1);
        assert_eq!(latest.node_type_count, 8);
        assert_eq!(service.inner.publisher.subscriber_count(), 2);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn drain_stops_when_every_worker_is_busy() {
        let service = service_with(&config(1));
        let workflow = service.create_workflow(slow()).await.expect("create");
        service
            .execute_workflow_manually(workflow.id)
            .await
            .expect("queued");
        service
            .execute_workflow_manually(workflow.id)
            .await
            .expect("queued");

        service.inner.drain();

        assert_eq!(service.inner.queue.len(), 1);
        assert_eq!(service.inner.workers.available_permits(), 0);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_executions() {
        let service = service();
        service.start().expect("start");
        let workflow = service.create_workflow(slow()).await.expect("create");
        let id = service
            .execute_workflow_manually(workflow.id)
            .await
            .expect("queued");
        eventually(|| service.get_execution(id)).await;

        service.shutdown().await;

        let execution = service.get_execution(id).expect("recorded");
        assert_eq!(execution.status, ExecutionStatus::Canceled);
        assert!(service.start().is_err());
        assert!(!service.system_status().await.is_live);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let service = service();
        service.start().expect("start");
        let err = service.start().unwrap_err();
        assert!(err.to_string().contains("already started"), "{err}");
        service.shutdown().await;
    }

    #[tokio::test]
    async fn system_status_counts_everything() {
        let service = service();
        service.create_workflow(digest()).await.expect("create");
        let active = service
            .create_workflow(digest().active(true))
            .await
            .expect("create");
        service
            .execute_workflow_manually(active.id)
            .await
            .expect("queued");

        let status = service.system_status().await;

        assert!(!status.is_live);
        assert_eq!(status.workflow_count, 2);
        assert_eq!(status.active_workflow_count, 1);
        assert_eq!(status.queue_depth, 1);
        assert_eq!(status.node_type_count, 8);
        assert_eq!(status.total_executions, 0);
    }

    #[tokio::test]
    async fn scheduler_tick_enqueues_through_the_service() {
        let service = service();
        let workflow = service
            .create_workflow(digest().active(true))
            .await
            .expect("create");
        let nine = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 10, 19, 9, 0, 0)
            .single()
            .expect("valid instant");

        let fired = service
            .inner
            .scheduler
            .tick(nine, service.inner.as_ref())
            .await;

        assert_eq!(fired, [workflow.id]);
        let queued = service.inner.queue.pop().expect("queued run");
        assert_eq!(queued.mode, ExecutionMode::Schedule);
        assert_eq!(queued.workflow_id, workflow.id);
    }
}
