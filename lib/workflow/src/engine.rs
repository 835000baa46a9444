//! Execution Engine.
//!
//! Runs a workflow snapshot to completion:
//! 1. Resolve every node's type (pre-flight)
//! 2. Seed trigger nodes with a single row
//! 3. Scan passes: run every eligible node, where eligible means a trigger,
//!    a node without incoming connections, or a node whose sources all ran
//! 4. Stop at the first node failure, or when a pass makes no progress
//!
//! The whole run is bounded by an optional timeout and a cancellation token.

use crate::definition::{ExecutionOrder, Node, NodeId, RetryPolicy, Workflow};
use crate::error::{NodeError, RunError};
use crate::execution::{Execution, ExecutionMode, NodeRunResult};
use crate::graph::DependencyGraph;
use crate::node_type::{NodeContext, NodeType, Row};
use crate::registry::NodeTypeRegistry;
use crate::template;
use aura_core::ExecutionId;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// A request to run one workflow.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub execution_id: ExecutionId,
    /// Snapshot to run. Later edits to the stored workflow do not affect it.
    pub workflow: Workflow,
    pub mode: ExecutionMode,
    /// Row handed to trigger nodes instead of an empty one.
    pub seed: Option<Row>,
}

/// Receives execution lifecycle notifications.
pub trait ExecutionObserver: Send + Sync {
    fn execution_started(&self, execution: &Execution);
    fn execution_finished(&self, execution: &Execution);
}

/// Observer that ignores all notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {
    fn execution_started(&self, _execution: &Execution) {}
    fn execution_finished(&self, _execution: &Execution) {}
}

/// Runs workflows against a node type registry.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    registry: Arc<NodeTypeRegistry>,
    default_timeout: Option<Duration>,
}

impl ExecutionEngine {
    #[must_use]
    pub fn new(registry: Arc<NodeTypeRegistry>) -> Self {
        Self {
            registry,
            default_timeout: None,
        }
    }

    /// Timeout for workflows whose settings do not name one.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Runs a workflow and returns the finished execution.
    ///
    /// Failures never escape as errors; they are recorded on the execution.
    #[instrument(
        skip_all,
        fields(
            execution_id = %request.execution_id,
            workflow_id = %request.workflow.id,
            mode = request.mode.as_str(),
        )
    )]
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
        observer: &dyn ExecutionObserver,
    ) -> Execution {
        let RunRequest {
            execution_id,
            workflow,
            mode,
            seed,
        } = request;
        let timeout = workflow
            .settings
            .timeout_secs
            .map(Duration::from_secs)
            .or(self.default_timeout);

        let mut execution = Execution::start(execution_id, workflow, mode);
        observer.execution_started(&execution);
        info!(nodes = execution.workflow.nodes.len(), "execution started");

        let outcome = {
            let run = self.drive(&mut execution, seed.unwrap_or_default(), &cancel);
            let bounded = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, run).await.unwrap_or(Err(
                        RunError::ExecutionTimeout {
                            timeout_secs: limit.as_secs(),
                        },
                    )),
                    None => run.await,
                }
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(RunError::Canceled),
                outcome = bounded => outcome,
            }
        };

        match outcome {
            Ok(()) => execution.succeed(),
            Err(RunError::Canceled) => execution.cancel(),
            Err(error) => {
                warn!(error = %error, "execution failed");
                execution.fail(error.to_error_info());
            }
        }

        info!(
            status = ?execution.status,
            duration_ms = execution.duration_ms.unwrap_or_default(),
            results = execution.results.len(),
            "execution finished"
        );
        observer.execution_finished(&execution);
        execution
    }

    async fn drive(
        &self,
        execution: &mut Execution,
        seed: Row,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        let workflow = execution.workflow.clone();
        let node_types = self.preflight(&workflow)?;
        let deps = DependencyGraph::build(&workflow);
        check_connections(&workflow, &node_types, &deps)?;
        let mut outputs: HashMap<NodeId, Vec<Row>> = HashMap::with_capacity(workflow.nodes.len());

        for _ in 0..=workflow.nodes.len() {
            if outputs.len() == workflow.nodes.len() {
                return Ok(());
            }

            let mut progressed = false;
            match workflow.settings.execution_order {
                ExecutionOrder::Declared => {
                    for (node, node_type) in workflow.nodes.iter().zip(&node_types) {
                        let Some(inputs) = eligible_inputs(node, node_type, &deps, &outputs, &seed)
                        else {
                            continue;
                        };
                        let rows = self
                            .run_node(execution, node, node_type, inputs, cancel)
                            .await?;
                        outputs.insert(node.id.clone(), rows);
                        progressed = true;
                    }
                }
                ExecutionOrder::Layered => {
                    let ready: Vec<_> = workflow
                        .nodes
                        .iter()
                        .zip(&node_types)
                        .filter_map(|(node, node_type)| {
                            eligible_inputs(node, node_type, &deps, &outputs, &seed)
                                .map(|inputs| (node, node_type, inputs))
                        })
                        .collect();
                    for (node, node_type, inputs) in ready {
                        let rows = self
                            .run_node(execution, node, node_type, inputs, cancel)
                            .await?;
                        outputs.insert(node.id.clone(), rows);
                        progressed = true;
                    }
                }
            }

            if !progressed {
                break;
            }
        }

        if outputs.len() == workflow.nodes.len() {
            return Ok(());
        }

        let stuck: Vec<NodeId> = workflow
            .nodes
            .iter()
            .filter(|node| !outputs.contains_key(&node.id))
            .map(|node| node.id.clone())
            .collect();
        let cycles = deps.cycles_among(&stuck);
        Err(RunError::GraphNotProgressing { stuck, cycles })
    }

    fn preflight(&self, workflow: &Workflow) -> Result<Vec<Arc<NodeType>>, RunError> {
        workflow
            .nodes
            .iter()
            .map(|node| {
                self.registry
                    .resolve(&node.type_name)
                    .map_err(|e| RunError::NodeTypeNotFound {
                        node_id: node.id.clone(),
                        type_name: e.name,
                    })
            })
            .collect()
    }

    async fn run_node(
        &self,
        execution: &mut Execution,
        node: &Node,
        node_type: &NodeType,
        inputs: Vec<Row>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, RunError> {
        let ctx = NodeContext {
            execution_id: execution.id,
            workflow_id: execution.workflow_id,
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            mode: execution.mode,
            cancel: cancel.clone(),
        };
        let retry = execution.workflow.settings.retry;

        let started_at = Utc::now();
        let clock = Instant::now();
        let (outcome, attempts) = invoke(node_type, node, &ctx, inputs, retry).await;
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut result = NodeRunResult {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            node_type: node.type_name.clone(),
            started_at,
            duration_ms,
            attempts,
            output: Vec::new(),
            error: None,
        };

        match outcome {
            Ok(rows) => {
                debug!(node_id = %node.id, rows = rows.len(), attempts, duration_ms, "node completed");
                result.output.clone_from(&rows);
                execution.record(result);
                Ok(rows)
            }
            Err(NodeError::Canceled) => Err(RunError::Canceled),
            Err(error) => {
                let error = RunError::NodeExecution {
                    node_id: node.id.clone(),
                    error,
                };
                result.error = Some(error.to_error_info());
                execution.record(result);
                Err(error)
            }
        }
    }
}

/// Rejects connections into nodes whose type declares no inputs.
fn check_connections(
    workflow: &Workflow,
    node_types: &[Arc<NodeType>],
    deps: &DependencyGraph,
) -> Result<(), RunError> {
    for (node, node_type) in workflow.nodes.iter().zip(node_types) {
        if node_type.descriptor().inputs.is_empty() && deps.has_incoming(&node.id) {
            return Err(RunError::InputNotAccepted {
                node_id: node.id.clone(),
                type_name: node_type.name().to_string(),
                sources: deps.predecessors(&node.id).to_vec(),
            });
        }
    }
    Ok(())
}

/// Returns the input rows for `node` if it can run now.
fn eligible_inputs(
    node: &Node,
    node_type: &NodeType,
    deps: &DependencyGraph,
    outputs: &HashMap<NodeId, Vec<Row>>,
    seed: &Row,
) -> Option<Vec<Row>> {
    if outputs.contains_key(&node.id) {
        return None;
    }
    if node_type.is_trigger() {
        return Some(vec![seed.clone()]);
    }

    let sources = deps.predecessors(&node.id);
    if sources.is_empty() {
        return Some(vec![Row::new()]);
    }

    let mut inputs = Vec::new();
    for source in sources {
        inputs.extend(outputs.get(source)?.iter().cloned());
    }
    Some(inputs)
}

/// Calls the node behaviour with retries. Returns the outcome and the
/// number of attempts made.
async fn invoke(
    node_type: &NodeType,
    node: &Node,
    ctx: &NodeContext,
    inputs: Vec<Row>,
    retry: RetryPolicy,
) -> (Result<Vec<Row>, NodeError>, u32) {
    let params = match node_type.descriptor().resolve_parameters(&node.parameters) {
        Ok(params) => params,
        Err(error) => return (Err(error), 0),
    };
    let context_row = inputs.first().cloned().unwrap_or_default();
    let rendered = template::render_parameters(&params, &context_row);
    let params = match node_type.descriptor().check_rendered(rendered) {
        Ok(params) => params,
        Err(error) => return (Err(error), 0),
    };

    let max_attempts = retry.attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let call = AssertUnwindSafe(node_type.behavior().execute(ctx, &params, inputs.clone()));
        let outcome = match call.catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(NodeError::failed(format!(
                "node panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        match outcome {
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                warn!(node_id = %ctx.node_id, attempt, max_attempts, error = %error, "node failed, retrying");
                if retry.backoff_ms > 0 {
                    tokio::select! {
                        () = ctx.cancel.cancelled() => return (Err(NodeError::Canceled), attempt),
                        () = tokio::time::sleep(Duration::from_millis(retry.backoff_ms)) => {}
                    }
                }
            }
            other => return (other, attempt),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
