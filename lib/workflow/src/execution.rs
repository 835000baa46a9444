//! Execution records.
//!
//! An [`Execution`] is created when a run starts and snapshots the workflow it
//! runs. Node results are appended in the order nodes ran. Once an execution
//! is finished every mutator is a no-op.

use crate::definition::{NodeId, Workflow, WorkflowDefinition};
use crate::node_type::Row;
use aura_core::{ExecutionId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Waiting in the run queue. Only seen in live updates.
    Queued,
    Running,
    Success,
    Error,
    Canceled,
}

impl ExecutionStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Canceled)
    }
}

/// What started an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Manual,
    Schedule,
    /// Started because another workflow's execution failed.
    ErrorWorkflow,
}

impl ExecutionMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Schedule => "schedule",
            Self::ErrorWorkflow => "error_workflow",
        }
    }
}

/// Recorded form of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Underlying error messages, outermost first.
    #[serde(default)]
    pub causes: Vec<String>,
}

/// Outcome of running one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRunResult {
    pub node_id: NodeId,
    pub node_name: String,
    pub node_type: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub attempts: u32,
    pub output: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// A single run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub mode: ExecutionMode,
    /// The workflow as it was when the run started.
    pub workflow: Workflow,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub finished: bool,
    pub results: Vec<NodeRunResult>,
    pub error: Option<ErrorInfo>,
    pub duration_ms: Option<u64>,
}

impl Execution {
    /// Starts a new execution over a workflow snapshot.
    #[must_use]
    pub fn start(id: ExecutionId, workflow: Workflow, mode: ExecutionMode) -> Self {
        Self {
            id,
            workflow_id: workflow.id,
            mode,
            workflow,
            started_at: Utc::now(),
            stopped_at: None,
            status: ExecutionStatus::Running,
            finished: false,
            results: Vec::new(),
            error: None,
            duration_ms: None,
        }
    }

    /// Creates a failed execution for a run whose workflow could not be
    /// loaded. The snapshot is an empty workflow named after the id.
    #[must_use]
    pub fn abandoned(
        id: ExecutionId,
        workflow_id: WorkflowId,
        mode: ExecutionMode,
        error: ErrorInfo,
    ) -> Self {
        let snapshot =
            Workflow::from_definition(workflow_id, WorkflowDefinition::new(workflow_id.to_string()));
        let mut execution = Self::start(id, snapshot, mode);
        execution.fail(error);
        execution
    }

    /// Appends a node result.
    ///
    /// Returns false, leaving the execution unchanged, if it is finished or
    /// already holds one result per snapshot node.
    pub fn record(&mut self, result: NodeRunResult) -> bool {
        if self.finished || self.results.len() >= self.workflow.nodes.len() {
            return false;
        }
        self.results.push(result);
        true
    }

    /// Marks the execution successful.
    pub fn succeed(&mut self) {
        self.finish(ExecutionStatus::Success, None);
    }

    /// Marks the execution failed.
    pub fn fail(&mut self, error: ErrorInfo) {
        self.finish(ExecutionStatus::Error, Some(error));
    }

    /// Marks the execution canceled.
    pub fn cancel(&mut self) {
        self.finish(ExecutionStatus::Canceled, None);
    }

    fn finish(&mut self, status: ExecutionStatus, error: Option<ErrorInfo>) {
        if self.finished {
            return;
        }
        let stopped_at = Utc::now();
        self.status = status;
        self.error = error;
        self.finished = true;
        self.stopped_at = Some(stopped_at);
        self.duration_ms = Some(
            u64::try_from((stopped_at - self.started_at).num_milliseconds()).unwrap_or_default(),
        );
    }

    /// Returns the result recorded for `node`.
    #[must_use]
    pub fn result_for(&self, node: &NodeId) -> Option<&NodeRunResult> {
        self.results.iter().find(|r| &r.node_id == node)
    }

    /// Drops output rows from every result, keeping timings and errors.
    #[must_use]
    pub fn without_output_data(mut self) -> Self {
        for result in &mut self.results {
            result.output.clear();
        }
        self
    }
}
