//! Status snapshots and execution updates sent to subscribers.

use crate::queue::QueuedRun;
use aura_core::{ExecutionId, WorkflowId};
use aura_workflow::{Execution, ExecutionMode, ExecutionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Short form of an execution used in status snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
}

impl From<&Execution> for ExecutionSummary {
    fn from(execution: &Execution) -> Self {
        Self {
            id: execution.id,
            workflow_id: execution.workflow_id,
            status: execution.status,
            started_at: execution.started_at,
        }
    }
}

/// Periodic snapshot of the whole system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub is_live: bool,
    pub workflow_count: usize,
    pub active_workflow_count: usize,
    pub total_executions: usize,
    pub node_type_count: usize,
    pub queue_depth: usize,
    /// Most recent first.
    pub recent_executions: Vec<ExecutionSummary>,
    pub generated_at: DateTime<Utc>,
}

/// A state transition of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionUpdate {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub mode: ExecutionMode,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionUpdate {
    /// Update for a run entering the queue.
    #[must_use]
    pub fn queued(run: &QueuedRun) -> Self {
        Self {
            execution_id: run.execution_id,
            workflow_id: run.workflow_id,
            mode: run.mode,
            status: ExecutionStatus::Queued,
            started_at: None,
            stopped_at: None,
            error: None,
        }
    }

    /// Update for a run that ended before it could start.
    #[must_use]
    pub fn abandoned(run: &QueuedRun, status: ExecutionStatus, error: Option<String>) -> Self {
        Self {
            status,
            stopped_at: Some(Utc::now()),
            error,
            ..Self::queued(run)
        }
    }
}

impl From<&Execution> for ExecutionUpdate {
    fn from(execution: &Execution) -> Self {
        Self {
            execution_id: execution.id,
            workflow_id: execution.workflow_id,
            mode: execution.mode,
            status: execution.status,
            started_at: Some(execution.started_at),
            stopped_at: execution.stopped_at,
            error: execution.error.as_ref().map(|e| e.message.clone()),
        }
    }
}

/// Everything a subscriber can receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    System(SystemStatus),
    Execution(ExecutionUpdate),
}

impl StatusEvent {
    /// Returns the execution update carried by this event, if any.
    #[must_use]
    pub fn as_execution(&self) -> Option<&ExecutionUpdate> {
        match self {
            Self::Execution(update) => Some(update),
            Self::System(_) => None,
        }
    }
}
