//! FIFO run queue.

use aura_core::{ExecutionId, WorkflowId};
use aura_workflow::{ExecutionMode, Row};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// A run waiting for a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedRun {
    /// Id the execution will carry once it starts.
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub mode: ExecutionMode,
    pub seed: Option<Row>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedRun {
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        mode: ExecutionMode,
        seed: Option<Row>,
    ) -> Self {
        Self {
            execution_id,
            workflow_id,
            mode,
            seed,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunQueue {
    runs: Mutex<VecDeque<QueuedRun>>,
}

impl RunQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, run: QueuedRun) {
        self.lock().push_back(run);
    }

    pub fn pop(&self) -> Option<QueuedRun> {
        self.lock().pop_front()
    }

    /// Removes a run that has not started yet.
    pub fn remove(&self, execution_id: ExecutionId) -> Option<QueuedRun> {
        let mut runs = self.lock();
        let index = runs.iter().position(|r| r.execution_id == execution_id)?;
        runs.remove(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedRun>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
