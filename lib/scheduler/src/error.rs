//! Error types for the scheduler crate.
//!
//! - `ScheduleError`: a trigger's schedule parameters cannot be understood
//! - `TriggerEvaluationError`: one trigger could not be evaluated on a tick

use aura_core::WorkflowId;
use aura_workflow::NodeId;
use std::fmt;

/// Errors from parsing schedule parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The `schedule` kind is not recognised.
    UnknownKind { kind: String },
    /// A `time` value is not a valid `HH:MM`.
    InvalidTime { value: String },
    /// A `weekday` value is not a day name.
    InvalidWeekday { value: String },
    /// A `day_of_month` value is outside 1..=31.
    InvalidDayOfMonth { value: String },
    /// Invalid cron expression.
    InvalidCronExpression { expression: String, reason: String },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKind { kind } => write!(f, "unknown schedule kind: {kind}"),
            Self::InvalidTime { value } => write!(f, "invalid time '{value}', expected HH:MM"),
            Self::InvalidWeekday { value } => write!(f, "invalid weekday: {value}"),
            Self::InvalidDayOfMonth { value } => {
                write!(f, "invalid day of month '{value}', expected 1-31")
            }
            Self::InvalidCronExpression { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

/// A trigger that could not be evaluated during a scheduler tick.
///
/// These are logged and skipped; they never stop the tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvaluationError {
    /// A node references a type missing from the registry.
    UnknownNodeType {
        workflow_id: WorkflowId,
        node_id: NodeId,
        type_name: String,
    },
    /// A schedule trigger has unusable parameters.
    InvalidSchedule {
        workflow_id: WorkflowId,
        node_id: NodeId,
        reason: String,
    },
    /// Workflows could not be read.
    Storage { reason: String },
}

impl fmt::Display for TriggerEvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNodeType {
                workflow_id,
                node_id,
                type_name,
            } => write!(
                f,
                "node {node_id} in workflow {workflow_id} has unknown type '{type_name}'"
            ),
            Self::InvalidSchedule {
                workflow_id,
                node_id,
                reason,
            } => write!(
                f,
                "schedule of node {node_id} in workflow {workflow_id} is invalid: {reason}"
            ),
            Self::Storage { reason } => write!(f, "could not read workflows: {reason}"),
        }
    }
}

impl std::error::Error for TriggerEvaluationError {}
