//! Error types for the workflow crate.
//!
//! Errors are plain enums so they can be carried inside rootcause reports:
//! - `ValidationError`: structural problems in a workflow definition
//! - `StoreError`: failures of the key-value persistence layer
//! - `WorkflowError`: Workflow Store operations
//! - `NodeTypeNotFound`: registry lookups of unregistered names
//! - `NodeError`: failures returned by node behaviours
//! - `RunError`: reasons an execution ended without success

use crate::definition::NodeId;
use crate::execution::ErrorInfo;
use aura_core::WorkflowId;
use std::fmt;

/// Structural problems in a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Two nodes share an id.
    DuplicateNodeId { node_id: NodeId },
    /// A connection references a node that does not exist.
    DanglingConnection { from: NodeId, to: NodeId },
    /// The workflow name is blank.
    EmptyName,
    /// A referenced workflow does not exist.
    UnknownWorkflow { workflow_id: WorkflowId },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::DanglingConnection { from, to } => {
                write!(f, "connection {from} -> {to} references a missing node")
            }
            Self::EmptyName => write!(f, "workflow name is empty"),
            Self::UnknownWorkflow { workflow_id } => write!(f, "unknown workflow: {workflow_id}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Failures of a key-value backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The key contains characters the backend cannot store.
    InvalidKey { key: String },
    /// An I/O operation failed.
    Io { key: String, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey { key } => write!(f, "invalid storage key: '{key}'"),
            Self::Io { key, reason } => write!(f, "storage i/o failed for '{key}': {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from Workflow Store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Workflow not found.
    NotFound { workflow_id: WorkflowId },
    /// The definition failed validation.
    Validation(ValidationError),
    /// The storage backend failed.
    Storage(StoreError),
    /// A stored record could not be encoded or decoded.
    Serialization { key: String, reason: String },
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { workflow_id } => write!(f, "workflow not found: {workflow_id}"),
            Self::Validation(e) => write!(f, "invalid workflow: {e}"),
            Self::Storage(e) => write!(f, "workflow storage failed: {e}"),
            Self::Serialization { key, reason } => {
                write!(f, "workflow record '{key}' is malformed: {reason}")
            }
        }
    }
}

impl std::error::Error for WorkflowError {}

impl From<ValidationError> for WorkflowError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e)
    }
}

/// Lookup of a node type name that was never registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTypeNotFound {
    pub name: String,
}

impl fmt::Display for NodeTypeNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node type not registered: {}", self.name)
    }
}

impl std::error::Error for NodeTypeNotFound {}

/// Error returned by a node behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// A parameter is missing or has the wrong shape. Never retried.
    InvalidParameter { property: String, reason: String },
    /// The behaviour failed.
    Failed { message: String, causes: Vec<String> },
    /// The behaviour observed cancellation and stopped.
    Canceled,
}

impl NodeError {
    /// Creates a failure with no underlying causes.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Creates a failure from an error, keeping its source chain as causes.
    #[must_use]
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self::Failed {
            message: error.to_string(),
            causes,
        }
    }

    /// Creates an invalid-parameter error.
    #[must_use]
    pub fn invalid_parameter(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            property: property.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if retrying the call could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the underlying causes, innermost last.
    #[must_use]
    pub fn causes(&self) -> &[String] {
        match self {
            Self::Failed { causes, .. } => causes,
            _ => &[],
        }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter { property, reason } => {
                write!(f, "invalid parameter '{property}': {reason}")
            }
            Self::Failed { message, .. } => write!(f, "{message}"),
            Self::Canceled => write!(f, "node canceled"),
        }
    }
}

impl std::error::Error for NodeError {}

/// Reasons an execution ended without success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// A node references a type missing from the registry.
    NodeTypeNotFound { node_id: NodeId, type_name: String },
    /// A connection targets a node whose type accepts no input.
    InputNotAccepted {
        node_id: NodeId,
        type_name: String,
        sources: Vec<NodeId>,
    },
    /// A node behaviour failed after all retries.
    NodeExecution { node_id: NodeId, error: NodeError },
    /// No node became eligible during a scan pass.
    GraphNotProgressing {
        stuck: Vec<NodeId>,
        cycles: Vec<Vec<NodeId>>,
    },
    /// The whole-graph timeout elapsed.
    ExecutionTimeout { timeout_secs: u64 },
    /// The run was canceled.
    Canceled,
}

impl RunError {
    /// Stable name of the error class.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeTypeNotFound { .. } => "NodeTypeNotFound",
            Self::InputNotAccepted { .. } => "InvalidConnection",
            Self::NodeExecution { error, .. } => match error {
                NodeError::InvalidParameter { .. } => "InvalidParameter",
                _ => "NodeExecutionError",
            },
            Self::GraphNotProgressing { .. } => "GraphNotProgressing",
            Self::ExecutionTimeout { .. } => "ExecutionTimeout",
            Self::Canceled => "ExecutionCanceled",
        }
    }

    /// Id of the node the error is attributed to, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeTypeNotFound { node_id, .. }
            | Self::InputNotAccepted { node_id, .. }
            | Self::NodeExecution { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    /// Converts the error into its recorded form.
    #[must_use]
    pub fn to_error_info(&self) -> ErrorInfo {
        let causes = match self {
            Self::NodeExecution { error, .. } => error.causes().to_vec(),
            Self::GraphNotProgressing { cycles, .. } => cycles
                .iter()
                .map(|cycle| {
                    let names: Vec<&str> = cycle.iter().map(NodeId::as_str).collect();
                    format!("cycle: {}", names.join(" -> "))
                })
                .collect(),
            _ => Vec::new(),
        };
        ErrorInfo {
            name: self.name().to_string(),
            message: self.to_string(),
            node_id: self.node_id().cloned(),
            causes,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeTypeNotFound { node_id, type_name } => {
                write!(f, "node {node_id} uses unregistered type '{type_name}'")
            }
            Self::InputNotAccepted {
                node_id,
                type_name,
                sources,
            } => {
                let names: Vec<&str> = sources.iter().map(NodeId::as_str).collect();
                write!(
                    f,
                    "node {node_id} of type '{type_name}' accepts no input but is connected from {}",
                    names.join(", ")
                )
            }
            Self::NodeExecution { error, .. } => write!(f, "{error}"),
            Self::GraphNotProgressing { stuck, .. } => {
                let names: Vec<&str> = stuck.iter().map(NodeId::as_str).collect();
                write!(f, "graph is not progressing; stuck nodes: {}", names.join(", "))
            }
            Self::ExecutionTimeout { timeout_secs } => {
                write!(f, "execution exceeded its {timeout_secs}s timeout")
            }
            Self::Canceled => write!(f, "execution canceled"),
        }
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(Inner);

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "request failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection reset")
        }
    }

    impl std::error::Error for Inner {}

    #[test]
    fn node_error_keeps_source_chain() {
        let err = NodeError::from_error(&Outer(Inner));
        assert_eq!(err.to_string(), "request failed");
        assert_eq!(err.causes(), ["connection reset".to_string()]);
        assert!(err.is_retryable());
    }

    #[test]
    fn node_failure_message_is_verbatim_in_error_info() {
        let err = RunError::NodeExecution {
            node_id: NodeId::from("c"),
            error: NodeError::failed("boom"),
        };
        let info = err.to_error_info();
        assert_eq!(info.name, "NodeExecutionError");
        assert_eq!(info.message, "boom");
        assert_eq!(info.node_id, Some(NodeId::from("c")));
    }

    #[test]
    fn stuck_graph_lists_cycles_as_causes() {
        let err = RunError::GraphNotProgressing {
            stuck: vec![NodeId::from("a"), NodeId::from("b")],
            cycles: vec![vec![NodeId::from("a"), NodeId::from("b")]],
        };
        let info = err.to_error_info();
        assert_eq!(info.name, "GraphNotProgressing");
        assert!(info.message.contains("a, b"));
        assert_eq!(info.causes, ["cycle: a -> b".to_string()]);
    }

    #[test]
    fn invalid_parameter_is_not_retryable() {
        let err = NodeError::invalid_parameter("prompt", "required");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "invalid parameter 'prompt': required");
    }
}
