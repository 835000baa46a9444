//! Workflow engine for the aura automation platform.
//!
//! This crate provides the core of the platform:
//!
//! - **Definitions**: Workflows as nodes plus named connections, validated on write
//! - **Node Types**: Descriptors with parameter schemas, and the behaviours that run them
//! - **Engine**: Dependency-ordered execution with templating, retries and timeouts
//! - **Store**: Versioned workflow persistence over a pluggable key-value backend
//! - **Ledger**: Bounded in-memory execution history

pub mod definition;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod execution;
pub mod graph;
pub mod ledger;
pub mod node_type;
pub mod nodes;
pub mod registry;
pub mod store;
pub mod template;

pub use definition::{
    ConnectionTarget, Connections, ExecutionOrder, MAIN_PORT, Node, NodeId, Position,
    RetryPolicy, Workflow, WorkflowDefinition, WorkflowPatch, WorkflowSettings,
};
pub use engine::{ExecutionEngine, ExecutionObserver, NoopObserver, RunRequest};
pub use error::{
    NodeError, NodeTypeNotFound, RunError, StoreError, ValidationError, WorkflowError,
};
pub use execution::{ErrorInfo, Execution, ExecutionMode, ExecutionStatus, NodeRunResult};
pub use graph::DependencyGraph;
pub use ledger::{ExecutionLedger, RetentionPolicy};
pub use node_type::{
    NodeBehavior, NodeContext, NodeGroup, NodeType, NodeTypeDescriptor, Parameters,
    PropertyDecl, PropertyKind, Row, TriggerKind,
};
pub use nodes::{Capabilities, register_builtin};
pub use registry::NodeTypeRegistry;
pub use store::{DirectoryKeyValueStore, InMemoryKeyValueStore, KeyValueStore, WorkflowStore};
