//! Workflow definition types.
//!
//! A workflow is a named automation that consists of:
//! - An ordered list of nodes, each bound to a node type by name
//! - A connection map from source node to its ordered targets
//! - Settings controlling execution order, retries, timeouts and retention

use crate::error::ValidationError;
use aura_core::WorkflowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Name of the default port on both sides of a connection.
pub const MAIN_PORT: &str = "main";

/// Identifier of a node, unique within its workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Canvas position of a node. Presentation only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node instance inside a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Name of the node type that executes this node.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
    #[serde(default)]
    pub position: Position,
}

impl Node {
    /// Creates a node with no parameters.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            type_name: type_name.into(),
            parameters: Map::new(),
            position: Position::default(),
        }
    }

    /// Replaces the parameters. Non-object values clear them.
    #[must_use]
    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = match parameters {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        self
    }
}

/// One outgoing connection from a source node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub node: NodeId,
    #[serde(default = "main_port")]
    pub output_port: String,
    #[serde(default = "main_port")]
    pub input_port: String,
}

impl ConnectionTarget {
    /// Connects main output to main input of `node`.
    #[must_use]
    pub fn main(node: impl Into<NodeId>) -> Self {
        Self {
            node: node.into(),
            output_port: main_port(),
            input_port: main_port(),
        }
    }
}

fn main_port() -> String {
    MAIN_PORT.to_string()
}

/// Source node id to its ordered list of targets.
pub type Connections = BTreeMap<NodeId, Vec<ConnectionTarget>>;

/// How each scan pass of the engine picks nodes to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOrder {
    /// Walk nodes in declaration order, running each as soon as it is eligible.
    #[default]
    Declared,
    /// Collect the eligible set first, then run it.
    Layered,
}

/// Retry policy applied to each node behaviour call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    /// Number of attempts to make, never less than one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }
}

/// Per-workflow settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub execution_order: ExecutionOrder,
    /// Workflow to run when an execution of this one ends in error.
    pub error_workflow: Option<WorkflowId>,
    /// Whole-graph wall-clock timeout.
    pub timeout_secs: Option<u64>,
    pub retry: RetryPolicy,
    pub save_successful_executions: bool,
    pub save_failed_executions: bool,
    /// When false, output rows are stripped before the record is kept.
    pub save_execution_data: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            execution_order: ExecutionOrder::default(),
            error_workflow: None,
            timeout_secs: None,
            retry: RetryPolicy::default(),
            save_successful_executions: true,
            save_failed_executions: true,
            save_execution_data: true,
        }
    }
}

/// A stored workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Connections,
    /// Only active workflows fire on schedule.
    pub active: bool,
    #[serde(default)]
    pub settings: WorkflowSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every update.
    pub version: u64,
}

impl Workflow {
    /// Materializes a definition under the given id.
    #[must_use]
    pub fn from_definition(id: WorkflowId, definition: WorkflowDefinition) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: definition.name,
            nodes: definition.nodes,
            connections: definition.connections,
            active: definition.active,
            settings: definition.settings,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Applies a patch, bumping the version and update time.
    ///
    /// # Errors
    ///
    /// Returns an error if the patched workflow is structurally invalid.
    /// The workflow is left unchanged in that case.
    pub fn apply(&mut self, patch: WorkflowPatch) -> Result<(), ValidationError> {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(nodes) = patch.nodes {
            next.nodes = nodes;
        }
        if let Some(connections) = patch.connections {
            next.connections = connections;
        }
        if let Some(active) = patch.active {
            next.active = active;
        }
        if let Some(settings) = patch.settings {
            next.settings = settings;
        }
        validate_structure(&next.name, &next.nodes, &next.connections)?;

        next.version += 1;
        next.updated_at = Utc::now();
        *self = next;
        Ok(())
    }
}

/// Payload for creating a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Connections,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub settings: WorkflowSettings,
}

impl WorkflowDefinition {
    /// Creates an empty, inactive definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            connections: Connections::new(),
            active: false,
            settings: WorkflowSettings::default(),
        }
    }

    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Connects the main output of `from` to the main input of `to`.
    #[must_use]
    pub fn connect(mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        self.connections
            .entry(from.into())
            .or_default()
            .push(ConnectionTarget::main(to));
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Checks node id uniqueness and connection endpoints.
    ///
    /// Node type names are not checked here; drafts may reference types
    /// that are registered later.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_structure(&self.name, &self.nodes, &self.connections)
    }
}

/// Partial update of a workflow. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowPatch {
    pub name: Option<String>,
    pub nodes: Option<Vec<Node>>,
    pub connections: Option<Connections>,
    pub active: Option<bool>,
    pub settings: Option<WorkflowSettings>,
}

impl WorkflowPatch {
    #[must_use]
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_nodes(mut self, nodes: Vec<Node>, connections: Connections) -> Self {
        self.nodes = Some(nodes);
        self.connections = Some(connections);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn set_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }
}

fn validate_structure(
    name: &str,
    nodes: &[Node],
    connections: &Connections,
) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let mut ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !ids.insert(&node.id) {
            return Err(ValidationError::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
    }

    for (from, targets) in connections {
        for target in targets {
            if !ids.contains(from) || !ids.contains(&target.node) {
                return Err(ValidationError::DanglingConnection {
                    from: from.clone(),
                    to: target.node.clone(),
                });
            }
        }
    }

    Ok(())
}
