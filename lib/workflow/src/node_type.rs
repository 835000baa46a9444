//! Node types: descriptors, parameter schemas and executable behaviours.
//!
//! A [`NodeType`] pairs an immutable [`NodeTypeDescriptor`] with the
//! [`NodeBehavior`] that runs it. Nodes in a workflow refer to their type by
//! name; the engine resolves the name through the registry at run time.

use crate::definition::NodeId;
use crate::error::NodeError;
use crate::execution::ExecutionMode;
use async_trait::async_trait;
use aura_core::{ExecutionId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One data item flowing along a connection.
pub type Row = Map<String, JsonValue>;

/// Palette group of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeGroup {
    Trigger,
    Transform,
    Action,
}

/// How a trigger node type is fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fired by the trigger scheduler.
    Schedule,
    /// Fired on explicit request.
    Manual,
}

/// Value type of a declared property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    String,
    Number,
    Boolean,
    /// One of a fixed set of string values.
    Options { options: Vec<String> },
    /// A nested JSON object.
    Collection,
}

/// Shows a property only when another property has one of the listed values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayCondition {
    pub property: String,
    pub equals: Vec<JsonValue>,
}

/// Declaration of one node parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    pub display_name: String,
    pub kind: PropertyKind,
    #[serde(default)]
    pub default: JsonValue,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_when: Option<DisplayCondition>,
}

impl PropertyDecl {
    fn new(name: impl Into<String>, display_name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            kind,
            default: JsonValue::Null,
            required: false,
            show_when: None,
        }
    }

    #[must_use]
    pub fn string(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(name, display_name, PropertyKind::String)
    }

    #[must_use]
    pub fn number(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(name, display_name, PropertyKind::Number)
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(name, display_name, PropertyKind::Boolean)
    }

    #[must_use]
    pub fn options<I, S>(name: impl Into<String>, display_name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options = options.into_iter().map(Into::into).collect();
        Self::new(name, display_name, PropertyKind::Options { options })
    }

    #[must_use]
    pub fn collection(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::new(name, display_name, PropertyKind::Collection)
    }

    #[must_use]
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = default;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Shows this property only when `property` equals one of `values`.
    #[must_use]
    pub fn shown_when<I>(mut self, property: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = JsonValue>,
    {
        self.show_when = Some(DisplayCondition {
            property: property.into(),
            equals: values.into_iter().collect(),
        });
        self
    }

    fn is_visible(&self, values: &Row) -> bool {
        match &self.show_when {
            None => true,
            Some(condition) => values
                .get(&condition.property)
                .is_some_and(|current| condition.equals.contains(current)),
        }
    }

    /// Checks a value against the declared kind. With `placeholders` set, a
    /// string containing `{{` is accepted for any kind and checked again
    /// once rendered.
    fn check_kind(&self, value: &JsonValue, placeholders: bool) -> Result<(), NodeError> {
        let ok = match (&self.kind, value) {
            (_, JsonValue::Null) => true,
            (PropertyKind::String, JsonValue::String(_)) => true,
            (PropertyKind::Number, JsonValue::Number(_)) => true,
            (PropertyKind::Boolean, JsonValue::Bool(_)) => true,
            (PropertyKind::Collection, JsonValue::Object(_)) => true,
            (_, JsonValue::String(s)) if placeholders && s.contains("{{") => true,
            (PropertyKind::Options { options }, JsonValue::String(s)) => {
                if options.iter().any(|o| o == s) {
                    true
                } else {
                    return Err(NodeError::invalid_parameter(
                        &self.name,
                        format!("'{s}' is not one of: {}", options.join(", ")),
                    ));
                }
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(NodeError::invalid_parameter(
                &self.name,
                format!("expected {}", self.kind.label()),
            ))
        }
    }
}

impl PropertyKind {
    fn label(&self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Number => "a number",
            Self::Boolean => "a boolean",
            Self::Options { .. } => "one of the listed options",
            Self::Collection => "an object",
        }
    }

    /// Converts rendered text into the kind's JSON type, if it has one.
    fn coerce(&self, text: &str) -> Option<JsonValue> {
        match self {
            Self::Number => text.parse::<serde_json::Number>().ok().map(JsonValue::Number),
            Self::Boolean => text.parse::<bool>().ok().map(JsonValue::Bool),
            _ => None,
        }
    }
}

/// Immutable description of a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeDescriptor {
    /// Unique registry key.
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub group: NodeGroup,
    /// Set for trigger node types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerKind>,
    pub properties: Vec<PropertyDecl>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl NodeTypeDescriptor {
    /// Creates a descriptor with one main input and one main output.
    #[must_use]
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, group: NodeGroup) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: String::new(),
            group,
            trigger: None,
            properties: Vec::new(),
            inputs: vec![crate::definition::MAIN_PORT.to_string()],
            outputs: vec![crate::definition::MAIN_PORT.to_string()],
        }
    }

    /// Marks the type as a trigger. Triggers have no inputs.
    #[must_use]
    pub fn trigger(mut self, kind: TriggerKind) -> Self {
        self.trigger = Some(kind);
        self.group = NodeGroup::Trigger;
        self.inputs.clear();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_property(mut self, property: PropertyDecl) -> Self {
        self.properties.push(property);
        self
    }

    /// Resolves a node's raw parameters against this schema.
    ///
    /// Absent properties receive their defaults, properties whose display
    /// condition is not met are dropped, and undeclared keys pass through.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidParameter`] when a visible required
    /// property is missing or blank, or a value has the wrong type.
    pub fn resolve_parameters(&self, raw: &Row) -> Result<Parameters, NodeError> {
        let mut values = raw.clone();
        for property in &self.properties {
            if !values.contains_key(&property.name) && !property.default.is_null() {
                values.insert(property.name.clone(), property.default.clone());
            }
        }

        let mut resolved = Row::new();
        for property in &self.properties {
            if !property.is_visible(&values) {
                continue;
            }
            match values.get(&property.name) {
                Some(value) if !is_blank(value) => {
                    property.check_kind(value, true)?;
                    resolved.insert(property.name.clone(), value.clone());
                }
                _ if property.required => {
                    return Err(NodeError::invalid_parameter(&property.name, "required"));
                }
                _ => {}
            }
        }

        for (key, value) in values {
            if !self.properties.iter().any(|p| p.name == key) {
                resolved.insert(key, value);
            }
        }

        Ok(Parameters(resolved))
    }

    /// Checks parameters after placeholders were rendered.
    ///
    /// Number and boolean properties rendered from a placeholder arrive as
    /// text and are converted to their kind here.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidParameter`] when a rendered value does
    /// not fit its property, including placeholders left unresolved.
    pub fn check_rendered(&self, params: Parameters) -> Result<Parameters, NodeError> {
        let mut values = params.into_row();
        for property in &self.properties {
            let Some(value) = values.get_mut(&property.name) else {
                continue;
            };
            if let Some(converted) = value.as_str().and_then(|s| property.kind.coerce(s.trim())) {
                *value = converted;
            }
            property.check_kind(value, false)?;
        }
        Ok(Parameters(values))
    }
}

fn is_blank(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Resolved parameter values handed to a behaviour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters(Row);

impl Parameters {
    #[must_use]
    pub fn new(values: Row) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.0.get(name)
    }

    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(JsonValue::as_str)
    }

    /// Returns a string parameter that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidParameter`] if the value is missing or not a string.
    pub fn require_str(&self, name: &str) -> Result<&str, NodeError> {
        self.str(name)
            .ok_or_else(|| NodeError::invalid_parameter(name, "expected a string"))
    }

    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(JsonValue::as_bool)
    }

    #[must_use]
    pub fn object(&self, name: &str) -> Option<&Row> {
        self.0.get(name).and_then(JsonValue::as_object)
    }

    #[must_use]
    pub fn as_row(&self) -> &Row {
        &self.0
    }

    #[must_use]
    pub fn into_row(self) -> Row {
        self.0
    }
}

/// Context passed to every behaviour call.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub node_id: NodeId,
    pub node_name: String,
    pub mode: ExecutionMode,
    /// Cancelled when the owning execution is canceled or times out.
    pub cancel: CancellationToken,
}

/// Executable behaviour of a node type.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    /// Runs the node over its input rows and returns its output rows.
    ///
    /// # Errors
    ///
    /// Returns a [`NodeError`] when the node fails; the owning execution
    /// ends in error.
    async fn execute(
        &self,
        ctx: &NodeContext,
        params: &Parameters,
        inputs: Vec<Row>,
    ) -> Result<Vec<Row>, NodeError>;
}

/// A registered node type: descriptor plus behaviour.
#[derive(Clone)]
pub struct NodeType {
    descriptor: NodeTypeDescriptor,
    behavior: Arc<dyn NodeBehavior>,
}

impl NodeType {
    #[must_use]
    pub fn new(descriptor: NodeTypeDescriptor, behavior: impl NodeBehavior + 'static) -> Self {
        Self {
            descriptor,
            behavior: Arc::new(behavior),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub fn descriptor(&self) -> &NodeTypeDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn behavior(&self) -> &Arc<dyn NodeBehavior> {
        &self.behavior
    }

    #[must_use]
    pub fn trigger_kind(&self) -> Option<TriggerKind> {
        self.descriptor.trigger
    }

    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.descriptor.trigger.is_some()
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
