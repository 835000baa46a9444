//! Node type registry.

use crate::error::NodeTypeNotFound;
use crate::node_type::NodeType;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Catalog of node types keyed by name.
///
/// Registration is an upsert; there is no removal.
#[derive(Debug, Default)]
pub struct NodeTypeRegistry {
    types: RwLock<HashMap<String, Arc<NodeType>>>,
}

impl NodeTypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node type, replacing any type with the same name.
    pub fn register(&self, node_type: NodeType) {
        let name = node_type.name().to_string();
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        if types.insert(name.clone(), Arc::new(node_type)).is_some() {
            info!(node_type = %name, "replaced registered node type");
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<NodeType>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Looks up a node type that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`NodeTypeNotFound`] if no type is registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<NodeType>, NodeTypeNotFound> {
        self.get(name).ok_or_else(|| NodeTypeNotFound {
            name: name.to_string(),
        })
    }

    /// Returns every registered type, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<NodeType>> {
        let mut types: Vec<_> = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        types.sort_by(|a, b| a.name().cmp(b.name()));
        types
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
