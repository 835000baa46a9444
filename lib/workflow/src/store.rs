//! Workflow Store and its key-value backends.
//!
//! The store is the only place workflow identity is minted. Records are
//! persisted through a [`KeyValueStore`] as versioned envelopes, one key per
//! workflow. Read-modify-write operations are serialized by an async mutex.

use crate::definition::{Workflow, WorkflowDefinition, WorkflowPatch, WorkflowSettings};
use crate::envelope::{self, Envelope};
use crate::error::{StoreError, ValidationError, WorkflowError};
use async_trait::async_trait;
use aura_core::{IdGenerator, WorkflowId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Minimal async key-value persistence.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Returns every key starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Process-local backend.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Backend storing one `<key>.json` file per key under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryKeyValueStore {
    root: PathBuf,
}

impl DirectoryKeyValueStore {
    const EXTENSION: &'static str = "json";

    /// Opens the directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::Io {
                key: root.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
        if !valid {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(format!("{key}.{}", Self::EXTENSION)))
    }
}

#[async_trait]
impl KeyValueStore for DirectoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let staging = path.with_extension("json.tmp");
        let io_error = |e: std::io::Error| StoreError::Io {
            key: key.to_string(),
            reason: e.to_string(),
        };
        tokio::fs::write(&staging, value).await.map_err(io_error)?;
        tokio::fs::rename(&staging, &path).await.map_err(io_error)?;
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let io_error = |e: std::io::Error| StoreError::Io {
            key: prefix.to_string(),
            reason: e.to_string(),
        };
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(io_error)?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(Self::EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && stem.starts_with(prefix)
            {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Holds workflow definitions.
pub struct WorkflowStore {
    backend: Arc<dyn KeyValueStore>,
    ids: IdGenerator,
    writes: Mutex<()>,
}

impl WorkflowStore {
    /// Creates a store over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            ids: IdGenerator::new(),
            writes: Mutex::new(()),
        }
    }

    /// Creates a store backed by process memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryKeyValueStore::new()))
    }

    /// Validates and stores a new workflow under a freshly minted id.
    ///
    /// # Errors
    ///
    /// Returns an error if validation or persistence fails.
    pub async fn create(
        &self,
        definition: WorkflowDefinition,
    ) -> aura_core::Result<Workflow, WorkflowError> {
        definition.validate().map_err(WorkflowError::from)?;

        let _guard = self.writes.lock().await;
        self.check_error_workflow(&definition.settings, None).await?;
        let workflow = Workflow::from_definition(self.ids.next_id(), definition);
        self.write(&workflow).await?;

        info!(workflow_id = %workflow.id, name = %workflow.name, nodes = workflow.nodes.len(), "workflow created");
        Ok(workflow)
    }

    /// Loads a workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the record is malformed.
    pub async fn get(&self, id: WorkflowId) -> aura_core::Result<Option<Workflow>, WorkflowError> {
        let key = key_for(id);
        let Some(bytes) = self.backend.get(&key).await.map_err(WorkflowError::from)? else {
            return Ok(None);
        };
        let workflow = decode_workflow(&key, &bytes)?;
        Ok(Some(workflow))
    }

    /// Lists all workflows in creation order.
    ///
    /// Malformed records are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot enumerate keys.
    pub async fn list(&self) -> aura_core::Result<Vec<Workflow>, WorkflowError> {
        let keys = self
            .backend
            .keys(KEY_PREFIX)
            .await
            .map_err(WorkflowError::from)?;

        let mut workflows = Vec::with_capacity(keys.len());
        for key in keys {
            let loaded = match self.backend.get(&key).await {
                Ok(Some(bytes)) => decode_workflow(&key, &bytes),
                Ok(None) => continue,
                Err(e) => Err(WorkflowError::from(e)),
            };
            match loaded {
                Ok(workflow) => workflows.push(workflow),
                Err(e) => warn!(key = %key, error = %e, "skipping unreadable workflow record"),
            }
        }
        workflows.sort_by_key(|w| w.id);
        Ok(workflows)
    }

    /// Applies a patch to a stored workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow does not exist, the patched workflow
    /// is invalid, or persistence fails.
    pub async fn update(
        &self,
        id: WorkflowId,
        patch: WorkflowPatch,
    ) -> aura_core::Result<Workflow, WorkflowError> {
        let _guard = self.writes.lock().await;
        let mut workflow = self
            .get(id)
            .await?
            .ok_or(WorkflowError::NotFound { workflow_id: id })?;
        workflow.apply(patch).map_err(WorkflowError::from)?;
        self.check_error_workflow(&workflow.settings, Some(id)).await?;
        self.write(&workflow).await?;

        debug!(workflow_id = %id, version = workflow.version, "workflow updated");
        Ok(workflow)
    }

    /// Activates or deactivates a workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow does not exist or persistence fails.
    pub async fn set_active(
        &self,
        id: WorkflowId,
        active: bool,
    ) -> aura_core::Result<Workflow, WorkflowError> {
        let workflow = self
            .update(id, WorkflowPatch::default().set_active(active))
            .await?;
        info!(workflow_id = %id, active, "workflow activation changed");
        Ok(workflow)
    }

    /// Rejects an `error_workflow` that is neither stored nor `own`.
    async fn check_error_workflow(
        &self,
        settings: &WorkflowSettings,
        own: Option<WorkflowId>,
    ) -> aura_core::Result<(), WorkflowError> {
        let Some(target) = settings.error_workflow else {
            return Ok(());
        };
        if own == Some(target) || self.get(target).await?.is_some() {
            return Ok(());
        }
        Err(WorkflowError::from(ValidationError::UnknownWorkflow { workflow_id: target }).into())
    }

    async fn write(&self, workflow: &Workflow) -> aura_core::Result<(), WorkflowError> {
        let key = key_for(workflow.id);
        let bytes = Envelope::new(workflow)
            .encode()
            .map_err(|e| WorkflowError::Serialization {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        self.backend
            .put(&key, bytes)
            .await
            .map_err(WorkflowError::from)?;
        Ok(())
    }
}

impl std::fmt::Debug for WorkflowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStore").finish_non_exhaustive()
    }
}

const KEY_PREFIX: &str = "wf_";

fn key_for(id: WorkflowId) -> String {
    id.to_string()
}

fn decode_workflow(key: &str, bytes: &[u8]) -> Result<Workflow, WorkflowError> {
    envelope::decode::<Workflow>(bytes)
        .map(Envelope::into_payload)
        .map_err(|e| WorkflowError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Node, WorkflowSettings};
    use crate::error::ValidationError;
    use serde_json::json;

    fn definition(name: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(name)
            .with_node(
                Node::new("trigger", "Every morning", "scheduleTrigger")
                    .with_parameters(json!({"schedule": "daily", "time": "09:00"})),
            )
            .with_node(Node::new("set", "Set topic", "setData"))
            .connect("trigger", "set")
    }

    #[tokio::test]
    async fn create_get_and_list_in_creation_order() {
        let store = WorkflowStore::in_memory();
        let first = store.create(definition("first")).await.expect("create");
        let second = store.create(definition("second")).await.expect("create");

        assert!(first.id < second.id);
        assert_eq!(store.get(first.id).await.expect("get"), Some(first.clone()));

        let names: Vec<String> = store
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|w| w.name)
            .collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[tokio::test]
    async fn create_rejects_dangling_connections() {
        let store = WorkflowStore::in_memory();
        let err = store
            .create(definition("bad").connect("set", "nowhere"))
            .await
            .unwrap_err();
        let expected = WorkflowError::Validation(ValidationError::DanglingConnection {
            from: "set".into(),
            to: "nowhere".into(),
        });
        assert!(err.to_string().contains(&expected.to_string()));
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn error_workflow_must_exist() {
        let store = WorkflowStore::in_memory();
        let missing = WorkflowId::new();
        let pointing_nowhere = WorkflowSettings {
            error_workflow: Some(missing),
            ..WorkflowSettings::default()
        };
        let expected = ValidationError::UnknownWorkflow { workflow_id: missing }.to_string();

        let err = store
            .create(definition("orphan").with_settings(pointing_nowhere.clone()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains(&expected), "{err}");
        assert!(store.list().await.expect("list").is_empty());

        let handler = store.create(definition("handler")).await.expect("create");
        let err = store
            .update(handler.id, WorkflowPatch::default().with_settings(pointing_nowhere))
            .await
            .unwrap_err();
        assert!(err.to_string().contains(&expected), "{err}");
        assert_eq!(store.get(handler.id).await.expect("get").map(|w| w.version), Some(1));

        let own = WorkflowSettings {
            error_workflow: Some(handler.id),
            ..WorkflowSettings::default()
        };
        store
            .update(handler.id, WorkflowPatch::default().with_settings(own.clone()))
            .await
            .expect("a workflow may handle its own failures");
        store
            .create(definition("guarded").with_settings(own))
            .await
            .expect("existing handler is accepted");
    }

    #[tokio::test]
    async fn update_and_activation_bump_version() {
        let store = WorkflowStore::in_memory();
        let created = store.create(definition("wf")).await.expect("create");

        let renamed = store
            .update(created.id, WorkflowPatch::default().rename("renamed"))
            .await
            .expect("update");
        assert_eq!(renamed.version, 2);

        let active = store.set_active(created.id, true).await.expect("activate");
        assert!(active.active);
        assert_eq!(active.version, 3);
        assert_eq!(active.name, "renamed");
        assert_eq!(store.get(created.id).await.expect("get"), Some(active));
    }

    #[tokio::test]
    async fn update_of_unknown_workflow_is_not_found() {
        let store = WorkflowStore::in_memory();
        let missing = WorkflowId::new();
        let err = store.set_active(missing, true).await.unwrap_err();
        let expected = WorkflowError::NotFound { workflow_id: missing };
        assert!(err.to_string().contains(&expected.to_string()));
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_ids() {
        let store = Arc::new(WorkflowStore::in_memory());
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.create(definition(&format!("wf-{i}"))).await })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let workflow = handle.await.expect("join").expect("create");
            assert!(ids.insert(workflow.id));
        }
        assert_eq!(store.list().await.expect("list").len(), 32);
    }

    #[tokio::test]
    async fn directory_backend_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = WorkflowSettings {
            timeout_secs: Some(30),
            ..WorkflowSettings::default()
        };

        let created = {
            let backend = DirectoryKeyValueStore::open(dir.path()).await.expect("open");
            let store = WorkflowStore::new(Arc::new(backend));
            store
                .create(definition("persisted").with_settings(settings.clone()))
                .await
                .expect("create")
        };

        let backend = DirectoryKeyValueStore::open(dir.path()).await.expect("reopen");
        let store = WorkflowStore::new(Arc::new(backend));
        let loaded = store.get(created.id).await.expect("get").expect("present");
        assert_eq!(loaded, created);
        assert_eq!(loaded.settings, settings);
    }

    #[tokio::test]
    async fn directory_backend_skips_corrupt_records_in_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = DirectoryKeyValueStore::open(dir.path()).await.expect("open");
        let store = WorkflowStore::new(Arc::new(backend.clone()));
        store.create(definition("good")).await.expect("create");
        backend
            .put("wf_corrupt", b"{not json".to_vec())
            .await
            .expect("put");

        let listed = store.list().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "good");
    }

    #[tokio::test]
    async fn directory_backend_rejects_path_like_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = DirectoryKeyValueStore::open(dir.path()).await.expect("open");
        let err = backend.put("../escape", Vec::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }
}
