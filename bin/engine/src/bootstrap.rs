//! Imports workflow definitions from a directory at startup.
//!
//! Every `*.json` file is parsed as a [`WorkflowDefinition`]. Files that fail
//! to parse or validate are logged and skipped. A definition whose name
//! already exists in the store is not imported again.

use aura_runtime::AutomationService;
use aura_workflow::WorkflowDefinition;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of one import pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub async fn import_directory(service: &AutomationService, directory: &Path) -> ImportSummary {
    let mut summary = ImportSummary::default();
    let files = match definition_files(directory).await {
        Ok(files) => files,
        Err(e) => {
            warn!(directory = %directory.display(), error = %e, "could not read bootstrap directory");
            return summary;
        }
    };

    let mut existing: HashSet<String> = match service.list_workflows().await {
        Ok(workflows) => workflows.into_iter().map(|w| w.name).collect(),
        Err(e) => {
            warn!(error = %e, "could not list workflows before bootstrap");
            return summary;
        }
    };

    for path in files {
        let definition = match read_definition(&path).await {
            Ok(definition) => definition,
            Err(reason) => {
                warn!(file = %path.display(), %reason, "skipping workflow file");
                summary.failed += 1;
                continue;
            }
        };
        if existing.contains(&definition.name) {
            summary.skipped += 1;
            continue;
        }
        let name = definition.name.clone();
        match service.create_workflow(definition).await {
            Ok(workflow) => {
                info!(workflow_id = %workflow.id, name = %workflow.name, active = workflow.active, "workflow imported");
                existing.insert(name);
                summary.imported += 1;
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "workflow rejected");
                summary.failed += 1;
            }
        }
    }
    summary
}

async fn definition_files(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(directory).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn read_definition(path: &Path) -> Result<WorkflowDefinition, String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}
