mod bootstrap;

use aura_ai::{CannedGenerator, OllamaGenerator, TextGenerator};
use aura_integration::{Outbox, ReqwestCaller};
use aura_runtime::{AutomationService, GeneratorProvider, RuntimeConfig};
use aura_workflow::{
    Capabilities, DirectoryKeyValueStore, NodeTypeRegistry, WorkflowStore, register_builtin,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RuntimeConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let store = match &config.storage.directory {
        Some(directory) => {
            let backend = DirectoryKeyValueStore::open(directory)
                .await
                .expect("failed to open workflow directory");
            tracing::info!(directory = %directory.display(), "Storing workflows on disk");
            WorkflowStore::new(Arc::new(backend))
        }
        None => {
            tracing::info!("Storing workflows in memory");
            WorkflowStore::in_memory()
        }
    };

    let generator: Arc<dyn TextGenerator> = match config.generator.provider {
        GeneratorProvider::Canned => Arc::new(CannedGenerator::new()),
        GeneratorProvider::Ollama => Arc::new(
            OllamaGenerator::new(config.generator.ollama())
                .expect("failed to build Ollama client"),
        ),
    };
    let capabilities = Capabilities {
        generator,
        messenger: Arc::new(Outbox::new()),
        http: Arc::new(
            ReqwestCaller::new(Duration::from_secs(30)).expect("failed to build HTTP client"),
        ),
    };

    let registry = NodeTypeRegistry::new();
    register_builtin(&registry, &capabilities);
    tracing::info!(node_types = registry.len(), "Registered node types");

    let service = AutomationService::new(&config, Arc::new(store), Arc::new(registry));

    if let Some(directory) = &config.bootstrap.directory {
        let summary = bootstrap::import_directory(&service, directory).await;
        tracing::info!(
            imported = summary.imported,
            skipped = summary.skipped,
            failed = summary.failed,
            "Bootstrap complete"
        );
    }

    let _log = service.subscribe_to_updates(|event| {
        if let Some(update) = event.as_execution() {
            tracing::info!(
                execution_id = %update.execution_id,
                workflow_id = %update.workflow_id,
                status = ?update.status,
                error = update.error.as_deref().unwrap_or_default(),
                "Execution update"
            );
        }
        Ok(())
    });

    service.start().expect("failed to start automation service");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
    service.shutdown().await;
}
