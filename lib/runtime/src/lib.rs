//! Runtime for the aura automation platform.
//!
//! Ties the workflow engine, trigger scheduler and execution ledger together
//! behind [`AutomationService`], and publishes live status to subscribers.

pub mod config;
pub mod error;
pub mod publisher;
pub mod queue;
pub mod service;
pub mod status;

pub use config::{
    BootstrapConfig, ExecutionConfig, GeneratorConfig, GeneratorProvider, LedgerConfig,
    QueueConfig, RuntimeConfig, SchedulerConfig, StatusConfig, StorageConfig,
};
pub use error::{ServiceError, SubscriberCallbackError};
pub use publisher::{DeliveryReport, StatusPublisher, Subscription};
pub use queue::{QueuedRun, RunQueue};
pub use service::AutomationService;
pub use status::{ExecutionSummary, ExecutionUpdate, StatusEvent, SystemStatus};
