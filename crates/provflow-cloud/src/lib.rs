//! provflow cloud orchestration
//!
//! This crate turns a [`provflow_core::ProvisioningPlan`] into real resources
//! through a [`Provider`], and removes them again when a run fails partway.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   prov up                        │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                provflow-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │ Orchestrator (single writer of state)    │   │
//! │  └───────┬──────────────────────┬───────────┘   │
//! │  ┌───────▼───────┐  ┌───────────▼──────────┐    │
//! │  │ StepExecutor  │  │ ReadinessPoller      │    │
//! │  │ lookup/create │  │ describe until ready │    │
//! │  └───────────────┘  └──────────────────────┘    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │ RollbackManager (reverse order deletes)  │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ exec provider │ │    memory     │
//! │ (shell cmds)  │ │   provider    │
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod events;
pub mod executor;
pub mod memory;
pub mod orchestrator;
pub mod poller;
pub mod provider;
pub mod report;
pub mod rollback;
pub mod state;

// Re-exports
pub use error::{CloudError, ProviderError, ProviderResult, Result};
pub use events::{EventLevel, EventSink, RunEvent};
pub use executor::{StepExecutor, StepOutcome};
pub use memory::MemoryProvider;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use poller::{Readiness, ReadinessPoller};
pub use provider::{AuthStatus, ExternalId, Provider, ResourceStatus};
pub use report::{ReportWriter, ResourceRef, RunReport};
pub use rollback::{CompensationOutcome, RollbackEntry, RollbackManager, RollbackReport};
pub use state::{ExecutionState, ExecutionStatus, Run, RunOutcome};
pub use tokio_util::sync::CancellationToken;
