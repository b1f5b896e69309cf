//! deskflow cloud layer
//!
//! This crate provides the provider abstraction and the provisioning pipeline
//! for deskflow: import a machine image, derive a bundle from it, instantiate
//! a desktop from the bundle, then resolve the desktop's public address.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  deskflow CLI                   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 deskflow-cloud                  │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  Pipeline (create → wait → next stage)   │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐ ┌────────────┐ ┌───────────┐  │
//! │  │    Waiter    │ │ Checkpoint │ │ Progress  │  │
//! │  └──────────────┘ └────────────┘ └───────────┘  │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait DesktopProvider { ... }           │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼────────┐
//!           │ aws-workspaces │
//!           │    provider    │
//!           └────────────────┘
//! ```

pub mod cancel;
pub mod checkpoint;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod resource;
pub mod waiter;

// Re-exports
pub use cancel::CancellationToken;
pub use checkpoint::{Checkpoint, CheckpointLock, CheckpointStore, RunInputs, StageRecord, StageStatus};
pub use error::{CloudError, ProviderError, Result};
pub use pipeline::{
    BundleSpec, CompensationOutcome, CreatedResources, DesktopSpec, ImageSpec, Pipeline,
    PipelineAborted, ProvisionPlan, ProvisionedDesktop, StageWaits,
};
pub use progress::{ProgressEvent, ProgressReporter, Stage, TracingReporter};
pub use provider::DesktopProvider;
pub use resource::{
    BundleInfo, ComputeTier, CreateBundleRequest, CreateDesktopRequest, DesktopInfo, ImageInfo,
    ImportImageRequest, IngestionProcess, ResourceKind, ResourceStatus,
};
pub use waiter::{PollOutcome, WaitConfig, wait_until_settled};
