//! Progress events emitted by the provisioning pipeline

use crate::pipeline::CreatedResources;
use crate::resource::ResourceKind;
use std::fmt;

/// Step of the provisioning state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Lock and checkpoint handling before the first create call
    Start,
    ImportImage,
    WaitImageAvailable,
    CreateBundle,
    WaitBundleAvailable,
    CreateDesktop,
    WaitDesktopAvailable,
    ResolvePublicAddress,
}

impl Stage {
    /// Resource the stage creates or waits on
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match self {
            Stage::Start => None,
            Stage::ImportImage | Stage::WaitImageAvailable => Some(ResourceKind::Image),
            Stage::CreateBundle | Stage::WaitBundleAvailable => Some(ResourceKind::Bundle),
            Stage::CreateDesktop | Stage::WaitDesktopAvailable => Some(ResourceKind::Desktop),
            Stage::ResolvePublicAddress => Some(ResourceKind::NetworkInterface),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::ImportImage => "import-image",
            Stage::WaitImageAvailable => "wait-image-available",
            Stage::CreateBundle => "create-bundle",
            Stage::WaitBundleAvailable => "wait-bundle-available",
            Stage::CreateDesktop => "create-desktop",
            Stage::WaitDesktopAvailable => "wait-desktop-available",
            Stage::ResolvePublicAddress => "resolve-public-address",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A checkpoint from an earlier attempt is being continued
    Resumed { run_id: String, stages: usize },
    /// An earlier checkpoint was dropped; its resources are no longer tracked
    Discarded {
        run_id: String,
        created: CreatedResources,
    },
    StageStarted { stage: Stage, detail: String },
    /// The checkpoint already covers this stage
    StageSkipped { stage: Stage, resource_id: String },
    /// One describe result while waiting
    Polled {
        kind: ResourceKind,
        id: String,
        state: String,
    },
    StageCompleted { stage: Stage, resource_id: String },
    /// Result of deleting one resource after an abort
    Compensated {
        kind: ResourceKind,
        resource_id: String,
        error: Option<String>,
    },
    Aborted { stage: Stage, error: String },
    Done { public_address: String },
}

/// Receives pipeline progress
pub trait ProgressReporter: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Reporter that forwards every event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Resumed { run_id, stages } => {
                tracing::info!("Resuming run {} ({} stages recorded)", run_id, stages);
            }
            ProgressEvent::Discarded { run_id, created } => {
                tracing::warn!("Discarded checkpoint of run {}", run_id);
                for (kind, id) in created.newest_first() {
                    tracing::warn!("No longer tracked: {} {}", kind, id);
                }
            }
            ProgressEvent::StageStarted { stage, detail } => {
                tracing::info!("[{}] {}", stage, detail);
            }
            ProgressEvent::StageSkipped { stage, resource_id } => {
                tracing::info!("[{}] already done: {}", stage, resource_id);
            }
            ProgressEvent::Polled { kind, id, state } => {
                tracing::debug!("{} {} is {}", kind, id, state);
            }
            ProgressEvent::StageCompleted { stage, resource_id } => {
                tracing::info!("[{}] completed: {}", stage, resource_id);
            }
            ProgressEvent::Compensated {
                kind,
                resource_id,
                error: None,
            } => {
                tracing::info!("Removed {} {}", kind, resource_id);
            }
            ProgressEvent::Compensated {
                kind,
                resource_id,
                error: Some(error),
            } => {
                tracing::warn!("Failed to remove {} {}: {}", kind, resource_id, error);
            }
            ProgressEvent::Aborted { stage, error } => {
                tracing::error!("[{}] aborted: {}", stage, error);
            }
            ProgressEvent::Done { public_address } => {
                tracing::info!("Desktop reachable at {}", public_address);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_resource_kind() {
        assert_eq!(Stage::Start.resource_kind(), None);
        assert_eq!(
            Stage::WaitBundleAvailable.resource_kind(),
            Some(ResourceKind::Bundle)
        );
        assert_eq!(
            Stage::ResolvePublicAddress.resource_kind(),
            Some(ResourceKind::NetworkInterface)
        );
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::WaitDesktopAvailable.to_string(), "wait-desktop-available");
    }
}
