//! Provisioning pipeline
//!
//! ```text
//! Start -> ImportImage -> WaitImageAvailable -> CreateBundle -> WaitBundleAvailable
//!       -> CreateDesktop -> WaitDesktopAvailable -> ResolvePublicAddress -> Done
//! ```
//!
//! Every stage is gated on the previous one reaching its terminal success.
//! Any error aborts the whole run; nothing after the failing stage is called.

use crate::cancel::CancellationToken;
use crate::checkpoint::{Checkpoint, CheckpointLock, CheckpointStore, RunInputs, StageRecord};
use crate::error::{CloudError, ProviderError, Result};
use crate::progress::{ProgressEvent, ProgressReporter, Stage, TracingReporter};
use crate::provider::DesktopProvider;
use crate::resource::{
    BundleInfo, ComputeTier, CreateBundleRequest, CreateDesktopRequest, DesktopInfo, ImageInfo,
    ImportImageRequest, IngestionProcess, ResourceKind, ResourceStatus,
};
use crate::waiter::{PollOutcome, WaitConfig, wait_until_settled};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Machine image to import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub source_image_id: String,
    pub name: String,
    pub description: String,
    pub ingestion_process: IngestionProcess,
}

/// Bundle to derive from the imported image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSpec {
    pub name: String,
    pub description: String,
    pub compute_tier: ComputeTier,
    pub user_storage_gib: u32,
    pub root_storage_gib: u32,
}

/// Desktop to instantiate from the bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopSpec {
    pub directory_id: String,
    pub user_name: String,
}

/// Everything one provisioning run needs to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPlan {
    pub image: ImageSpec,
    pub bundle: BundleSpec,
    pub desktop: DesktopSpec,
}

impl ProvisionPlan {
    pub fn inputs(&self) -> RunInputs {
        RunInputs {
            source_image_id: self.image.source_image_id.clone(),
            directory_id: self.desktop.directory_id.clone(),
            user_name: self.desktop.user_name.clone(),
            bundle_name: self.bundle.name.clone(),
        }
    }
}

/// Polling configuration per waited resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWaits {
    pub image: WaitConfig,
    pub bundle: WaitConfig,
    pub desktop: WaitConfig,
}

impl Default for StageWaits {
    fn default() -> Self {
        Self {
            image: WaitConfig::new(Duration::from_secs(5 * 60)),
            bundle: WaitConfig::new(Duration::from_secs(5 * 60)),
            desktop: WaitConfig::new(Duration::from_secs(50 * 60)),
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedDesktop {
    pub run_id: String,
    pub image_id: String,
    pub bundle_id: String,
    pub desktop_id: String,
    pub private_address: String,
    pub public_address: String,
}

/// Resources that exist because of this run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatedResources {
    pub image_id: Option<String>,
    pub bundle_id: Option<String>,
    pub desktop_id: Option<String>,
}

impl CreatedResources {
    fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        let id = |kind| checkpoint.stage(kind).map(|r| r.resource_id.clone());
        Self {
            image_id: id(ResourceKind::Image),
            bundle_id: id(ResourceKind::Bundle),
            desktop_id: id(ResourceKind::Desktop),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.image_id.is_none() && self.bundle_id.is_none() && self.desktop_id.is_none()
    }

    /// Created resources, most recent first
    pub fn newest_first(&self) -> Vec<(ResourceKind, &str)> {
        [
            (ResourceKind::Desktop, &self.desktop_id),
            (ResourceKind::Bundle, &self.bundle_id),
            (ResourceKind::Image, &self.image_id),
        ]
        .into_iter()
        .filter_map(|(kind, id)| id.as_deref().map(|id| (kind, id)))
        .collect()
    }
}

/// Outcome of removing one resource after an abort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationOutcome {
    pub kind: ResourceKind,
    pub resource_id: String,
    pub error: Option<String>,
}

impl CompensationOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Terminal failure of a run
#[derive(Error, Debug)]
#[error("provisioning aborted at {stage}: {source}")]
pub struct PipelineAborted {
    pub stage: Stage,
    #[source]
    pub source: CloudError,
    /// Resources left behind (before compensation)
    pub created: CreatedResources,
    /// Empty unless cleanup on abort is enabled
    pub compensation: Vec<CompensationOutcome>,
}

/// Mutable state of one run
struct RunContext {
    stage: Stage,
    checkpoint: Checkpoint,
    lock: Option<CheckpointLock>,
}

/// Sequential image → bundle → desktop provisioning
pub struct Pipeline {
    provider: Arc<dyn DesktopProvider>,
    plan: ProvisionPlan,
    waits: StageWaits,
    cancel: CancellationToken,
    reporter: Arc<dyn ProgressReporter>,
    store: Option<CheckpointStore>,
    fresh: bool,
    cleanup_on_abort: bool,
}

impl Pipeline {
    pub fn new(provider: Arc<dyn DesktopProvider>, plan: ProvisionPlan) -> Self {
        Self {
            provider,
            plan,
            waits: StageWaits::default(),
            cancel: CancellationToken::new(),
            reporter: Arc::new(TracingReporter),
            store: None,
            fresh: false,
            cleanup_on_abort: false,
        }
    }

    pub fn with_waits(mut self, waits: StageWaits) -> Self {
        self.waits = waits;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Persist progress so that a restarted run resumes instead of re-creating
    pub fn with_checkpoint(mut self, store: CheckpointStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Discard an existing checkpoint (under the lock) instead of resuming it
    pub fn fresh(mut self, enabled: bool) -> Self {
        self.fresh = enabled;
        self
    }

    /// Delete created resources (newest first) when the run aborts
    pub fn cleanup_on_abort(mut self, enabled: bool) -> Self {
        self.cleanup_on_abort = enabled;
        self
    }

    /// Run every stage to completion or abort at the first failure
    pub async fn run(&self) -> std::result::Result<ProvisionedDesktop, PipelineAborted> {
        let mut ctx = match self.prepare().await {
            Ok(ctx) => ctx,
            Err(error) => {
                self.emit(ProgressEvent::Aborted {
                    stage: Stage::Start,
                    error: error.to_string(),
                });
                return Err(PipelineAborted {
                    stage: Stage::Start,
                    source: error,
                    created: CreatedResources::default(),
                    compensation: Vec::new(),
                });
            }
        };

        match self.execute(&mut ctx).await {
            Ok(desktop) => {
                self.finish(ctx).await;
                self.emit(ProgressEvent::Done {
                    public_address: desktop.public_address.clone(),
                });
                Ok(desktop)
            }
            Err(error) => Err(self.abort(ctx, error).await),
        }
    }

    async fn prepare(&self) -> Result<RunContext> {
        let inputs = self.plan.inputs();
        let Some(store) = &self.store else {
            return Ok(RunContext {
                stage: Stage::Start,
                checkpoint: Checkpoint::new(new_run_id(), inputs),
                lock: None,
            });
        };

        let lock = store.acquire_lock().await?;
        let existing = match store.load().await? {
            Some(discarded) if self.fresh => {
                store.clear().await?;
                self.emit(ProgressEvent::Discarded {
                    created: CreatedResources::from_checkpoint(&discarded),
                    run_id: discarded.run_id,
                });
                None
            }
            existing => existing,
        };
        let checkpoint = match existing {
            Some(existing) if existing.inputs == inputs => {
                self.emit(ProgressEvent::Resumed {
                    run_id: existing.run_id.clone(),
                    stages: existing.stages.len(),
                });
                existing
            }
            Some(existing) => {
                return Err(CloudError::StateError(format!(
                    "checkpoint in {} belongs to run {} with different inputs ({} / {} / {}); \
                     discard it to start over",
                    store.dir().display(),
                    existing.run_id,
                    existing.inputs.source_image_id,
                    existing.inputs.directory_id,
                    existing.inputs.user_name,
                )));
            }
            None => Checkpoint::new(new_run_id(), inputs),
        };

        Ok(RunContext {
            stage: Stage::Start,
            checkpoint,
            lock: Some(lock),
        })
    }

    async fn execute(&self, ctx: &mut RunContext) -> Result<ProvisionedDesktop> {
        let image_id = self.import_image(ctx).await?;
        self.wait_image(ctx, &image_id).await?;

        let bundle_id = self.create_bundle(ctx, &image_id).await?;
        self.wait_bundle(ctx, &bundle_id).await?;

        let desktop_id = self.create_desktop(ctx, &bundle_id).await?;
        let private_address = self.wait_desktop(ctx, &desktop_id).await?;

        let public_address = self.resolve_public_address(ctx, &private_address).await?;

        Ok(ProvisionedDesktop {
            run_id: ctx.checkpoint.run_id.clone(),
            image_id,
            bundle_id,
            desktop_id,
            private_address,
            public_address,
        })
    }

    async fn import_image(&self, ctx: &mut RunContext) -> Result<String> {
        ctx.stage = Stage::ImportImage;
        if let Some(id) = self.recorded(ctx, ResourceKind::Image) {
            return Ok(id);
        }
        self.ensure_not_cancelled()?;

        let spec = &self.plan.image;
        self.emit(ProgressEvent::StageStarted {
            stage: ctx.stage,
            detail: format!("importing machine image {}", spec.source_image_id),
        });

        let request = ImportImageRequest {
            source_image_id: spec.source_image_id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            ingestion_process: spec.ingestion_process,
            idempotency_key: Some(ctx.checkpoint.idempotency_key(ResourceKind::Image)),
        };
        let id = require_id(ResourceKind::Image, self.provider.import_image(&request).await?)?;
        self.submitted(ctx, ResourceKind::Image, &id).await?;
        Ok(id)
    }

    async fn wait_image(&self, ctx: &mut RunContext, image_id: &str) -> Result<()> {
        ctx.stage = Stage::WaitImageAvailable;
        if self.already_settled(ctx, ResourceKind::Image) {
            self.emit(ProgressEvent::StageSkipped {
                stage: ctx.stage,
                resource_id: image_id.to_string(),
            });
            return Ok(());
        }
        self.emit(ProgressEvent::StageStarted {
            stage: ctx.stage,
            detail: format!("waiting for image {image_id}"),
        });

        wait_until_settled(
            ResourceKind::Image,
            image_id,
            &self.waits.image,
            &self.cancel,
            || self.provider.describe_image(image_id),
            |info: ImageInfo| {
                self.polled(ResourceKind::Image, image_id, &info.raw_state);
                match info.status {
                    ResourceStatus::Available => PollOutcome::Settled(()),
                    ResourceStatus::Error => PollOutcome::Failed(
                        info.error_message
                            .unwrap_or_else(|| format!("image state {}", info.raw_state)),
                    ),
                    ResourceStatus::Pending => PollOutcome::Pending,
                }
            },
        )
        .await?;

        self.settled(ctx, ResourceKind::Image, image_id).await
    }

    async fn create_bundle(&self, ctx: &mut RunContext, image_id: &str) -> Result<String> {
        ctx.stage = Stage::CreateBundle;
        if let Some(id) = self.recorded(ctx, ResourceKind::Bundle) {
            return Ok(id);
        }
        self.ensure_not_cancelled()?;

        let spec = &self.plan.bundle;
        self.emit(ProgressEvent::StageStarted {
            stage: ctx.stage,
            detail: format!("creating bundle {} from image {image_id}", spec.name),
        });

        let request = CreateBundleRequest {
            image_id: image_id.to_string(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            compute_tier: spec.compute_tier,
            user_storage_gib: spec.user_storage_gib,
            root_storage_gib: spec.root_storage_gib,
            idempotency_key: Some(ctx.checkpoint.idempotency_key(ResourceKind::Bundle)),
        };
        let id = require_id(ResourceKind::Bundle, self.provider.create_bundle(&request).await?)?;
        self.submitted(ctx, ResourceKind::Bundle, &id).await?;
        Ok(id)
    }

    async fn wait_bundle(&self, ctx: &mut RunContext, bundle_id: &str) -> Result<()> {
        ctx.stage = Stage::WaitBundleAvailable;
        if self.already_settled(ctx, ResourceKind::Bundle) {
            self.emit(ProgressEvent::StageSkipped {
                stage: ctx.stage,
                resource_id: bundle_id.to_string(),
            });
            return Ok(());
        }
        self.emit(ProgressEvent::StageStarted {
            stage: ctx.stage,
            detail: format!("waiting for bundle {bundle_id}"),
        });

        wait_until_settled(
            ResourceKind::Bundle,
            bundle_id,
            &self.waits.bundle,
            &self.cancel,
            || self.provider.describe_bundle(bundle_id),
            |info: BundleInfo| {
                self.polled(ResourceKind::Bundle, bundle_id, &info.raw_state);
                match info.status {
                    ResourceStatus::Available => PollOutcome::Settled(()),
                    ResourceStatus::Error => {
                        PollOutcome::Failed(format!("bundle state {}", info.raw_state))
                    }
                    ResourceStatus::Pending => PollOutcome::Pending,
                }
            },
        )
        .await?;

        self.settled(ctx, ResourceKind::Bundle, bundle_id).await
    }

    async fn create_desktop(&self, ctx: &mut RunContext, bundle_id: &str) -> Result<String> {
        ctx.stage = Stage::CreateDesktop;
        if let Some(id) = self.recorded(ctx, ResourceKind::Desktop) {
            return Ok(id);
        }
        self.ensure_not_cancelled()?;

        let spec = &self.plan.desktop;
        self.emit(ProgressEvent::StageStarted {
            stage: ctx.stage,
            detail: format!(
                "creating desktop for {} in {} from bundle {bundle_id}",
                spec.user_name, spec.directory_id
            ),
        });

        let request = CreateDesktopRequest {
            bundle_id: bundle_id.to_string(),
            directory_id: spec.directory_id.clone(),
            user_name: spec.user_name.clone(),
            idempotency_key: Some(ctx.checkpoint.idempotency_key(ResourceKind::Desktop)),
        };
        let id = require_id(
            ResourceKind::Desktop,
            self.provider.create_desktop(&request).await?,
        )?;
        self.submitted(ctx, ResourceKind::Desktop, &id).await?;
        Ok(id)
    }

    /// Always polls, even for a settled checkpoint: the private address is not persisted.
    async fn wait_desktop(&self, ctx: &mut RunContext, desktop_id: &str) -> Result<String> {
        ctx.stage = Stage::WaitDesktopAvailable;
        self.emit(ProgressEvent::StageStarted {
            stage: ctx.stage,
            detail: format!("waiting for desktop {desktop_id}"),
        });

        let private_address = wait_until_settled(
            ResourceKind::Desktop,
            desktop_id,
            &self.waits.desktop,
            &self.cancel,
            || self.provider.describe_desktop(desktop_id),
            |info: DesktopInfo| {
                self.polled(ResourceKind::Desktop, desktop_id, &info.raw_state);
                match info.status {
                    ResourceStatus::Available => PollOutcome::Settled(info.private_address),
                    ResourceStatus::Error => PollOutcome::Failed(
                        info.error_message
                            .unwrap_or_else(|| format!("desktop state {}", info.raw_state)),
                    ),
                    ResourceStatus::Pending => PollOutcome::Pending,
                }
            },
        )
        .await?
        .filter(|address| !address.is_empty())
        .ok_or_else(|| {
            CloudError::NotFound(format!("desktop {desktop_id} has no private address"))
        })?;

        if !self.already_settled(ctx, ResourceKind::Desktop) {
            ctx.checkpoint.mark_settled(ResourceKind::Desktop);
            self.persist(ctx).await?;
        }
        self.emit(ProgressEvent::StageCompleted {
            stage: ctx.stage,
            resource_id: desktop_id.to_string(),
        });
        Ok(private_address)
    }

    async fn resolve_public_address(
        &self,
        ctx: &mut RunContext,
        private_address: &str,
    ) -> Result<String> {
        ctx.stage = Stage::ResolvePublicAddress;
        self.ensure_not_cancelled()?;
        self.emit(ProgressEvent::StageStarted {
            stage: ctx.stage,
            detail: format!("resolving public address of {private_address}"),
        });

        let public_address = self
            .provider
            .resolve_public_address(private_address)
            .await?;
        if public_address.is_empty() {
            return Err(CloudError::NotFound(format!(
                "no public address associated with {private_address}"
            )));
        }

        self.emit(ProgressEvent::StageCompleted {
            stage: ctx.stage,
            resource_id: public_address.clone(),
        });
        Ok(public_address)
    }

    async fn finish(&self, mut ctx: RunContext) {
        if let Some(store) = &self.store
            && let Err(e) = store.clear().await
        {
            tracing::warn!("Failed to clear checkpoint: {}", e);
        }
        release(&mut ctx).await;
    }

    async fn abort(&self, mut ctx: RunContext, error: CloudError) -> PipelineAborted {
        let stage = ctx.stage;
        let created = CreatedResources::from_checkpoint(&ctx.checkpoint);
        self.emit(ProgressEvent::Aborted {
            stage,
            error: error.to_string(),
        });

        // A resource in the error state cannot be reused by a resumed run
        if let CloudError::ResourceFailed { kind, .. } = &error {
            ctx.checkpoint.forget(*kind);
        }

        let compensation = if self.cleanup_on_abort {
            self.compensate(&created).await
        } else {
            if !created.is_empty() {
                tracing::warn!("Leaving created resources in place: {:?}", created);
            }
            Vec::new()
        };
        for outcome in compensation.iter().filter(|o| o.succeeded()) {
            ctx.checkpoint.forget(outcome.kind);
        }

        if let Some(store) = &self.store {
            let saved = if ctx.checkpoint.stages.is_empty() {
                store.clear().await
            } else {
                store.save(&ctx.checkpoint).await
            };
            if let Err(e) = saved {
                tracing::warn!("Failed to update checkpoint after abort: {}", e);
            }
        }
        release(&mut ctx).await;

        PipelineAborted {
            stage,
            source: error,
            created,
            compensation,
        }
    }

    /// Best-effort removal, newest first; failures are recorded, never raised
    async fn compensate(&self, created: &CreatedResources) -> Vec<CompensationOutcome> {
        let mut outcomes = Vec::new();
        for (kind, id) in created.newest_first() {
            let result = match kind {
                ResourceKind::Desktop => self.provider.terminate_desktop(id).await,
                ResourceKind::Bundle => self.provider.delete_bundle(id).await,
                ResourceKind::Image => self.provider.delete_image(id).await,
                ResourceKind::NetworkInterface => Ok(()),
            };
            let outcome = CompensationOutcome {
                kind,
                resource_id: id.to_string(),
                error: result.err().map(|e| e.to_string()),
            };
            self.emit(ProgressEvent::Compensated {
                kind,
                resource_id: outcome.resource_id.clone(),
                error: outcome.error.clone(),
            });
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Id recorded by an earlier attempt, if any
    fn recorded(&self, ctx: &RunContext, kind: ResourceKind) -> Option<String> {
        let record = ctx.checkpoint.stage(kind)?;
        self.emit(ProgressEvent::StageSkipped {
            stage: ctx.stage,
            resource_id: record.resource_id.clone(),
        });
        Some(record.resource_id.clone())
    }

    fn already_settled(&self, ctx: &RunContext, kind: ResourceKind) -> bool {
        ctx.checkpoint
            .stage(kind)
            .is_some_and(StageRecord::is_settled)
    }

    async fn submitted(&self, ctx: &mut RunContext, kind: ResourceKind, id: &str) -> Result<()> {
        let key = ctx.checkpoint.idempotency_key(kind);
        ctx.checkpoint.record(kind, StageRecord::submitted(id, key));
        self.persist(ctx).await?;
        self.emit(ProgressEvent::StageCompleted {
            stage: ctx.stage,
            resource_id: id.to_string(),
        });
        Ok(())
    }

    async fn settled(&self, ctx: &mut RunContext, kind: ResourceKind, id: &str) -> Result<()> {
        ctx.checkpoint.mark_settled(kind);
        self.persist(ctx).await?;
        self.emit(ProgressEvent::StageCompleted {
            stage: ctx.stage,
            resource_id: id.to_string(),
        });
        Ok(())
    }

    async fn persist(&self, ctx: &RunContext) -> Result<()> {
        match &self.store {
            Some(store) => store.save(&ctx.checkpoint).await,
            None => Ok(()),
        }
    }

    fn polled(&self, kind: ResourceKind, id: &str, state: &str) {
        self.emit(ProgressEvent::Polled {
            kind,
            id: id.to_string(),
            state: state.to_string(),
        });
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        match self.cancel.reason() {
            Some(reason) => Err(CloudError::Cancelled(reason)),
            None => Ok(()),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        self.reporter.on_event(&event);
    }
}

async fn release(ctx: &mut RunContext) {
    if let Some(lock) = ctx.lock.take()
        && let Err(e) = lock.release().await
    {
        tracing::warn!("Failed to release checkpoint lock: {}", e);
    }
}

fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn require_id(kind: ResourceKind, id: String) -> Result<String> {
    if id.trim().is_empty() {
        return Err(ProviderError::Api(format!("create {kind} returned an empty identifier")).into());
    }
    Ok(id)
}
