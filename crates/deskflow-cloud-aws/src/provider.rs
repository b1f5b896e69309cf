//! AWS WorkSpaces provider implementation

use crate::error::{invalid_request, map_sdk_error};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_ec2::types::Filter;
use aws_sdk_workspaces::types::{
    Compute, ComputeType, RootStorage, Tag, TerminateRequest, UserStorage,
    WorkspaceImageIngestionProcess, WorkspaceRequest,
};
use deskflow_cloud::{
    BundleInfo, CloudError, CreateBundleRequest, CreateDesktopRequest, DesktopInfo,
    DesktopProvider, ImageInfo, ImportImageRequest, ProviderError, ResourceKind, ResourceStatus,
    Result,
};

/// Default region when neither configuration nor environment names one
pub const DEFAULT_REGION: &str = "ap-southeast-1";

/// Tag attached to every created resource
pub const IDEMPOTENCY_TAG: &str = "deskflow:idempotency-key";

/// Map an image or bundle state onto the pipeline's view
pub fn image_status(state: &str) -> ResourceStatus {
    match state {
        "AVAILABLE" => ResourceStatus::Available,
        "ERROR" => ResourceStatus::Error,
        _ => ResourceStatus::Pending,
    }
}

/// Map a desktop state; a desktop that is going away never becomes usable
pub fn desktop_status(state: &str) -> ResourceStatus {
    match state {
        "AVAILABLE" => ResourceStatus::Available,
        "ERROR" | "TERMINATING" | "TERMINATED" => ResourceStatus::Error,
        _ => ResourceStatus::Pending,
    }
}

/// AWS WorkSpaces provider
///
/// Images, bundles and desktops go through the WorkSpaces API; the public
/// address lookup goes through EC2 network interfaces.
pub struct AwsWorkspacesProvider {
    workspaces: aws_sdk_workspaces::Client,
    ec2: aws_sdk_ec2::Client,
    region: String,
}

impl AwsWorkspacesProvider {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            workspaces: aws_sdk_workspaces::Client::new(config),
            ec2: aws_sdk_ec2::Client::new(config),
            region: config
                .region()
                .map(|r| r.to_string())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        }
    }

    /// Load credentials from the default chain, optionally through a named profile.
    ///
    /// Region order: `region`, then the SDK default chain (`AWS_REGION`,
    /// profile), then [`DEFAULT_REGION`].
    pub async fn from_env(region: Option<&str>, profile: Option<&str>) -> Self {
        let region_chain = RegionProviderChain::first_try(region.map(|r| Region::new(r.to_string())))
            .or_default_provider()
            .or_else(Region::from_static(DEFAULT_REGION));
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_chain);
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;
        let provider = Self::new(&config);
        tracing::debug!("AWS config loaded for region {}", provider.region);
        provider
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn tags(operation: &str, idempotency_key: Option<&str>) -> Result<Vec<Tag>> {
        let Some(key) = idempotency_key else {
            return Ok(Vec::new());
        };
        let tag = Tag::builder()
            .key(IDEMPOTENCY_TAG)
            .value(key)
            .build()
            .map_err(|e| invalid_request(operation, e))?;
        Ok(vec![tag])
    }
}

fn missing_id(operation: &str, kind: ResourceKind) -> CloudError {
    ProviderError::Api(format!("{operation} returned no {kind} id")).into()
}

#[async_trait]
impl DesktopProvider for AwsWorkspacesProvider {
    fn name(&self) -> &str {
        "aws-workspaces"
    }

    async fn import_image(&self, request: &ImportImageRequest) -> Result<String> {
        const OP: &str = "ImportWorkspaceImage";
        tracing::info!(
            "Importing {} as image {} ({})",
            request.source_image_id,
            request.name,
            request.ingestion_process
        );

        let output = self
            .workspaces
            .import_workspace_image()
            .ec2_image_id(&request.source_image_id)
            .ingestion_process(WorkspaceImageIngestionProcess::from(
                request.ingestion_process.as_str(),
            ))
            .image_name(&request.name)
            .image_description(&request.description)
            .set_tags(Some(Self::tags(OP, request.idempotency_key.as_deref())?))
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        output
            .image_id()
            .map(str::to_string)
            .ok_or_else(|| missing_id(OP, ResourceKind::Image))
    }

    async fn describe_image(&self, image_id: &str) -> Result<Option<ImageInfo>> {
        let output = self
            .workspaces
            .describe_workspace_images()
            .image_ids(image_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("DescribeWorkspaceImages", e))?;

        Ok(output.images().first().map(|image| {
            let raw_state = image
                .state()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default();
            ImageInfo {
                id: image.image_id().unwrap_or(image_id).to_string(),
                name: image.name().map(str::to_string),
                description: image.description().map(str::to_string),
                status: image_status(&raw_state),
                raw_state,
                error_message: image.error_message().map(str::to_string),
            }
        }))
    }

    async fn create_bundle(&self, request: &CreateBundleRequest) -> Result<String> {
        const OP: &str = "CreateWorkspaceBundle";
        tracing::info!(
            "Creating bundle {} from image {} ({}, user {} GiB, root {} GiB)",
            request.name,
            request.image_id,
            request.compute_tier,
            request.user_storage_gib,
            request.root_storage_gib
        );

        let compute = ComputeType::builder()
            .name(Compute::from(request.compute_tier.as_str()))
            .build();
        let user_storage = UserStorage::builder()
            .capacity(request.user_storage_gib.to_string())
            .build()
            .map_err(|e| invalid_request(OP, e))?;
        let root_storage = RootStorage::builder()
            .capacity(request.root_storage_gib.to_string())
            .build()
            .map_err(|e| invalid_request(OP, e))?;

        let output = self
            .workspaces
            .create_workspace_bundle()
            .bundle_name(&request.name)
            .bundle_description(&request.description)
            .image_id(&request.image_id)
            .compute_type(compute)
            .user_storage(user_storage)
            .root_storage(root_storage)
            .set_tags(Some(Self::tags(OP, request.idempotency_key.as_deref())?))
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        output
            .workspace_bundle()
            .and_then(|bundle| bundle.bundle_id())
            .map(str::to_string)
            .ok_or_else(|| missing_id(OP, ResourceKind::Bundle))
    }

    async fn describe_bundle(&self, bundle_id: &str) -> Result<Option<BundleInfo>> {
        let output = self
            .workspaces
            .describe_workspace_bundles()
            .bundle_ids(bundle_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("DescribeWorkspaceBundles", e))?;

        Ok(output.bundles().first().map(|bundle| {
            let raw_state = bundle
                .state()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default();
            BundleInfo {
                id: bundle.bundle_id().unwrap_or(bundle_id).to_string(),
                name: bundle.name().map(str::to_string),
                status: image_status(&raw_state),
                raw_state,
            }
        }))
    }

    async fn create_desktop(&self, request: &CreateDesktopRequest) -> Result<String> {
        const OP: &str = "CreateWorkspaces";
        tracing::info!(
            "Creating desktop for {} in {} from bundle {}",
            request.user_name,
            request.directory_id,
            request.bundle_id
        );

        let workspace = WorkspaceRequest::builder()
            .directory_id(&request.directory_id)
            .user_name(&request.user_name)
            .bundle_id(&request.bundle_id)
            .set_tags(Some(Self::tags(OP, request.idempotency_key.as_deref())?))
            .build()
            .map_err(|e| invalid_request(OP, e))?;

        let output = self
            .workspaces
            .create_workspaces()
            .workspaces(workspace)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        if let Some(failed) = output.failed_requests().first() {
            return Err(ProviderError::InvalidRequest(format!(
                "{OP}: {}: {}",
                failed.error_code().unwrap_or("unknown"),
                failed.error_message().unwrap_or("request rejected")
            ))
            .into());
        }

        output
            .pending_requests()
            .first()
            .and_then(|workspace| workspace.workspace_id())
            .map(str::to_string)
            .ok_or_else(|| missing_id(OP, ResourceKind::Desktop))
    }

    async fn describe_desktop(&self, desktop_id: &str) -> Result<Option<DesktopInfo>> {
        let output = self
            .workspaces
            .describe_workspaces()
            .workspace_ids(desktop_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("DescribeWorkspaces", e))?;

        Ok(output.workspaces().first().map(|workspace| {
            let raw_state = workspace
                .state()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default();
            DesktopInfo {
                id: workspace.workspace_id().unwrap_or(desktop_id).to_string(),
                bundle_id: workspace.bundle_id().map(str::to_string),
                directory_id: workspace.directory_id().map(str::to_string),
                user_name: workspace.user_name().map(str::to_string),
                status: desktop_status(&raw_state),
                raw_state,
                private_address: workspace.ip_address().map(str::to_string),
                error_message: workspace.error_message().map(str::to_string),
            }
        }))
    }

    async fn resolve_public_address(&self, private_address: &str) -> Result<String> {
        let output = self
            .ec2
            .describe_network_interfaces()
            .filters(
                Filter::builder()
                    .name("private-ip-address")
                    .values(private_address)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| map_sdk_error("DescribeNetworkInterfaces", e))?;

        let interface = output.network_interfaces().first().ok_or_else(|| {
            CloudError::NotFound(format!("no network interface with address {private_address}"))
        })?;

        interface
            .association()
            .and_then(|association| association.public_ip())
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                CloudError::NotFound(format!(
                    "network interface {} has no public address",
                    interface.network_interface_id().unwrap_or(private_address)
                ))
            })
    }

    async fn delete_image(&self, image_id: &str) -> Result<()> {
        tracing::info!("Deleting image {}", image_id);
        self.workspaces
            .delete_workspace_image()
            .image_id(image_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("DeleteWorkspaceImage", e))?;
        Ok(())
    }

    async fn delete_bundle(&self, bundle_id: &str) -> Result<()> {
        tracing::info!("Deleting bundle {}", bundle_id);
        self.workspaces
            .delete_workspace_bundle()
            .bundle_id(bundle_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("DeleteWorkspaceBundle", e))?;
        Ok(())
    }

    async fn terminate_desktop(&self, desktop_id: &str) -> Result<()> {
        const OP: &str = "TerminateWorkspaces";
        tracing::info!("Terminating desktop {}", desktop_id);

        let request = TerminateRequest::builder()
            .workspace_id(desktop_id)
            .build()
            .map_err(|e| invalid_request(OP, e))?;
        let output = self
            .workspaces
            .terminate_workspaces()
            .terminate_workspace_requests(request)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        if let Some(failed) = output.failed_requests().first() {
            return Err(ProviderError::Api(format!(
                "{OP}: {}: {}",
                failed.error_code().unwrap_or("unknown"),
                failed.error_message().unwrap_or("request rejected")
            ))
            .into());
        }
        Ok(())
    }
}
