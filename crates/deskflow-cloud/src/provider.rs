//! Desktop provider trait definition

use crate::error::Result;
use crate::resource::{
    BundleInfo, CreateBundleRequest, CreateDesktopRequest, DesktopInfo, ImageInfo,
    ImportImageRequest,
};
use async_trait::async_trait;

/// Provider abstraction for virtual desktop provisioning
///
/// One operation per resource kind and action. Implementations perform no
/// retries: a failed call is reported as-is and the caller decides. Create
/// calls provision billable infrastructure and must not be repeated blindly.
///
/// Describe operations return `Ok(None)` when the provider answered with zero
/// results for the id, which happens for a short while after creation.
#[async_trait]
pub trait DesktopProvider: Send + Sync {
    /// Returns the provider name (e.g., "aws-workspaces")
    fn name(&self) -> &str;

    /// Import a machine image; returns the new image id
    async fn import_image(&self, request: &ImportImageRequest) -> Result<String>;

    async fn describe_image(&self, image_id: &str) -> Result<Option<ImageInfo>>;

    /// Create a bundle from an available image; returns the new bundle id
    async fn create_bundle(&self, request: &CreateBundleRequest) -> Result<String>;

    async fn describe_bundle(&self, bundle_id: &str) -> Result<Option<BundleInfo>>;

    /// Create a desktop from an available bundle; returns the new desktop id
    async fn create_desktop(&self, request: &CreateDesktopRequest) -> Result<String>;

    async fn describe_desktop(&self, desktop_id: &str) -> Result<Option<DesktopInfo>>;

    /// Look up the public address associated with a private address.
    ///
    /// Fails with `NotFound` when no network interface matches or the
    /// interface has no public association.
    async fn resolve_public_address(&self, private_address: &str) -> Result<String>;

    /// Delete an imported image (compensation)
    async fn delete_image(&self, image_id: &str) -> Result<()>;

    /// Delete a bundle (compensation)
    async fn delete_bundle(&self, bundle_id: &str) -> Result<()>;

    /// Terminate a desktop (compensation)
    async fn terminate_desktop(&self, desktop_id: &str) -> Result<()>;
}
