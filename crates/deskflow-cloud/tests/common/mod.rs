use async_trait::async_trait;
use deskflow_cloud::{
    BundleInfo, BundleSpec, CloudError, ComputeTier, CreateBundleRequest, CreateDesktopRequest,
    DesktopInfo, DesktopProvider, DesktopSpec, ImageInfo, ImageSpec, ImportImageRequest,
    IngestionProcess, ProgressEvent, ProgressReporter, ProviderError, ProvisionPlan,
    ResourceStatus, StageWaits, WaitConfig,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Provider API call as observed by the scripted provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ImportImage(String),
    DescribeImage(String),
    CreateBundle(String),
    DescribeBundle(String),
    CreateDesktop(String),
    DescribeDesktop(String),
    ResolvePublicAddress(String),
    DeleteImage(String),
    DeleteBundle(String),
    TerminateDesktop(String),
}

impl Call {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Call::ImportImage(_) | Call::CreateBundle(_) | Call::CreateDesktop(_)
        )
    }
}

/// Describe responses; the last one repeats forever
struct Script {
    queue: VecDeque<Option<ResourceStatus>>,
}

impl Script {
    fn new(states: Vec<Option<ResourceStatus>>) -> Self {
        assert!(!states.is_empty());
        Self {
            queue: states.into(),
        }
    }

    fn next(&mut self) -> Option<ResourceStatus> {
        if self.queue.len() > 1 {
            self.queue.pop_front().flatten()
        } else {
            self.queue.front().copied().flatten()
        }
    }
}

/// In-memory provider driven by per-kind status scripts
pub struct ScriptedProvider {
    pub image_id: String,
    pub bundle_id: String,
    pub desktop_id: String,
    pub private_address: Option<String>,
    pub public_address: Option<String>,
    pub fail_deletes: bool,
    images: Mutex<Script>,
    bundles: Mutex<Script>,
    desktops: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
}

fn raw(status: ResourceStatus) -> String {
    match status {
        ResourceStatus::Pending => "PENDING",
        ResourceStatus::Available => "AVAILABLE",
        ResourceStatus::Error => "ERROR",
    }
    .to_string()
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            image_id: "img-1".to_string(),
            bundle_id: "wsb-1".to_string(),
            desktop_id: "ws-1".to_string(),
            private_address: Some("10.0.0.5".to_string()),
            public_address: Some("52.1.2.3".to_string()),
            fail_deletes: false,
            images: Mutex::new(Script::new(vec![Some(ResourceStatus::Available)])),
            bundles: Mutex::new(Script::new(vec![Some(ResourceStatus::Available)])),
            desktops: Mutex::new(Script::new(vec![Some(ResourceStatus::Available)])),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `None` entries model describe calls that return zero results
    pub fn image_states(self, states: Vec<Option<ResourceStatus>>) -> Self {
        *self.images.lock().unwrap() = Script::new(states);
        self
    }

    pub fn bundle_states(self, states: Vec<Option<ResourceStatus>>) -> Self {
        *self.bundles.lock().unwrap() = Script::new(states);
        self
    }

    pub fn desktop_states(self, states: Vec<Option<ResourceStatus>>) -> Self {
        *self.desktops.lock().unwrap() = Script::new(states);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DesktopProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn import_image(&self, request: &ImportImageRequest) -> deskflow_cloud::Result<String> {
        self.log(Call::ImportImage(request.source_image_id.clone()));
        Ok(self.image_id.clone())
    }

    async fn describe_image(&self, image_id: &str) -> deskflow_cloud::Result<Option<ImageInfo>> {
        self.log(Call::DescribeImage(image_id.to_string()));
        let status = self.images.lock().unwrap().next();
        Ok(status.map(|status| ImageInfo {
            id: image_id.to_string(),
            name: Some("byop-image".to_string()),
            description: None,
            status,
            raw_state: raw(status),
            error_message: (status == ResourceStatus::Error)
                .then(|| "image validation failed".to_string()),
        }))
    }

    async fn create_bundle(&self, request: &CreateBundleRequest) -> deskflow_cloud::Result<String> {
        self.log(Call::CreateBundle(request.image_id.clone()));
        Ok(self.bundle_id.clone())
    }

    async fn describe_bundle(&self, bundle_id: &str) -> deskflow_cloud::Result<Option<BundleInfo>> {
        self.log(Call::DescribeBundle(bundle_id.to_string()));
        let status = self.bundles.lock().unwrap().next();
        Ok(status.map(|status| BundleInfo {
            id: bundle_id.to_string(),
            name: Some("byop-bundle".to_string()),
            status,
            raw_state: raw(status),
        }))
    }

    async fn create_desktop(&self, request: &CreateDesktopRequest) -> deskflow_cloud::Result<String> {
        self.log(Call::CreateDesktop(request.bundle_id.clone()));
        Ok(self.desktop_id.clone())
    }

    async fn describe_desktop(
        &self,
        desktop_id: &str,
    ) -> deskflow_cloud::Result<Option<DesktopInfo>> {
        self.log(Call::DescribeDesktop(desktop_id.to_string()));
        let status = self.desktops.lock().unwrap().next();
        Ok(status.map(|status| DesktopInfo {
            id: desktop_id.to_string(),
            bundle_id: Some(self.bundle_id.clone()),
            directory_id: Some("d-1".to_string()),
            user_name: Some("alice".to_string()),
            status,
            raw_state: raw(status),
            private_address: (status == ResourceStatus::Available)
                .then(|| self.private_address.clone())
                .flatten(),
            error_message: None,
        }))
    }

    async fn resolve_public_address(&self, private_address: &str) -> deskflow_cloud::Result<String> {
        self.log(Call::ResolvePublicAddress(private_address.to_string()));
        self.public_address.clone().ok_or_else(|| {
            CloudError::NotFound(format!("no network interface with {private_address}"))
        })
    }

    async fn delete_image(&self, image_id: &str) -> deskflow_cloud::Result<()> {
        self.log(Call::DeleteImage(image_id.to_string()));
        self.delete_result()
    }

    async fn delete_bundle(&self, bundle_id: &str) -> deskflow_cloud::Result<()> {
        self.log(Call::DeleteBundle(bundle_id.to_string()));
        self.delete_result()
    }

    async fn terminate_desktop(&self, desktop_id: &str) -> deskflow_cloud::Result<()> {
        self.log(Call::TerminateDesktop(desktop_id.to_string()));
        self.delete_result()
    }
}

impl ScriptedProvider {
    fn delete_result(&self) -> deskflow_cloud::Result<()> {
        if self.fail_deletes {
            Err(ProviderError::Api("resource is in use".to_string()).into())
        } else {
            Ok(())
        }
    }
}

/// Reporter that keeps every event
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

#[allow(dead_code)]
impl RecordingReporter {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub fn plan() -> ProvisionPlan {
    ProvisionPlan {
        image: ImageSpec {
            source_image_id: "ami-123".to_string(),
            name: "byop-image".to_string(),
            description: "ami-123".to_string(),
            ingestion_process: IngestionProcess::ByolRegularByop,
        },
        bundle: BundleSpec {
            name: "byop-bundle".to_string(),
            description: "test bundle".to_string(),
            compute_tier: ComputeTier::Standard,
            user_storage_gib: 50,
            root_storage_gib: 80,
        },
        desktop: DesktopSpec {
            directory_id: "d-1".to_string(),
            user_name: "alice".to_string(),
        },
    }
}

/// One-second polling, unbounded
pub fn fast_waits() -> StageWaits {
    StageWaits {
        image: WaitConfig::new(Duration::from_secs(1)),
        bundle: WaitConfig::new(Duration::from_secs(1)),
        desktop: WaitConfig::new(Duration::from_secs(1)),
    }
}

/// One-second polling, at most `attempts` describe calls per resource
#[allow(dead_code)]
pub fn bounded_waits(attempts: u32) -> StageWaits {
    let wait = WaitConfig::new(Duration::from_secs(1)).with_max_attempts(attempts);
    StageWaits {
        image: wait.clone(),
        bundle: wait.clone(),
        desktop: wait,
    }
}
