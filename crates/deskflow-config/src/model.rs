//! 設定モデル

use deskflow_cloud::{
    BundleSpec, ComputeTier, DesktopSpec, ImageSpec, IngestionProcess, ProvisionPlan, StageWaits,
};
use std::path::PathBuf;

pub const DEFAULT_SOURCE_IMAGE: &str = "ami-xxxxxx";
pub const DEFAULT_IMAGE_NAME: &str = "byop-washua";
pub const DEFAULT_BUNDLE_NAME: &str = "byop-bundle";
pub const DEFAULT_BUNDLE_DESCRIPTION: &str = "test-bundle-description";
pub const DEFAULT_USER_STORAGE_GIB: u32 = 50;
pub const DEFAULT_ROOT_STORAGE_GIB: u32 = 80;
pub const DEFAULT_DIRECTORY_ID: &str = "d-xxxxxxx";
pub const DEFAULT_USER_NAME: &str = "helload";
pub const DEFAULT_STATE_DIR: &str = ".deskflow";

/// deskflow の実行設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeskflowConfig {
    /// None の場合はプロバイダのデフォルト
    pub region: Option<String>,
    pub profile: Option<String>,
    /// チェックポイントとロックの保存先
    pub state_dir: PathBuf,
    pub cleanup_on_abort: bool,
    pub plan: ProvisionPlan,
    pub waits: StageWaits,
    /// 読み込んだ設定ファイル (デフォルト設定の場合は None)
    pub source: Option<PathBuf>,
}

impl Default for DeskflowConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            cleanup_on_abort: false,
            plan: ProvisionPlan {
                image: ImageSpec {
                    source_image_id: DEFAULT_SOURCE_IMAGE.to_string(),
                    name: DEFAULT_IMAGE_NAME.to_string(),
                    description: DEFAULT_SOURCE_IMAGE.to_string(),
                    ingestion_process: IngestionProcess::default(),
                },
                bundle: BundleSpec {
                    name: DEFAULT_BUNDLE_NAME.to_string(),
                    description: DEFAULT_BUNDLE_DESCRIPTION.to_string(),
                    compute_tier: ComputeTier::default(),
                    user_storage_gib: DEFAULT_USER_STORAGE_GIB,
                    root_storage_gib: DEFAULT_ROOT_STORAGE_GIB,
                },
                desktop: DesktopSpec {
                    directory_id: DEFAULT_DIRECTORY_ID.to_string(),
                    user_name: DEFAULT_USER_NAME.to_string(),
                },
            },
            waits: StageWaits::default(),
            source: None,
        }
    }
}
