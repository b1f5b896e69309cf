//! Resource model shared by every provider
//!
//! All entities are remote and referenced by opaque provider ids. The types
//! here carry only what the provisioning pipeline reads or sends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of remote resource managed through the provider API
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Image,
    Bundle,
    Desktop,
    NetworkInterface,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Image => write!(f, "image"),
            ResourceKind::Bundle => write!(f, "bundle"),
            ResourceKind::Desktop => write!(f, "desktop"),
            ResourceKind::NetworkInterface => write!(f, "network-interface"),
        }
    }
}

/// Provider status folded onto the three states the pipeline cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Still being created or in a transitional state
    Pending,
    /// Ready for use
    Available,
    /// Provider-defined error state
    Error,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceStatus::Pending => write!(f, "pending"),
            ResourceStatus::Available => write!(f, "available"),
            ResourceStatus::Error => write!(f, "error"),
        }
    }
}

/// Compute tier of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputeTier {
    Value,
    #[default]
    Standard,
    Performance,
    Power,
    Powerpro,
    Graphics,
    Graphicspro,
    #[serde(rename = "GRAPHICS_G4DN")]
    GraphicsG4dn,
    #[serde(rename = "GRAPHICSPRO_G4DN")]
    GraphicsproG4dn,
}

impl ComputeTier {
    /// Wire name used by the WorkSpaces API
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "VALUE",
            Self::Standard => "STANDARD",
            Self::Performance => "PERFORMANCE",
            Self::Power => "POWER",
            Self::Powerpro => "POWERPRO",
            Self::Graphics => "GRAPHICS",
            Self::Graphicspro => "GRAPHICSPRO",
            Self::GraphicsG4dn => "GRAPHICS_G4DN",
            Self::GraphicsproG4dn => "GRAPHICSPRO_G4DN",
        }
    }
}

impl FromStr for ComputeTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "VALUE" => Ok(Self::Value),
            "STANDARD" => Ok(Self::Standard),
            "PERFORMANCE" => Ok(Self::Performance),
            "POWER" => Ok(Self::Power),
            "POWERPRO" => Ok(Self::Powerpro),
            "GRAPHICS" => Ok(Self::Graphics),
            "GRAPHICSPRO" => Ok(Self::Graphicspro),
            "GRAPHICS_G4DN" => Ok(Self::GraphicsG4dn),
            "GRAPHICSPRO_G4DN" => Ok(Self::GraphicsproG4dn),
            other => Err(format!("unknown compute tier: {other}")),
        }
    }
}

impl fmt::Display for ComputeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an imported machine image is ingested (licensing model)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IngestionProcess {
    #[serde(rename = "BYOL_REGULAR")]
    ByolRegular,
    #[default]
    #[serde(rename = "BYOL_REGULAR_BYOP")]
    ByolRegularByop,
    #[serde(rename = "BYOL_REGULAR_WSP")]
    ByolRegularWsp,
    #[serde(rename = "BYOL_GRAPHICS_G4DN")]
    ByolGraphicsG4dn,
    #[serde(rename = "BYOL_GRAPHICS_G4DN_BYOP")]
    ByolGraphicsG4dnByop,
}

impl IngestionProcess {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ByolRegular => "BYOL_REGULAR",
            Self::ByolRegularByop => "BYOL_REGULAR_BYOP",
            Self::ByolRegularWsp => "BYOL_REGULAR_WSP",
            Self::ByolGraphicsG4dn => "BYOL_GRAPHICS_G4DN",
            Self::ByolGraphicsG4dnByop => "BYOL_GRAPHICS_G4DN_BYOP",
        }
    }
}

impl FromStr for IngestionProcess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "BYOL_REGULAR" => Ok(Self::ByolRegular),
            "BYOL_REGULAR_BYOP" => Ok(Self::ByolRegularByop),
            "BYOL_REGULAR_WSP" => Ok(Self::ByolRegularWsp),
            "BYOL_GRAPHICS_G4DN" => Ok(Self::ByolGraphicsG4dn),
            "BYOL_GRAPHICS_G4DN_BYOP" => Ok(Self::ByolGraphicsG4dnByop),
            other => Err(format!("unknown ingestion process: {other}")),
        }
    }
}

impl fmt::Display for IngestionProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for importing a machine image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportImageRequest {
    /// Pre-existing source machine image (e.g. `ami-...`)
    pub source_image_id: String,
    pub name: String,
    pub description: String,
    pub ingestion_process: IngestionProcess,
    pub idempotency_key: Option<String>,
}

/// Parameters for deriving a bundle from an available image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBundleRequest {
    pub image_id: String,
    pub name: String,
    pub description: String,
    pub compute_tier: ComputeTier,
    /// User volume size in GiB
    pub user_storage_gib: u32,
    /// Root volume size in GiB
    pub root_storage_gib: u32,
    pub idempotency_key: Option<String>,
}

/// Parameters for instantiating a desktop from an available bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDesktopRequest {
    pub bundle_id: String,
    pub directory_id: String,
    pub user_name: String,
    pub idempotency_key: Option<String>,
}

/// Describe result for an imported image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: ResourceStatus,
    /// Provider state string as returned (for logs)
    pub raw_state: String,
    pub error_message: Option<String>,
}

/// Describe result for a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    pub id: String,
    pub name: Option<String>,
    pub status: ResourceStatus,
    pub raw_state: String,
}

/// Describe result for a desktop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopInfo {
    pub id: String,
    pub bundle_id: Option<String>,
    pub directory_id: Option<String>,
    pub user_name: Option<String>,
    pub status: ResourceStatus,
    pub raw_state: String,
    pub private_address: Option<String>,
    pub error_message: Option<String>,
}
