//! AWS WorkSpaces provider for deskflow
//!
//! This crate implements the `DesktopProvider` trait on top of the AWS SDK:
//! images, bundles and desktops through WorkSpaces, public address lookup
//! through EC2 network interfaces.
//!
//! # Requirements
//!
//! - AWS credentials resolvable by the default provider chain
//!   (environment, shared profile, SSO or instance role)
//! - A registered WorkSpaces directory for the target user
//!
//! # Example
//!
//! ```ignore
//! use deskflow_cloud::{DesktopProvider, Pipeline};
//! use deskflow_cloud_aws::AwsWorkspacesProvider;
//! use std::sync::Arc;
//!
//! let provider = AwsWorkspacesProvider::from_env(Some("ap-southeast-1"), None).await;
//! let desktop = Pipeline::new(Arc::new(provider), plan).run().await?;
//! println!("{}", desktop.public_address);
//! ```

mod error;
pub mod provider;

pub use provider::{
    AwsWorkspacesProvider, DEFAULT_REGION, IDEMPOTENCY_TAG, desktop_status, image_status,
};
