//! Cloud provider error types

use crate::resource::ResourceKind;
use std::time::Duration;
use thiserror::Error;

/// Faults reported by the provider's control-plane API itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),
}

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("{kind} {id} reached the error state: {reason}")]
    ResourceFailed {
        kind: ResourceKind,
        id: String,
        reason: String,
    },

    #[error("Timed out waiting for {kind} {id} after {attempts} attempts ({}s)", .elapsed.as_secs())]
    Timeout {
        kind: ResourceKind,
        id: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// The resource reached the provider-defined error state
    pub fn is_resource_failure(&self) -> bool {
        matches!(self, CloudError::ResourceFailed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CloudError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
