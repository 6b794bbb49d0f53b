//! Provider trait definition

use crate::error::ProviderResult;
use async_trait::async_trait;
use provflow_core::{CreateParams, LookupFilter, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider abstraction trait
///
/// One implementation per cloud or service. The orchestrator only ever talks to
/// this trait and never builds provider-specific requests itself.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the provider name (e.g., "exec", "memory")
    fn name(&self) -> &str;

    /// Check connectivity and credentials (pre-flight only)
    async fn check_auth(&self) -> ProviderResult<AuthStatus>;

    /// Find an existing resource matching the filter
    async fn lookup(
        &self,
        kind: &ResourceKind,
        filter: &LookupFilter,
    ) -> ProviderResult<Option<ExternalId>>;

    /// Create a resource and return its provider-assigned id
    async fn create(&self, kind: &ResourceKind, params: &CreateParams)
    -> ProviderResult<ExternalId>;

    /// Report the current provisioning status of a resource
    async fn describe(
        &self,
        kind: &ResourceKind,
        external_id: &ExternalId,
    ) -> ProviderResult<ResourceStatus>;

    /// Delete a resource
    async fn delete(&self, kind: &ResourceKind, external_id: &ExternalId) -> ProviderResult<()>;
}

/// Provider-assigned resource identifier (e.g. `vpc-0a1b2c`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExternalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ExternalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status reported by `describe`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Still initializing
    Provisioning,
    /// Usable
    Ready,
    /// Terminal error state
    Failed(String),
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceStatus::Provisioning => write!(f, "provisioning"),
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}
