//! Read access to `Tenant` resources.

mod cluster;
mod memory;

pub use cluster::KubeTenantReader;
pub use memory::InMemoryTenantReader;

use async_trait::async_trait;

use crate::api::Tenant;

/// Error types for tenant access.
#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Tenant store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TenantReader: Send + Sync {
    /// Fetch one tenant; `Ok(None)` when it does not exist.
    ///
    /// A `None` namespace means the reader's default namespace.
    async fn get(&self, name: &str, namespace: Option<&str>)
        -> Result<Option<Tenant>, TenantError>;

    async fn list(&self) -> Result<Vec<Tenant>, TenantError>;
}
