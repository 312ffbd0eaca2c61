//! Template catalog: read access to `ModuleTemplate` resources.
//!
//! The resolver issues one scoped list call per lookup and filters the
//! result in memory, since module identity can come from a label, the object
//! name, or the embedded descriptor.
//!
//! - `cluster`: list via the Kubernetes API (control plane or remote cluster)
//! - `memory`: in-memory catalog for tests and local runs

mod cluster;
mod memory;
mod selector;

pub use cluster::KubeTemplateCatalog;
pub use memory::InMemoryTemplateCatalog;
pub use selector::LabelSelector;

use async_trait::async_trait;

use crate::api::ModuleTemplate;

/// Error types for catalog access.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Template catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view over the templates visible to a cluster context.
#[async_trait]
pub trait TemplateCatalog: Send + Sync {
    /// List all templates whose labels match `selector`.
    ///
    /// Ordering is unspecified.
    async fn list(&self, selector: &LabelSelector) -> Result<Vec<ModuleTemplate>, CatalogError>;
}
