//! Kubernetes-backed template catalog.

use async_trait::async_trait;
use kube::{
    api::{Api, ListParams},
    Client,
};
use tracing::debug;

use super::{CatalogError, LabelSelector, TemplateCatalog};
use crate::api::ModuleTemplate;

/// Lists `ModuleTemplate`s through the API server of one cluster.
///
/// Used for the control plane and, with a remote client, for templates
/// synchronised into a managed cluster.
#[derive(Clone)]
pub struct KubeTemplateCatalog {
    api: Api<ModuleTemplate>,
}

impl KubeTemplateCatalog {
    /// Catalog limited to one namespace.
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl TemplateCatalog for KubeTemplateCatalog {
    async fn list(&self, selector: &LabelSelector) -> Result<Vec<ModuleTemplate>, CatalogError> {
        let params = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&selector.to_string())
        };
        let templates = self.api.list(&params).await?;
        debug!(
            selector = %selector,
            count = templates.items.len(),
            "Listed module templates"
        );
        Ok(templates.items)
    }
}
