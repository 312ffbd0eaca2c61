//! Kubernetes-backed tenant reader.

use async_trait::async_trait;
use kube::{
    api::{Api, ListParams},
    Client,
};

use super::{TenantError, TenantReader};
use crate::api::Tenant;

#[derive(Clone)]
pub struct KubeTenantReader {
    client: Client,
    namespace: String,
}

impl KubeTenantReader {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl TenantReader for KubeTenantReader {
    async fn get(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<Tenant>, TenantError> {
        let namespace = namespace
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.namespace);
        let tenants: Api<Tenant> = Api::namespaced(self.client.clone(), namespace);
        Ok(tenants.get_opt(name).await?)
    }

    async fn list(&self) -> Result<Vec<Tenant>, TenantError> {
        let tenants: Api<Tenant> = Api::namespaced(self.client.clone(), &self.namespace);
        Ok(tenants.list(&ListParams::default()).await?.items)
    }
}
