//! In-memory tenant reader.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use kube::ResourceExt;
use parking_lot::RwLock;

use super::{TenantError, TenantReader};
use crate::api::Tenant;

const DEFAULT_NAMESPACE: &str = "default";

/// Tenants kept in memory, keyed by `(namespace, name)`.
pub struct InMemoryTenantReader {
    namespace: String,
    tenants: RwLock<BTreeMap<(String, String), Tenant>>,
    fail: AtomicBool,
}

impl Default for InMemoryTenantReader {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl InMemoryTenantReader {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            tenants: RwLock::new(BTreeMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Insert or replace a tenant. Tenants without a namespace land in the
    /// reader's default namespace.
    pub fn upsert(&self, tenant: Tenant) {
        let namespace = tenant
            .namespace()
            .unwrap_or_else(|| self.namespace.clone());
        self.tenants
            .write()
            .insert((namespace, tenant.name_any()), tenant);
    }

    pub fn remove(&self, name: &str, namespace: Option<&str>) -> Option<Tenant> {
        let namespace = namespace.unwrap_or(&self.namespace).to_string();
        self.tenants.write().remove(&(namespace, name.to_string()))
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), TenantError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TenantError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TenantReader for InMemoryTenantReader {
    async fn get(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<Tenant>, TenantError> {
        self.check()?;
        let namespace = namespace
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.namespace)
            .to_string();
        Ok(self
            .tenants
            .read()
            .get(&(namespace, name.to_string()))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Tenant>, TenantError> {
        self.check()?;
        Ok(self.tenants.read().values().cloned().collect())
    }
}
