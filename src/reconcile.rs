//! Tenant reconciliation workers.
//!
//! A worker takes a tenant off the queue, resolves all of its modules and
//! reports the per-module outcome. Installation of the resolved templates
//! happens elsewhere. Tenants whose catalog reads failed are re-queued with
//! backoff; every other per-module error is final until something changes.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::templatelookup::{ModuleTemplatesByModuleName, TemplateLookup};
use crate::tenant::{TenantError, TenantReader};
use crate::watch::{DedupWorkQueue, WorkItem};

/// Error types for a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to read tenant: {0}")]
    Tenant(#[from] TenantError),

    #[error("template catalog unavailable for modules {modules:?}")]
    CatalogUnavailable { modules: Vec<String> },
}

pub struct TenantReconciler {
    tenants: Arc<dyn TenantReader>,
    lookup: Arc<TemplateLookup>,
}

impl TenantReconciler {
    pub fn new(tenants: Arc<dyn TenantReader>, lookup: Arc<TemplateLookup>) -> Self {
        Self { tenants, lookup }
    }

    /// Resolve every module of the tenant behind `item`.
    ///
    /// Returns `Ok(None)` if the tenant no longer exists.
    pub async fn reconcile(
        &self,
        item: &WorkItem,
    ) -> Result<Option<ModuleTemplatesByModuleName>, ReconcileError> {
        let Some(tenant) = self
            .tenants
            .get(&item.name, item.namespace.as_deref())
            .await?
        else {
            debug!(tenant = %item, "Tenant not found, nothing to reconcile");
            return Ok(None);
        };

        let templates = self.lookup.get_regular_templates(&tenant).await;

        let mut unavailable = Vec::new();
        for (module, result) in &templates {
            match &result.template {
                Ok(template) => info!(
                    tenant = %item,
                    module = %module,
                    channel = %result.desired_channel,
                    template = %template.namespaced_name(),
                    outdated = result.outdated,
                    "Module template resolved"
                ),
                Err(e) if e.is_transient() => {
                    unavailable.push(module.clone());
                }
                Err(e) => warn!(
                    tenant = %item,
                    module = %module,
                    channel = %result.desired_channel,
                    reason = e.reason(),
                    error = %e,
                    "Module template not usable"
                ),
            }
        }

        if !unavailable.is_empty() {
            return Err(ReconcileError::CatalogUnavailable {
                modules: unavailable,
            });
        }
        Ok(Some(templates))
    }
}

/// Process items from `queue` until it shuts down.
pub async fn run_worker(id: usize, reconciler: Arc<TenantReconciler>, queue: Arc<DedupWorkQueue>) {
    debug!(worker = id, "Worker started");
    while let Some(item) = queue.get().await {
        match reconciler.reconcile(&item).await {
            Ok(_) => queue.forget(&item),
            Err(e) => {
                warn!(worker = id, tenant = %item, error = %e, "Reconciliation failed, requeueing");
                queue.add_rate_limited(item.clone());
            }
        }
        queue.done(&item);
    }
    debug!(worker = id, "Worker stopped");
}
