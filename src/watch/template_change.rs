//! Fan-out of template changes to the tenants using them.

use std::collections::HashSet;
use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, error, warn};

use super::{ObjectEvent, WatchError, WorkItem, WorkQueue};
use crate::api::{ModuleTemplate, Tenant};
use crate::templatelookup::TemplateLookup;
use crate::tenant::TenantReader;

/// Enqueues every tenant that requests a changed template's module or has
/// it recorded as installed.
///
/// Module identity is decided by the same predicates the resolver uses, so a
/// tenant is woken whenever the template could be its resolution result.
pub struct TemplateChangeHandler {
    tenants: Arc<dyn TenantReader>,
    lookup: Arc<TemplateLookup>,
}

impl TemplateChangeHandler {
    pub fn new(tenants: Arc<dyn TenantReader>, lookup: Arc<TemplateLookup>) -> Self {
        Self { tenants, lookup }
    }

    fn requests_module(&self, template: &ModuleTemplate, module_name: &str) -> bool {
        match self.lookup.identity_match(template, module_name) {
            Ok(matched) => matched.is_some(),
            Err(e) => {
                // The resolution pass reports the broken template.
                warn!(
                    template = %template.namespaced_name(),
                    module = %module_name,
                    error = %e,
                    "Could not decide module identity, treating tenant as affected"
                );
                true
            }
        }
    }

    fn references(&self, tenant: &Tenant, template: &ModuleTemplate) -> bool {
        let requested = tenant
            .spec
            .modules
            .iter()
            .any(|m| self.requests_module(template, &m.name));
        if requested {
            return true;
        }

        let name = template.name_any();
        let namespace = template.namespace().unwrap_or_default();
        tenant
            .status
            .iter()
            .flat_map(|s| s.modules.iter())
            .filter_map(|m| m.template.as_ref())
            .any(|t| t.name == name && t.namespace == namespace)
    }

    /// Tenants affected by a change of any of `templates`.
    pub async fn requests(
        &self,
        templates: &[&ModuleTemplate],
    ) -> Result<HashSet<WorkItem>, WatchError> {
        let tenants = self.tenants.list().await?;

        let mut requests = HashSet::new();
        for tenant in &tenants {
            if templates.iter().any(|t| self.references(tenant, t)) {
                requests.insert(WorkItem::new(tenant.name_any(), tenant.namespace()));
            }
        }
        Ok(requests)
    }

    /// Enqueue the tenants affected by `event`. Both sides of an update are
    /// considered so tenants of a relabelled template are not missed.
    pub async fn handle(&self, event: &ObjectEvent<ModuleTemplate>, queue: &dyn WorkQueue) {
        let templates: Vec<&ModuleTemplate> = match event {
            ObjectEvent::Update { old, new } => vec![old, new],
            other => vec![other.object()],
        };

        let requests = self.requests(&templates).await;
        if let ObjectEvent::Delete(template) = event {
            self.lookup.descriptors().evict(template);
        }

        match requests {
            Ok(requests) => {
                for request in requests {
                    debug!(
                        template = %event.object().namespaced_name(),
                        tenant = %request,
                        "Enqueue tenant for template change"
                    );
                    queue.add(request);
                }
            }
            Err(e) => {
                error!(
                    template = %event.object().namespaced_name(),
                    error = %e,
                    "Failed to list tenants for template change"
                );
            }
        }
    }
}
