//! fleet-lifecycle-controller: module template resolution loop
//!
//! Watches tenants, module templates and tenant-owned dependents, and
//! resolves every affected tenant's modules to exactly one template.
//!
//! ## Architecture
//! ```text
//! [Tenant watch]     --generation changed------------------\
//! [Template watch]   --generation changed--> [tenant fan-out] --> [work queue] --> [workers] --> [resolver + skew guard]
//! [Dependent watch]  --owner propagation, state changed----/
//! ```
//!
//! ## Configuration
//! - FLEET_LIFECYCLE_CONFIG: path to a YAML config file
//! - FLEET_LIFECYCLE__*: overrides for individual settings
//! - FLEET_LIFECYCLE_LOG: tracing filter (default "info")

use std::sync::Arc;

use kube::api::{Api, ApiResource, DynamicObject};
use kube::runtime::watcher;
use kube::ResourceExt;
use tracing::{error, info};

use fleet_lifecycle::api::{ModuleTemplate, Tenant};
use fleet_lifecycle::catalog::KubeTemplateCatalog;
use fleet_lifecycle::config::Config;
use fleet_lifecycle::descriptor::DescriptorCache;
use fleet_lifecycle::reconcile::{run_worker, TenantReconciler};
use fleet_lifecycle::templatelookup::TemplateLookup;
use fleet_lifecycle::tenant::{KubeTenantReader, TenantReader};
use fleet_lifecycle::utils::bootstrap::{init_tracing, kube_client_with_retry};
use fleet_lifecycle::watch::{
    DedupWorkQueue, DiscoveryScopeMapper, EventFilter, EventSource, GenerationChangedPredicate,
    LabelsChangedPredicate, ObjectEvent, Or, RestrictedOwnerHandler, TemplateChangeHandler,
    WorkItem, WorkQueue,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let namespace = config.resolved_namespace();
    info!(
        namespace = %namespace,
        default_channel = %config.default_channel,
        workers = config.workers,
        "Starting fleet lifecycle controller"
    );

    let client = kube_client_with_retry(None).await?;

    let mut lookup = TemplateLookup::new(
        Arc::new(KubeTemplateCatalog::namespaced(client.clone(), &namespace)),
        Arc::new(DescriptorCache::new()),
        config.lookup_config(),
    );
    if let Some(context) = config.catalog.remote_context.as_deref() {
        let remote = kube_client_with_retry(Some(context)).await?;
        lookup = lookup.with_remote_catalog(Arc::new(KubeTemplateCatalog::namespaced(
            remote, &namespace,
        )));
        info!(context = %context, "Remote template catalog enabled");
    }
    let lookup = Arc::new(lookup);

    let tenants: Arc<dyn TenantReader> =
        Arc::new(KubeTenantReader::new(client.clone(), &namespace));
    let queue = Arc::new(DedupWorkQueue::new(config.queue_backoff()));
    // Relabels change module identity and visibility as much as spec edits do.
    let relevant = Or(GenerationChangedPredicate, LabelsChangedPredicate);

    // Tenant changes
    {
        let queue = Arc::clone(&queue);
        let source = EventSource::new(
            Api::<Tenant>::namespaced(client.clone(), &namespace),
            watcher::Config::default(),
            "tenants",
        );
        tokio::spawn(source.run(move |event: ObjectEvent<Tenant>| {
            if relevant.allows(&event) {
                let tenant = event.object();
                queue.add(WorkItem::new(tenant.name_any(), tenant.namespace()));
            }
            std::future::ready(())
        }));
    }

    // Template changes fan out to the tenants using them
    {
        let queue = Arc::clone(&queue);
        let handler = Arc::new(TemplateChangeHandler::new(
            Arc::clone(&tenants),
            Arc::clone(&lookup),
        ));
        let source = EventSource::new(
            Api::<ModuleTemplate>::namespaced(client.clone(), &namespace),
            watcher::Config::default(),
            "module-templates",
        );
        tokio::spawn(source.run(move |event: ObjectEvent<ModuleTemplate>| {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            async move {
                if relevant.allows(&event) {
                    handler.handle(&event, queue.as_ref()).await;
                }
            }
        }));
    }

    // Dependents owned by tenants
    match DiscoveryScopeMapper::discover(client.clone()).await.and_then(|mapper| {
        RestrictedOwnerHandler::for_owner::<Tenant>(true, Arc::new(mapper))
    }) {
        Ok(handler) => {
            let gvk = config.dependent_gvk();
            let resource = ApiResource::from_gvk(&gvk);
            let queue = Arc::clone(&queue);
            let source = EventSource::new(
                Api::<DynamicObject>::namespaced_with(client.clone(), &namespace, &resource),
                watcher::Config::default(),
                gvk.kind.clone(),
            );
            tokio::spawn(source.run(move |event: ObjectEvent<DynamicObject>| {
                handler.handle(&event, queue.as_ref());
                std::future::ready(())
            }));
        }
        Err(e) => {
            error!(error = %e, "Dependent watch not started");
        }
    }

    let reconciler = Arc::new(TenantReconciler::new(tenants, lookup));
    let workers: Vec<_> = (0..config.workers)
        .map(|id| tokio::spawn(run_worker(id, Arc::clone(&reconciler), Arc::clone(&queue))))
        .collect();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining workers");
    queue.shutdown();
    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "Worker task failed");
        }
    }

    info!("Fleet lifecycle controller stopped");
    Ok(())
}
