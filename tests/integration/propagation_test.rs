//! Change propagation tests: dependent and template events to tenant work.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::json;

use fleet_lifecycle::api::{
    Module, ModuleTemplate, ModuleTemplateSpec, Tenant, TenantSpec, API_GROUP, API_VERSION,
    MODULE_NAME_LABEL,
};
use fleet_lifecycle::catalog::InMemoryTemplateCatalog;
use fleet_lifecycle::descriptor::DescriptorCache;
use fleet_lifecycle::reconcile::{run_worker, TenantReconciler};
use fleet_lifecycle::templatelookup::{LookupConfig, TemplateLookup};
use fleet_lifecycle::tenant::InMemoryTenantReader;
use fleet_lifecycle::watch::{
    DedupWorkQueue, GroupKind, ObjectEvent, ResourceScope, RestrictedOwnerHandler,
    StaticScopeMapper, TemplateChangeHandler, WorkItem, WorkQueue,
};

const NAMESPACE: &str = "kcp-system";

fn owner_ref(api_version: &str, kind: &str, name: &str, controller: bool) -> OwnerReference {
    OwnerReference {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("uid-{name}"),
        controller: Some(controller),
        block_owner_deletion: None,
    }
}

/// Create a dynamic object of `kind` with the given owners and state.
fn dependent(
    gvk: GroupVersionKind,
    name: &str,
    refs: Vec<OwnerReference>,
    state: &str,
) -> DynamicObject {
    let mut obj = DynamicObject::new(name, &ApiResource::from_gvk(&gvk)).within(NAMESPACE);
    obj.metadata.owner_references = Some(refs);
    obj.data = json!({"status": {"state": state}});
    obj
}

fn manifest(tenant: &str, state: &str) -> DynamicObject {
    dependent(
        GroupVersionKind::gvk(API_GROUP, API_VERSION, "Manifest"),
        &format!("{tenant}-keda"),
        vec![owner_ref(
            &format!("{API_GROUP}/{API_VERSION}"),
            "Tenant",
            tenant,
            true,
        )],
        state,
    )
}

fn tenant_handler() -> RestrictedOwnerHandler {
    let mapper = StaticScopeMapper::new().with(GroupKind::of::<Tenant>(), ResourceScope::Namespaced);
    RestrictedOwnerHandler::for_owner::<Tenant>(true, Arc::new(mapper)).unwrap()
}

fn keda_template() -> ModuleTemplate {
    let mut t = ModuleTemplate::new(
        "keda-regular",
        ModuleTemplateSpec {
            channel: "regular".to_string(),
            descriptor: json!({"component": {"name": "fleet.io/keda", "version": "2.0.0"}}),
            ..Default::default()
        },
    );
    t.metadata.namespace = Some(NAMESPACE.to_string());
    t.metadata.generation = Some(1);
    t.metadata.labels = Some(
        [(MODULE_NAME_LABEL.to_string(), "keda".to_string())]
            .into_iter()
            .collect(),
    );
    t
}

fn keda_tenant(name: &str) -> Tenant {
    let mut t = Tenant::new(
        name,
        TenantSpec {
            channel: "regular".to_string(),
            modules: vec![Module {
                name: "keda".to_string(),
                ..Default::default()
            }],
        },
    );
    t.metadata.namespace = Some(NAMESPACE.to_string());
    t
}

fn lookup(catalog: Arc<InMemoryTemplateCatalog>) -> Arc<TemplateLookup> {
    Arc::new(TemplateLookup::new(
        catalog,
        Arc::new(DescriptorCache::new()),
        LookupConfig::default(),
    ))
}

mod owner_propagation {
    use super::*;

    #[test]
    fn test_duplicate_owner_references_yield_one_request() {
        let replica_set = GroupKind::new("apps", "ReplicaSet");
        let mapper = StaticScopeMapper::new().with(replica_set.clone(), ResourceScope::Namespaced);
        let handler = RestrictedOwnerHandler::new([replica_set], false, Arc::new(mapper)).unwrap();

        let pod = dependent(
            GroupVersionKind::gvk("", "v1", "Pod"),
            "web-0",
            vec![
                owner_ref("apps/v1", "ReplicaSet", "web", false),
                owner_ref("apps/v1", "ReplicaSet", "web", false),
            ],
            "Running",
        );

        let requests = handler.requests(&ObjectEvent::Create(pod));
        assert_eq!(requests.len(), 1);
        assert!(requests.contains(&WorkItem::new("web", Some(NAMESPACE.to_string()))));
    }

    #[test]
    fn test_manifest_state_change_reaches_tenant() {
        let handler = tenant_handler();
        let queue = DedupWorkQueue::default();

        handler.handle(
            &ObjectEvent::Update {
                old: manifest("tenant-a", "Processing"),
                new: manifest("tenant-a", "Ready"),
            },
            &queue,
        );
        handler.handle(
            &ObjectEvent::Update {
                old: manifest("tenant-b", "Ready"),
                new: manifest("tenant-b", "Ready"),
            },
            &queue,
        );

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_unowned_dependent_is_ignored() {
        let handler = tenant_handler();
        let orphan = dependent(
            GroupVersionKind::gvk(API_GROUP, API_VERSION, "Manifest"),
            "orphan",
            Vec::new(),
            "Ready",
        );
        assert!(handler.requests(&ObjectEvent::Create(orphan)).is_empty());
    }
}

mod pipeline {
    use super::*;

    #[tokio::test]
    async fn test_events_from_both_sources_coalesce_per_tenant() {
        let tenants = Arc::new(InMemoryTenantReader::new(NAMESPACE));
        tenants.upsert(keda_tenant("tenant-a"));
        let queue = DedupWorkQueue::default();

        tenant_handler().handle(&ObjectEvent::Create(manifest("tenant-a", "Ready")), &queue);
        TemplateChangeHandler::new(tenants, lookup(Arc::new(InMemoryTemplateCatalog::new())))
            .handle(&ObjectEvent::Create(keda_template()), &queue)
            .await;

        assert_eq!(queue.len(), 1);
        let item = queue.get().await.unwrap();
        assert_eq!(item, WorkItem::new("tenant-a", Some(NAMESPACE.to_string())));
        queue.done(&item);
    }

    #[tokio::test]
    async fn test_worker_resolves_enqueued_tenant() {
        let catalog = Arc::new(InMemoryTemplateCatalog::with_templates([keda_template()]));
        let tenants = Arc::new(InMemoryTenantReader::new(NAMESPACE));
        tenants.upsert(keda_tenant("tenant-a"));

        let reconciler = Arc::new(TenantReconciler::new(tenants, lookup(catalog.clone())));
        let queue = Arc::new(DedupWorkQueue::default());

        tenant_handler().handle(
            &ObjectEvent::Update {
                old: manifest("tenant-a", "Processing"),
                new: manifest("tenant-a", "Ready"),
            },
            queue.as_ref(),
        );

        let worker = tokio::spawn(run_worker(0, reconciler, queue.clone()));
        for _ in 0..100 {
            if catalog.list_calls() > 0 && queue.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        queue.shutdown();
        worker.await.unwrap();

        assert_eq!(catalog.list_calls(), 1);
        assert_eq!(
            queue.retries(&WorkItem::new("tenant-a", Some(NAMESPACE.to_string()))),
            0
        );
    }
}
