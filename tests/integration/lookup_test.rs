//! Resolution and version-skew tests across a tenant's lifecycle.

use std::sync::Arc;

use serde_json::json;

use fleet_lifecycle::api::{
    Module, ModuleStatus, ModuleTemplate, ModuleTemplateSpec, Tenant, TenantSpec, TenantStatus,
    TrackingObject, MODULE_NAME_LABEL,
};
use fleet_lifecycle::catalog::InMemoryTemplateCatalog;
use fleet_lifecycle::descriptor::DescriptorCache;
use fleet_lifecycle::templatelookup::{
    ErrorKind, LookupConfig, LookupError, TemplateLookup, UpdateBlockCause,
};

const NAMESPACE: &str = "kcp-system";

/// Create a template labelled for `module` in `channel`.
fn template(name: &str, module: &str, channel: &str, version: &str, generation: i64) -> ModuleTemplate {
    let mut t = ModuleTemplate::new(
        name,
        ModuleTemplateSpec {
            channel: channel.to_string(),
            descriptor: json!({
                "component": {"name": format!("fleet.io/{module}"), "version": version}
            }),
            ..Default::default()
        },
    );
    t.metadata.namespace = Some(NAMESPACE.to_string());
    t.metadata.generation = Some(generation);
    t.metadata.labels = Some(
        [(MODULE_NAME_LABEL.to_string(), module.to_string())]
            .into_iter()
            .collect(),
    );
    t
}

/// Create a tenant requesting `module`, optionally pinned to a channel.
fn tenant(module: &str, channel: Option<&str>) -> Tenant {
    let mut t = Tenant::new(
        "tenant-a",
        TenantSpec {
            channel: "regular".to_string(),
            modules: vec![Module {
                name: module.to_string(),
                channel: channel.map(str::to_string),
                ..Default::default()
            }],
        },
    );
    t.metadata.namespace = Some(NAMESPACE.to_string());
    t
}

/// Record an installation of `module` from `template` in the tenant status.
fn installed(tenant: &mut Tenant, module: &str, template: &ModuleTemplate, version: &str) {
    tenant.status = Some(TenantStatus {
        state: Some("Ready".to_string()),
        modules: vec![ModuleStatus {
            name: module.to_string(),
            fqdn: format!("fleet.io/{module}"),
            channel: template.spec.channel.clone(),
            version: version.to_string(),
            template: Some(TrackingObject {
                name: template.metadata.name.clone().unwrap_or_default(),
                namespace: NAMESPACE.to_string(),
                generation: template.metadata.generation.unwrap_or_default(),
            }),
            state: Some("Ready".to_string()),
        }],
    });
}

fn lookup(catalog: Arc<InMemoryTemplateCatalog>) -> TemplateLookup {
    TemplateLookup::new(
        catalog,
        Arc::new(DescriptorCache::new()),
        LookupConfig::default(),
    )
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_first_install_resolves_without_skew_check() {
        let catalog = Arc::new(InMemoryTemplateCatalog::with_templates([template(
            "x-regular", "x", "regular", "1.0.0", 1,
        )]));
        let lookup = lookup(catalog);

        let single = lookup.resolve("x", None, "regular").await;
        let template = single.template.unwrap();
        assert_eq!(template.metadata.name.as_deref(), Some("x-regular"));

        let all = lookup.get_regular_templates(&tenant("x", None)).await;
        assert!(all["x"].is_ok());
        assert!(!all["x"].outdated);
    }

    #[tokio::test]
    async fn test_unchanged_installation_is_current() {
        let current = template("x-regular", "x", "regular", "1.0.0", 1);
        let catalog = Arc::new(InMemoryTemplateCatalog::with_templates([current.clone()]));
        let mut tenant = tenant("x", None);
        installed(&mut tenant, "x", &current, "1.0.0");

        let all = lookup(catalog).get_regular_templates(&tenant).await;
        assert!(all["x"].is_ok());
        assert!(!all["x"].outdated);
    }

    #[tokio::test]
    async fn test_generation_bump_marks_outdated() {
        let previous = template("x-regular", "x", "regular", "1.0.0", 1);
        let catalog = Arc::new(InMemoryTemplateCatalog::with_templates([template(
            "x-regular", "x", "regular", "1.0.0", 2,
        )]));
        let mut tenant = tenant("x", None);
        installed(&mut tenant, "x", &previous, "1.0.0");

        let all = lookup(catalog).get_regular_templates(&tenant).await;
        assert!(all["x"].is_ok());
        assert!(all["x"].outdated);
    }

    #[tokio::test]
    async fn test_channel_switch_to_lower_version_is_blocked() {
        let regular = template("x-regular", "x", "regular", "1.0.0", 1);
        let catalog = Arc::new(InMemoryTemplateCatalog::with_templates([
            regular.clone(),
            template("x-fast", "x", "fast", "0.9.0", 1),
        ]));
        let mut tenant = tenant("x", Some("fast"));
        installed(&mut tenant, "x", &regular, "1.0.0");

        let all = lookup(catalog).get_regular_templates(&tenant).await;
        let result = &all["x"];
        assert_eq!(result.desired_channel, "fast");
        assert!(!result.outdated);

        let error = result.error().unwrap();
        assert_eq!(error.kind(), ErrorKind::PolicyViolation);
        match error {
            LookupError::TemplateUpdateNotAllowed { reason, cause } => {
                assert_eq!(*cause, UpdateBlockCause::Downgrade);
                assert!(reason.contains("from regular to fast"), "{reason}");
                assert!(reason.contains("1.0.0"), "{reason}");
            }
            other => panic!("expected TemplateUpdateNotAllowed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_channel_switch_to_higher_version_is_outdated() {
        let regular = template("x-regular", "x", "regular", "1.0.0", 1);
        let catalog = Arc::new(InMemoryTemplateCatalog::with_templates([
            regular.clone(),
            template("x-fast", "x", "fast", "1.1.0", 1),
        ]));
        let mut tenant = tenant("x", Some("fast"));
        installed(&mut tenant, "x", &regular, "1.0.0");

        let all = lookup(catalog).get_regular_templates(&tenant).await;
        let template = all["x"].template.as_ref().unwrap();
        assert_eq!(template.metadata.name.as_deref(), Some("x-fast"));
        assert!(all["x"].outdated);
    }
}

mod ambiguity {
    use super::*;

    #[tokio::test]
    async fn test_two_templates_for_one_module_are_reported() {
        let catalog = Arc::new(InMemoryTemplateCatalog::with_templates([
            template("y-regular", "y", "regular", "1.0.0", 1),
            template("y-regular-copy", "y", "regular", "1.0.1", 1),
            template("y-fast", "y", "fast", "1.1.0", 1),
        ]));

        let result = lookup(catalog).resolve("y", None, "regular").await;
        match result.error() {
            Some(LookupError::TemplateNotIdentified { module, candidates }) => {
                assert_eq!(module, "y");
                assert_eq!(
                    candidates,
                    &vec!["y-regular".to_string(), "y-regular-copy".to_string()]
                );
            }
            other => panic!("expected TemplateNotIdentified, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ambiguity_does_not_affect_other_modules() {
        let catalog = Arc::new(InMemoryTemplateCatalog::with_templates([
            template("x-regular", "x", "regular", "1.0.0", 1),
            template("y-regular", "y", "regular", "1.0.0", 1),
            template("y-regular-copy", "y", "regular", "1.0.1", 1),
        ]));
        let mut tenant = tenant("x", None);
        tenant.spec.modules.push(Module {
            name: "y".to_string(),
            ..Default::default()
        });

        let all = lookup(catalog).get_regular_templates(&tenant).await;
        assert_eq!(all.len(), 2);
        assert!(all["x"].is_ok());
        assert_eq!(all["y"].error().map(|e| e.kind()), Some(ErrorKind::Ambiguous));
    }
}
