//! `Tenant`: one managed cluster's desired module set.

use std::collections::HashSet;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::shared::{is_valid_channel, label_enabled, LabelKeys};

/// A module requested by a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub name: String,

    /// Overrides the tenant channel for this module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Resolve the template from the remote cluster under this identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_module_template_ref: Option<String>,
}

/// Desired state of a `Tenant`.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "operator.fleet-lifecycle.io",
    version = "v1beta2",
    kind = "Tenant",
    namespaced,
    status = "TenantStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    /// Default channel for all modules of this tenant.
    #[serde(default)]
    pub channel: String,

    #[serde(default)]
    pub modules: Vec<Module>,
}

/// Reference to the template a module was last installed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingObject {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub generation: i64,
}

/// Last applied state of one module, written after a successful install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    pub name: String,
    #[serde(default)]
    pub fqdn: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TrackingObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl ModuleStatus {
    /// Status entries are matched by FQDN or by plain module name.
    pub fn matches(&self, module_name: &str) -> bool {
        self.fqdn == module_name || self.name == module_name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default)]
    pub modules: Vec<ModuleStatus>,
}

/// A module request after upstream validation, fixed for one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    pub name: String,
    pub channel: Option<String>,
    pub remote_template_ref: Option<String>,
    /// False when validation rejected the request; resolution is skipped.
    pub valid: bool,
}

impl ModuleReference {
    fn from_module(module: &Module) -> Self {
        let channel = module.channel.clone().filter(|c| !c.is_empty());
        let valid = !module.name.is_empty()
            && channel.as_deref().map_or(true, is_valid_channel);
        Self {
            name: module.name.clone(),
            channel,
            remote_template_ref: module
                .remote_module_template_ref
                .clone()
                .filter(|r| !r.is_empty()),
            valid,
        }
    }
}

impl Tenant {
    pub fn is_internal(&self, labels: &LabelKeys) -> bool {
        label_enabled(self.metadata.labels.as_ref(), &labels.internal)
    }

    pub fn is_beta(&self, labels: &LabelKeys) -> bool {
        label_enabled(self.metadata.labels.as_ref(), &labels.beta)
    }

    /// Remote template references are only honoured with sync enabled.
    pub fn sync_enabled(&self, labels: &LabelKeys) -> bool {
        label_enabled(self.metadata.labels.as_ref(), &labels.sync)
    }

    /// Validated module requests, one per distinct name, in spec order.
    pub fn available_modules(&self) -> Vec<ModuleReference> {
        let mut seen = HashSet::new();
        self.spec
            .modules
            .iter()
            .filter(|m| seen.insert(m.name.as_str()))
            .map(ModuleReference::from_module)
            .collect()
    }

    /// Recorded status for a module, if one was ever applied.
    pub fn module_status(&self, module_name: &str) -> Option<&ModuleStatus> {
        self.status
            .as_ref()?
            .modules
            .iter()
            .find(|s| s.matches(module_name))
    }
}
