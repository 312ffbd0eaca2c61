//! `ModuleTemplate`: one installable version of a module within one channel.

use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

use super::shared::{label_enabled, LabelKeys};

/// Where a module built from the template is installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    #[default]
    ControlPlane,
    Remote,
}

/// Desired state of a `ModuleTemplate`.
///
/// Templates are authored outside the controller; the controller only reads
/// them. Uniqueness per (module identity, channel) is expected but verified
/// during resolution, never assumed.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "operator.fleet-lifecycle.io",
    version = "v1beta2",
    kind = "ModuleTemplate",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ModuleTemplateSpec {
    /// Release channel this template is published in. Empty is an
    /// authoring error.
    #[serde(default)]
    pub channel: String,

    /// Mandatory templates are never selected by channel resolution.
    #[serde(default)]
    pub mandatory: bool,

    /// Embedded component descriptor carrying name and semantic version.
    #[serde(default)]
    pub descriptor: serde_json::Value,

    #[serde(default)]
    pub target: Target,

    /// Default module configuration, opaque to the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ModuleTemplate {
    /// Metadata generation, 0 when the store has not assigned one yet.
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }

    /// `namespace/name` of the template object.
    pub fn namespaced_name(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }

    /// Value of the module identity label, if present.
    pub fn module_name_label<'a>(&'a self, labels: &LabelKeys) -> Option<&'a str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(&labels.module_name))
            .map(String::as_str)
    }

    pub fn is_internal(&self, labels: &LabelKeys) -> bool {
        label_enabled(self.metadata.labels.as_ref(), &labels.internal)
    }

    pub fn is_beta(&self, labels: &LabelKeys) -> bool {
        label_enabled(self.metadata.labels.as_ref(), &labels.beta)
    }

    /// Cache slot for the decoded descriptor of this template.
    ///
    /// One slot per template and channel; the generation stored alongside
    /// the cached value tells whether it is still current.
    pub fn descriptor_cache_key(&self) -> String {
        format!("{}:{}", self.spec.channel, self.namespaced_name())
    }
}
