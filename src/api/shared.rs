//! Label keys and channel rules shared by templates and tenants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// API group of all lifecycle resources.
pub const API_GROUP: &str = "operator.fleet-lifecycle.io";
/// Served API version.
pub const API_VERSION: &str = "v1beta2";

/// Channel used when neither the module nor the tenant names one.
pub const DEFAULT_CHANNEL: &str = "regular";

/// Label carrying the module identity on a template.
pub const MODULE_NAME_LABEL: &str = "operator.fleet-lifecycle.io/module-name";
/// Label marking a template or tenant as internal.
pub const INTERNAL_LABEL: &str = "operator.fleet-lifecycle.io/internal";
/// Label marking a template or tenant as beta.
pub const BETA_LABEL: &str = "operator.fleet-lifecycle.io/beta";
/// Label enabling remote synchronisation for a tenant.
pub const SYNC_LABEL: &str = "operator.fleet-lifecycle.io/sync";
/// Label identifying the managing controller.
pub const MANAGED_BY_LABEL: &str = "operator.fleet-lifecycle.io/managed-by";

/// Value a boolean label must carry to count as set.
pub const ENABLE_LABEL_VALUE: &str = "true";

const MIN_CHANNEL_LEN: usize = 3;
const MAX_CHANNEL_LEN: usize = 32;

/// Label keys used for identity and visibility decisions.
///
/// Passed explicitly into the components that read labels so a deployment
/// can run against a differently-labelled catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelKeys {
    pub module_name: String,
    pub internal: String,
    pub beta: String,
    pub sync: String,
    pub managed_by: String,
}

impl Default for LabelKeys {
    fn default() -> Self {
        Self {
            module_name: MODULE_NAME_LABEL.to_string(),
            internal: INTERNAL_LABEL.to_string(),
            beta: BETA_LABEL.to_string(),
            sync: SYNC_LABEL.to_string(),
            managed_by: MANAGED_BY_LABEL.to_string(),
        }
    }
}

/// True when `key` is present in `labels` with the enable value.
pub(crate) fn label_enabled(labels: Option<&BTreeMap<String, String>>, key: &str) -> bool {
    labels
        .and_then(|l| l.get(key))
        .is_some_and(|v| v == ENABLE_LABEL_VALUE)
}

/// Channel names are 3 to 32 lowercase ASCII letters.
pub fn is_valid_channel(channel: &str) -> bool {
    (MIN_CHANNEL_LEN..=MAX_CHANNEL_LEN).contains(&channel.len())
        && channel.chars().all(|c| c.is_ascii_lowercase())
}
