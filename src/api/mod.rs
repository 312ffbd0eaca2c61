//! Resource types consumed by the lifecycle controller.
//!
//! All resources live in the `operator.fleet-lifecycle.io/v1beta2` API group.
//! The controller only reads `ModuleTemplate`s; `Tenant`s are read for their
//! requested modules and the status block recording what was last applied.

mod module_template;
mod shared;
mod tenant;

pub use module_template::{ModuleTemplate, ModuleTemplateSpec, Target};
pub use shared::{
    is_valid_channel, LabelKeys, API_GROUP, API_VERSION, BETA_LABEL, DEFAULT_CHANNEL,
    ENABLE_LABEL_VALUE, INTERNAL_LABEL, MANAGED_BY_LABEL, MODULE_NAME_LABEL, SYNC_LABEL,
};
pub use tenant::{
    Module, ModuleReference, ModuleStatus, Tenant, TenantSpec, TenantStatus, TrackingObject,
};
