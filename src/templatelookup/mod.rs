//! Module template resolution.
//!
//! For every module a tenant requests, [`TemplateLookup`] picks exactly one
//! `ModuleTemplate` from the catalog, or records why it could not:
//!
//! 1. The desired channel is the module's own channel, else the tenant
//!    channel, else the configured default.
//! 2. Only templates published in the desired channel are considered.
//! 3. A template belongs to the module if its module-name label, its
//!    `namespace/name`, its bare name, or its descriptor's component name
//!    equals the requested module name. The first of these that matches
//!    decides.
//! 4. Exactly one template must remain. It must carry a channel and must not
//!    be mandatory.
//! 5. Internal and beta templates are only visible to tenants with the same
//!    label.
//!
//! Errors never abort the pass: each module gets its own
//! [`ResolutionResult`].

mod error;
pub mod skew;

pub use error::{ErrorKind, LookupError, UpdateBlockCause};
pub use skew::{check_update_allowed, is_valid_version_change, parse_version};

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::api::{LabelKeys, ModuleReference, ModuleTemplate, Tenant, DEFAULT_CHANNEL};
use crate::catalog::{LabelSelector, TemplateCatalog};
use crate::descriptor::DescriptorCache;

/// Resolution settings shared by every pass.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Channel used when neither module nor tenant names one.
    pub default_channel: String,
    pub labels: LabelKeys,
    /// Restricts which templates the catalog returns.
    pub scope: LabelSelector,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            default_channel: DEFAULT_CHANNEL.to_string(),
            labels: LabelKeys::default(),
            scope: LabelSelector::default(),
        }
    }
}

/// Which identity predicate tied a template to the requested module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMatch {
    Label,
    NamespacedName,
    Name,
    Descriptor,
}

/// Outcome of resolving one module.
#[derive(Debug)]
pub struct ResolutionResult {
    pub module: String,
    pub desired_channel: String,
    pub template: Result<ModuleTemplate, LookupError>,
    /// Set by the version-skew check when the installed state must be
    /// re-applied.
    pub outdated: bool,
}

impl ResolutionResult {
    fn failed(module: &str, desired_channel: String, error: LookupError) -> Self {
        Self {
            module: module.to_string(),
            desired_channel,
            template: Err(error),
            outdated: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.template.is_ok()
    }

    pub fn error(&self) -> Option<&LookupError> {
        self.template.as_ref().err()
    }
}

/// Resolution results of one tenant, keyed by requested module name.
pub type ModuleTemplatesByModuleName = BTreeMap<String, ResolutionResult>;

/// Resolves tenant module requests against the template catalog.
pub struct TemplateLookup {
    catalog: Arc<dyn TemplateCatalog>,
    remote_catalog: Option<Arc<dyn TemplateCatalog>>,
    descriptors: Arc<DescriptorCache>,
    config: LookupConfig,
}

impl TemplateLookup {
    pub fn new(
        catalog: Arc<dyn TemplateCatalog>,
        descriptors: Arc<DescriptorCache>,
        config: LookupConfig,
    ) -> Self {
        Self {
            catalog,
            remote_catalog: None,
            descriptors,
            config,
        }
    }

    /// Catalog consulted for modules carrying a remote template reference.
    pub fn with_remote_catalog(mut self, catalog: Arc<dyn TemplateCatalog>) -> Self {
        self.remote_catalog = Some(catalog);
        self
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    pub fn descriptors(&self) -> &DescriptorCache {
        &self.descriptors
    }

    /// Module channel, then tenant channel, then the configured default.
    pub fn desired_channel(&self, explicit: Option<&str>, tenant_default: &str) -> String {
        [
            explicit.unwrap_or_default(),
            tenant_default,
            self.config.default_channel.as_str(),
        ]
        .into_iter()
        .find(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CHANNEL)
        .to_string()
    }

    /// Resolve a single module name against the primary catalog.
    pub async fn resolve(
        &self,
        module_name: &str,
        explicit_channel: Option<&str>,
        default_channel: &str,
    ) -> ResolutionResult {
        self.resolve_in(
            self.catalog.as_ref(),
            module_name,
            explicit_channel,
            default_channel,
        )
        .await
    }

    async fn resolve_in(
        &self,
        catalog: &dyn TemplateCatalog,
        module_name: &str,
        explicit_channel: Option<&str>,
        default_channel: &str,
    ) -> ResolutionResult {
        let desired_channel = self.desired_channel(explicit_channel, default_channel);
        let template = self
            .find_template(catalog, module_name, &desired_channel)
            .await;

        if template.is_ok() {
            if desired_channel != default_channel {
                info!(
                    module = %module_name,
                    "using {} (instead of {}) for module {}",
                    desired_channel, default_channel, module_name
                );
            } else {
                debug!(
                    module = %module_name,
                    channel = %desired_channel,
                    "using channel for module"
                );
            }
        }

        ResolutionResult {
            module: module_name.to_string(),
            desired_channel,
            template,
            outdated: false,
        }
    }

    async fn find_template(
        &self,
        catalog: &dyn TemplateCatalog,
        module_name: &str,
        desired_channel: &str,
    ) -> Result<ModuleTemplate, LookupError> {
        let templates = catalog.list(&self.config.scope).await?;

        let mut candidates = Vec::new();
        for template in templates {
            if template.spec.channel != desired_channel {
                continue;
            }
            if let Some(matched) = self.identity_match(&template, module_name)? {
                debug!(
                    module = %module_name,
                    template = %template.namespaced_name(),
                    matched_by = ?matched,
                    "Template matches module"
                );
                candidates.push(template);
            }
        }

        match candidates.len() {
            0 => Err(LookupError::NoTemplatesInListResult {
                module: module_name.to_string(),
                channel: desired_channel.to_string(),
            }),
            1 => {
                let template = candidates.remove(0);
                validate_candidate(template, module_name)
            }
            _ => {
                let mut names: Vec<String> = candidates.iter().map(ResourceExt::name_any).collect();
                names.sort();
                warn!(
                    module = %module_name,
                    channel = %desired_channel,
                    candidates = ?names,
                    "More than one module template matches"
                );
                Err(LookupError::TemplateNotIdentified {
                    module: module_name.to_string(),
                    candidates: names,
                })
            }
        }
    }

    /// First identity predicate tying `template` to `module_name`, if any.
    ///
    /// The descriptor is only decoded when the cheaper predicates miss.
    pub fn identity_match(
        &self,
        template: &ModuleTemplate,
        module_name: &str,
    ) -> Result<Option<IdentityMatch>, LookupError> {
        if template.module_name_label(&self.config.labels) == Some(module_name) {
            return Ok(Some(IdentityMatch::Label));
        }
        if template.namespaced_name() == module_name {
            return Ok(Some(IdentityMatch::NamespacedName));
        }
        if template.name_any() == module_name {
            return Ok(Some(IdentityMatch::Name));
        }
        let descriptor =
            self.descriptors
                .get(template)
                .map_err(|source| LookupError::Descriptor {
                    template: template.namespaced_name(),
                    source,
                })?;
        if descriptor.name == module_name {
            return Ok(Some(IdentityMatch::Descriptor));
        }
        Ok(None)
    }

    /// Reject templates the tenant is not allowed to see.
    pub fn check_visibility(
        &self,
        template: &ModuleTemplate,
        tenant: &Tenant,
    ) -> Result<(), LookupError> {
        let labels = &self.config.labels;
        if template.is_internal(labels) && !tenant.is_internal(labels) {
            return Err(LookupError::TemplateNotAllowed {
                reason: format!(
                    "template {} is internal but tenant {} is not",
                    template.namespaced_name(),
                    tenant.name_any()
                ),
            });
        }
        if template.is_beta(labels) && !tenant.is_beta(labels) {
            return Err(LookupError::TemplateNotAllowed {
                reason: format!(
                    "template {} is beta but tenant {} is not",
                    template.namespaced_name(),
                    tenant.name_any()
                ),
            });
        }
        Ok(())
    }

    /// Resolve one validated module request of `tenant`, including remote
    /// references and visibility.
    pub async fn resolve_module(&self, module: &ModuleReference, tenant: &Tenant) -> ResolutionResult {
        let default_channel = tenant.spec.channel.as_str();

        if !module.valid {
            let desired = self.desired_channel(module.channel.as_deref(), default_channel);
            return ResolutionResult::failed(
                &module.name,
                desired,
                LookupError::InvalidModule {
                    module: module.name.clone(),
                },
            );
        }

        let mut result = match &module.remote_template_ref {
            None => {
                self.resolve(&module.name, module.channel.as_deref(), default_channel)
                    .await
            }
            Some(remote_ref) => self.resolve_remote(module, remote_ref, tenant).await,
        };

        let visibility = result
            .template
            .as_ref()
            .ok()
            .map(|template| self.check_visibility(template, tenant));
        if let Some(Err(e)) = visibility {
            result.template = Err(e);
        }
        result
    }

    async fn resolve_remote(
        &self,
        module: &ModuleReference,
        remote_ref: &str,
        tenant: &Tenant,
    ) -> ResolutionResult {
        let default_channel = tenant.spec.channel.as_str();
        let invalid = |reason: &str| {
            ResolutionResult::failed(
                &module.name,
                self.desired_channel(module.channel.as_deref(), default_channel),
                LookupError::InvalidRemoteModuleConfiguration {
                    module: module.name.clone(),
                    reason: reason.to_string(),
                },
            )
        };

        if !tenant.sync_enabled(&self.config.labels) {
            return invalid("enable sync to use a remote module template");
        }
        let Some(remote) = &self.remote_catalog else {
            return invalid("no remote template catalog is configured");
        };

        let mut result = self
            .resolve_in(
                remote.as_ref(),
                remote_ref,
                module.channel.as_deref(),
                default_channel,
            )
            .await;
        result.module = module.name.clone();
        result
    }

    /// Resolve every module of `tenant` and apply the version-skew check
    /// against its recorded status.
    pub async fn get_regular_templates(&self, tenant: &Tenant) -> ModuleTemplatesByModuleName {
        let mut templates = ModuleTemplatesByModuleName::new();

        for module in tenant.available_modules() {
            let mut result = self.resolve_module(&module, tenant).await;

            let skew = match (&result.template, tenant.module_status(&module.name)) {
                (Ok(template), Some(status)) => Some(check_update_allowed(
                    template,
                    &result.desired_channel,
                    status,
                    &self.descriptors,
                )),
                _ => None,
            };
            match skew {
                Some(Ok(outdated)) => result.outdated = outdated,
                Some(Err(e)) => result.template = Err(e),
                None => {}
            }

            if let Err(e) = &result.template {
                debug!(
                    tenant = %tenant.name_any(),
                    module = %module.name,
                    reason = e.reason(),
                    error = %e,
                    "Module template not resolved"
                );
            }
            templates.insert(module.name.clone(), result);
        }

        templates
    }
}

fn validate_candidate(template: ModuleTemplate, module_name: &str) -> Result<ModuleTemplate, LookupError> {
    if template.spec.channel.is_empty() {
        return Err(LookupError::NotDefaultChannelAllowed {
            module: module_name.to_string(),
        });
    }
    if template.spec.mandatory {
        return Err(LookupError::TemplateMarkedAsMandatory {
            module: module_name.to_string(),
            channel: template.spec.channel,
        });
    }
    Ok(template)
}
