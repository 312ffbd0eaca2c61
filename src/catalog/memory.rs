//! In-memory template catalog.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use kube::ResourceExt;
use parking_lot::RwLock;

use super::{CatalogError, LabelSelector, TemplateCatalog};
use crate::api::ModuleTemplate;

/// Catalog holding templates in memory, keyed by `namespace/name`.
#[derive(Default)]
pub struct InMemoryTemplateCatalog {
    templates: RwLock<Vec<ModuleTemplate>>,
    fail_on_list: AtomicBool,
    list_calls: AtomicUsize,
}

impl InMemoryTemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: impl IntoIterator<Item = ModuleTemplate>) -> Self {
        let catalog = Self::new();
        for template in templates {
            catalog.upsert(template);
        }
        catalog
    }

    /// Insert or replace the template with the same namespace and name.
    pub fn upsert(&self, template: ModuleTemplate) {
        let key = template.namespaced_name();
        let mut templates = self.templates.write();
        match templates.iter_mut().find(|t| t.namespaced_name() == key) {
            Some(existing) => *existing = template,
            None => templates.push(template),
        }
    }

    pub fn remove(&self, namespace: &str, name: &str) -> Option<ModuleTemplate> {
        let mut templates = self.templates.write();
        let index = templates
            .iter()
            .position(|t| t.namespace().as_deref() == Some(namespace) && t.name_any() == name)?;
        Some(templates.remove(index))
    }

    pub fn set_fail_on_list(&self, fail: bool) {
        self.fail_on_list.store(fail, Ordering::SeqCst);
    }

    /// Number of list calls served, including failed ones.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TemplateCatalog for InMemoryTemplateCatalog {
    async fn list(&self, selector: &LabelSelector) -> Result<Vec<ModuleTemplate>, CatalogError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_list.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("list disabled".to_string()));
        }
        Ok(self
            .templates
            .read()
            .iter()
            .filter(|t| selector.matches(t.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }
}
