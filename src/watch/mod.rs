//! Change propagation: turning observed object events into tenant work items.
//!
//! - `owner`: Owner Change Propagator for dependent objects
//! - `template_change`: maps template events onto the tenants using them
//! - `predicate`: event filters
//! - `scope`: namespaced/cluster scope lookup for owner kinds
//! - `queue`: deduplicating work queue with backoff
//! - `source`: kube watcher adapter producing create/update/delete events

mod owner;
mod predicate;
mod queue;
mod scope;
mod source;
mod template_change;

pub use owner::RestrictedOwnerHandler;
pub use predicate::{EventFilter, GenerationChangedPredicate, LabelsChangedPredicate, Or};
pub use queue::{DedupWorkQueue, QueueBackoff, WorkQueue};
pub use scope::{DiscoveryScopeMapper, ResourceScope, ScopeMapper, StaticScopeMapper};
pub use source::{EventSource, EventTranslator};
pub use template_change::TemplateChangeHandler;

use std::fmt;

use kube::Resource;

use crate::tenant::TenantError;

/// Error types for change propagation.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("owner type must resolve to exactly one group/kind, found {0:?}")]
    NoUniqueKind(Vec<GroupKind>),

    #[error("invalid owner reference apiVersion: {0:?}")]
    InvalidApiVersion(String),

    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("failed to read tenants: {0}")]
    Tenant(#[from] TenantError),
}

/// Identity of a tenant to reconcile.
///
/// `namespace` is `None` for cluster-scoped owners.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItem {
    pub name: String,
    pub namespace: Option<String>,
}

impl WorkItem {
    pub fn new(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// API group plus kind; the version is irrelevant for owner matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }

    /// Group and kind of a statically typed resource.
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self::new(K::group(&()), K::kind(&()))
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// A change to one watched object.
#[derive(Debug, Clone)]
pub enum ObjectEvent<K> {
    Create(K),
    Update { old: K, new: K },
    Delete(K),
    /// Externally triggered, carries no before/after pair.
    Generic(K),
}

impl<K> ObjectEvent<K> {
    /// The object as of this event (the new one for updates).
    pub fn object(&self) -> &K {
        match self {
            Self::Create(obj) | Self::Delete(obj) | Self::Generic(obj) => obj,
            Self::Update { new, .. } => new,
        }
    }
}
