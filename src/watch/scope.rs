//! Namespaced/cluster scope lookup for owner kinds.

use std::collections::HashMap;

use kube::{
    discovery::{Discovery, Scope},
    Client,
};
use tracing::{debug, info};

use super::{GroupKind, WatchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    Namespaced,
    Cluster,
}

/// Tells whether a kind is namespace-scoped.
pub trait ScopeMapper: Send + Sync {
    /// `None` when the kind is unknown to the mapper.
    fn scope(&self, group_kind: &GroupKind) -> Option<ResourceScope>;
}

/// Fixed scope table, for tests and for kinds known at compile time.
#[derive(Debug, Clone, Default)]
pub struct StaticScopeMapper {
    scopes: HashMap<GroupKind, ResourceScope>,
}

impl StaticScopeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, group_kind: GroupKind, scope: ResourceScope) -> Self {
        self.scopes.insert(group_kind, scope);
        self
    }
}

impl ScopeMapper for StaticScopeMapper {
    fn scope(&self, group_kind: &GroupKind) -> Option<ResourceScope> {
        self.scopes.get(group_kind).copied()
    }
}

/// Scope table built once from API server discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryScopeMapper {
    inner: StaticScopeMapper,
}

impl DiscoveryScopeMapper {
    pub async fn discover(client: Client) -> Result<Self, WatchError> {
        let discovery = Discovery::new(client).run().await?;

        let mut inner = StaticScopeMapper::new();
        for group in discovery.groups() {
            for (resource, capabilities) in group.recommended_resources() {
                let scope = match capabilities.scope {
                    Scope::Namespaced => ResourceScope::Namespaced,
                    Scope::Cluster => ResourceScope::Cluster,
                };
                debug!(group = %resource.group, kind = %resource.kind, scope = ?scope, "Discovered kind");
                inner = inner.with(GroupKind::new(resource.group, resource.kind), scope);
            }
        }
        info!(kinds = inner.scopes.len(), "API discovery complete");
        Ok(Self { inner })
    }
}

impl ScopeMapper for DiscoveryScopeMapper {
    fn scope(&self, group_kind: &GroupKind) -> Option<ResourceScope> {
        self.inner.scope(group_kind)
    }
}
