//! Owner Change Propagator.
//!
//! Maps an event on a dependent object to work items for its owners of one
//! configured group/kind. Update events only propagate when the dependent's
//! `status.state` changed.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{GroupKind, ObjectEvent, ResourceScope, ScopeMapper, WatchError, WorkItem, WorkQueue};

/// Enqueues owners of a single group/kind for events on dependent objects.
pub struct RestrictedOwnerHandler {
    owner: GroupKind,
    is_controller: bool,
    mapper: Arc<dyn ScopeMapper>,
}

impl std::fmt::Debug for RestrictedOwnerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestrictedOwnerHandler")
            .field("owner", &self.owner)
            .field("is_controller", &self.is_controller)
            .finish_non_exhaustive()
    }
}

/// The only part of a dependent object's status the handler reads.
#[derive(Debug, Default, Deserialize)]
struct PartialObject {
    #[serde(default)]
    status: Option<PartialStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialStatus {
    #[serde(default)]
    state: Option<String>,
}

/// `status.state` of `obj`, `None` when absent or not a string.
fn observed_state<K: Serialize>(obj: &K) -> Option<String> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value::<PartialObject>)
        .ok()?
        .status?
        .state
}

/// Split an owner reference `apiVersion` into (group, version).
fn parse_api_version(api_version: &str) -> Result<(&str, &str), WatchError> {
    let invalid = || WatchError::InvalidApiVersion(api_version.to_string());
    match api_version.split_once('/') {
        None if !api_version.is_empty() => Ok(("", api_version)),
        Some((group, version))
            if !group.is_empty() && !version.is_empty() && !version.contains('/') =>
        {
            Ok((group, version))
        }
        _ => Err(invalid()),
    }
}

impl RestrictedOwnerHandler {
    /// Build a handler for the owner kind described by `candidates`.
    ///
    /// Fails with [`WatchError::NoUniqueKind`] unless the candidates collapse
    /// to exactly one group/kind.
    pub fn new<I>(
        candidates: I,
        is_controller: bool,
        mapper: Arc<dyn ScopeMapper>,
    ) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = GroupKind>,
    {
        let distinct: BTreeSet<GroupKind> = candidates.into_iter().collect();
        if distinct.len() != 1 {
            let kinds: Vec<GroupKind> = distinct.into_iter().collect();
            error!(kinds = ?kinds, "expected exactly 1 kind for owner type");
            return Err(WatchError::NoUniqueKind(kinds));
        }
        let owner = distinct
            .into_iter()
            .next()
            .ok_or_else(|| WatchError::NoUniqueKind(Vec::new()))?;

        Ok(Self {
            owner,
            is_controller,
            mapper,
        })
    }

    /// Handler for a statically typed owner resource.
    pub fn for_owner<O: Resource<DynamicType = ()>>(
        is_controller: bool,
        mapper: Arc<dyn ScopeMapper>,
    ) -> Result<Self, WatchError> {
        Self::new([GroupKind::of::<O>()], is_controller, mapper)
    }

    pub fn owner(&self) -> &GroupKind {
        &self.owner
    }

    /// Owner references considered for `obj`: the controller reference only,
    /// or all of them.
    fn owner_references<'a, K: Resource>(&self, obj: &'a K) -> Vec<&'a OwnerReference> {
        let refs = obj.owner_references();
        if self.is_controller {
            refs.iter()
                .find(|r| r.controller.unwrap_or(false))
                .into_iter()
                .collect()
        } else {
            refs.iter().collect()
        }
    }

    /// Deduplicated work items for `event`.
    pub fn requests<K>(&self, event: &ObjectEvent<K>) -> HashSet<WorkItem>
    where
        K: Resource + Serialize,
    {
        let (old, object) = match event {
            ObjectEvent::Update { old, new } => (Some(old), new),
            ObjectEvent::Create(obj) | ObjectEvent::Delete(obj) | ObjectEvent::Generic(obj) => {
                (None, obj)
            }
        };

        let states = old.map(|old| (observed_state(old), observed_state(object)));

        let mut requests = HashSet::new();
        for owner_ref in self.owner_references(object) {
            let (group, _version) = match parse_api_version(&owner_ref.api_version) {
                Ok(parsed) => parsed,
                Err(e) => {
                    error!(
                        object = %object.name_any(),
                        api_version = %owner_ref.api_version,
                        error = %e,
                        "Could not parse owner reference apiVersion"
                    );
                    return HashSet::new();
                }
            };

            if owner_ref.kind != self.owner.kind || group != self.owner.group {
                debug!(
                    owner = %self.owner,
                    ref_kind = %owner_ref.kind,
                    ref_group = %group,
                    "Owner reference does not match owner type"
                );
                continue;
            }

            let namespace = match self.mapper.scope(&self.owner) {
                Some(ResourceScope::Namespaced) => object.namespace(),
                Some(ResourceScope::Cluster) => None,
                None => {
                    error!(owner = %self.owner, "Could not retrieve scope mapping for owner kind");
                    continue;
                }
            };
            let request = WorkItem::new(owner_ref.name.clone(), namespace);

            if let Some((old_state, new_state)) = &states {
                match (old_state, new_state) {
                    (Some(before), Some(after)) if before == after => {
                        debug!(request = %request, state = %after, "State unchanged, not enqueuing");
                        continue;
                    }
                    (Some(_), Some(_)) => {
                        info!(
                            request = %request,
                            old_state = ?old_state,
                            new_state = ?new_state,
                            "Enqueue request due to state change"
                        );
                    }
                    _ => {
                        warn!(
                            request = %request,
                            object = %object.name_any(),
                            "status.state missing on dependent object, enqueuing anyway"
                        );
                    }
                }
            } else {
                debug!(request = %request, "Enqueue request");
            }
            requests.insert(request);
        }
        requests
    }

    /// Compute requests for `event` and hand them to `queue`.
    pub fn handle<K>(&self, event: &ObjectEvent<K>, queue: &dyn WorkQueue)
    where
        K: Resource + Serialize,
    {
        for request in self.requests(event) {
            queue.add(request);
        }
    }
}
