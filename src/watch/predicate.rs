//! Event filters.

use kube::Resource;

use super::ObjectEvent;

/// Decides whether an event is worth handling at all.
pub trait EventFilter<K>: Send + Sync {
    fn allows(&self, event: &ObjectEvent<K>) -> bool;
}

/// Passes updates only when `metadata.generation` changed, i.e. the `spec`
/// was edited. Status-only and metadata-only updates are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationChangedPredicate;

impl<K: Resource> EventFilter<K> for GenerationChangedPredicate {
    fn allows(&self, event: &ObjectEvent<K>) -> bool {
        match event {
            ObjectEvent::Update { old, new } => old.meta().generation != new.meta().generation,
            _ => true,
        }
    }
}

/// Passes updates only when `metadata.labels` changed. A missing label map
/// and an empty one are the same.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelsChangedPredicate;

impl<K: Resource> EventFilter<K> for LabelsChangedPredicate {
    fn allows(&self, event: &ObjectEvent<K>) -> bool {
        match event {
            ObjectEvent::Update { old, new } => {
                let labels = |obj: &K| obj.meta().labels.clone().filter(|l| !l.is_empty());
                labels(old) != labels(new)
            }
            _ => true,
        }
    }
}

/// Passes an event when either filter does.
#[derive(Debug, Clone, Copy, Default)]
pub struct Or<A, B>(pub A, pub B);

impl<K, A, B> EventFilter<K> for Or<A, B>
where
    A: EventFilter<K>,
    B: EventFilter<K>,
{
    fn allows(&self, event: &ObjectEvent<K>) -> bool {
        self.0.allows(event) || self.1.allows(event)
    }
}
