//! Kube watcher adapter.
//!
//! A `watcher` stream only reports the current state of objects. The
//! translator remembers the last seen version of each object so it can emit
//! update events carrying both sides, and deletes for objects that vanished
//! while the watch was re-listing.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;

use futures::StreamExt;
use kube::{
    runtime::{
        watcher::{self, Event},
        WatchStreamExt,
    },
    Api, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::ObjectEvent;

type ObjectKey = (Option<String>, String);

fn key_of<K: Resource>(obj: &K) -> ObjectKey {
    (obj.namespace(), obj.name_any())
}

/// Turns raw watcher events into create/update/delete events.
pub struct EventTranslator<K> {
    known: HashMap<ObjectKey, K>,
    relist: Option<HashSet<ObjectKey>>,
}

impl<K> Default for EventTranslator<K> {
    fn default() -> Self {
        Self {
            known: HashMap::new(),
            relist: None,
        }
    }
}

impl<K: Resource + Clone> EventTranslator<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, event: Event<K>) -> Vec<ObjectEvent<K>> {
        match event {
            Event::Init => {
                self.relist = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(obj) => {
                if let Some(seen) = self.relist.as_mut() {
                    seen.insert(key_of(&obj));
                }
                self.apply(obj).into_iter().collect()
            }
            Event::InitDone => {
                let Some(seen) = self.relist.take() else {
                    return Vec::new();
                };
                let gone: Vec<ObjectKey> = self
                    .known
                    .keys()
                    .filter(|k| !seen.contains(*k))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|k| self.known.remove(&k))
                    .map(ObjectEvent::Delete)
                    .collect()
            }
            Event::Apply(obj) => self.apply(obj).into_iter().collect(),
            Event::Delete(obj) => {
                self.known.remove(&key_of(&obj));
                vec![ObjectEvent::Delete(obj)]
            }
        }
    }

    fn apply(&mut self, obj: K) -> Option<ObjectEvent<K>> {
        match self.known.insert(key_of(&obj), obj.clone()) {
            None => Some(ObjectEvent::Create(obj)),
            Some(old) => {
                let unchanged = old.meta().resource_version.is_some()
                    && old.meta().resource_version == obj.meta().resource_version;
                if unchanged {
                    None
                } else {
                    Some(ObjectEvent::Update { old, new: obj })
                }
            }
        }
    }

    /// Objects currently known to exist.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// A watch over one resource type.
pub struct EventSource<K> {
    api: Api<K>,
    config: watcher::Config,
    name: String,
}

impl<K> EventSource<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    pub fn new(api: Api<K>, config: watcher::Config, name: impl Into<String>) -> Self {
        Self {
            api,
            config,
            name: name.into(),
        }
    }

    /// Drive the watch, calling `handler` for every translated event.
    ///
    /// Stream errors are logged and the watcher backs off and resumes; this
    /// only returns if the underlying stream ends.
    pub async fn run<F, Fut>(self, mut handler: F)
    where
        F: FnMut(ObjectEvent<K>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut translator = EventTranslator::new();
        let mut stream = watcher::watcher(self.api, self.config)
            .default_backoff()
            .boxed();

        info!(source = %self.name, "Starting watch");
        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => {
                    for translated in translator.translate(event) {
                        handler(translated).await;
                    }
                    debug!(source = %self.name, known = translator.len(), "Watch event handled");
                }
                Err(e) => {
                    warn!(source = %self.name, error = %e, "Watch stream error, backing off");
                }
            }
        }
        info!(source = %self.name, "Watch stream ended");
    }
}
