//! Component descriptors embedded in module templates.
//!
//! A template carries a versioned component descriptor naming the module
//! component and its semantic version. Decoding is deterministic, so decoded
//! descriptors are memoized per template in a shared [`DescriptorCache`].
//!
//! Both descriptor layouts in use are recognised:
//!
//! ```yaml
//! # v2
//! component:
//!   name: fleet.io/keda
//!   version: 1.2.0
//!
//! # v3
//! metadata:
//!   name: fleet.io/keda
//!   version: 1.2.0
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::debug;

use crate::api::ModuleTemplate;

/// Error types for descriptor decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("descriptor is empty")]
    Empty,

    #[error("descriptor could not be parsed: {0}")]
    Parse(String),

    #[error("descriptor has no component name")]
    MissingName,

    #[error("descriptor has no component version")]
    MissingVersion,
}

/// Decoded identity of a module component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Component name.
    pub name: String,
    /// Semantic version string, not yet parsed.
    pub version: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    component: Option<RawComponent>,
    #[serde(default)]
    metadata: Option<RawComponent>,
}

#[derive(Debug, Default, Deserialize)]
struct RawComponent {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

impl Descriptor {
    /// Decode a raw JSON or YAML descriptor document.
    pub fn decode(raw: &[u8]) -> Result<Self, DescriptorError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(DescriptorError::Empty);
        }
        let parsed: RawDescriptor =
            serde_yaml::from_slice(raw).map_err(|e| DescriptorError::Parse(e.to_string()))?;
        Self::from_raw(parsed)
    }

    /// Decode the descriptor embedded in a template spec.
    ///
    /// The descriptor is usually an inline object but may also be a string
    /// holding the serialized document.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, DescriptorError> {
        match value {
            serde_json::Value::Null => Err(DescriptorError::Empty),
            serde_json::Value::String(raw) => Self::decode(raw.as_bytes()),
            other => {
                let parsed: RawDescriptor = serde_json::from_value(other.clone())
                    .map_err(|e| DescriptorError::Parse(e.to_string()))?;
                Self::from_raw(parsed)
            }
        }
    }

    fn from_raw(raw: RawDescriptor) -> Result<Self, DescriptorError> {
        let component = raw
            .component
            .or(raw.metadata)
            .ok_or(DescriptorError::MissingName)?;
        if component.name.is_empty() {
            return Err(DescriptorError::MissingName);
        }
        if component.version.is_empty() {
            return Err(DescriptorError::MissingVersion);
        }
        Ok(Self {
            name: component.name,
            version: component.version,
        })
    }
}

#[derive(Debug)]
struct CachedDescriptor {
    generation: i64,
    descriptor: Arc<Descriptor>,
}

/// Shared memo of decoded descriptors keyed by
/// [`ModuleTemplate::descriptor_cache_key`].
///
/// Each slot holds the descriptor of one template generation. Every
/// descriptor edit bumps the generation, so a generation mismatch is a miss
/// and the newer decode replaces the stale entry.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: RwLock<HashMap<String, CachedDescriptor>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded descriptor of `template`, decoding and caching on a miss.
    ///
    /// Failures are not cached; a broken template fails again on every call.
    pub fn get(&self, template: &ModuleTemplate) -> Result<Arc<Descriptor>, DescriptorError> {
        let key = template.descriptor_cache_key();
        let generation = template.generation();
        if let Some(cached) = self.entries.read().get(&key) {
            if cached.generation == generation {
                return Ok(Arc::clone(&cached.descriptor));
            }
        }

        let descriptor = Arc::new(Descriptor::from_value(&template.spec.descriptor)?);
        debug!(
            key = %key,
            generation = generation,
            component = %descriptor.name,
            version = %descriptor.version,
            "Caching decoded descriptor"
        );
        self.entries.write().insert(
            key,
            CachedDescriptor {
                generation,
                descriptor: Arc::clone(&descriptor),
            },
        );
        Ok(descriptor)
    }

    /// Drop the cached descriptor of a deleted template.
    pub fn evict(&self, template: &ModuleTemplate) {
        self.entries.write().remove(&template.descriptor_cache_key());
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
