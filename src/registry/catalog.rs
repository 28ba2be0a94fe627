//! Append-only registry of advertised protocol functions.
//!
//! Descriptors are never removed or reordered, so every handle returned by
//! [`ProtocolRegistry::advertise`] stays valid for the registry's lifetime.

use crate::core::{now, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

/// Tag of the built-in messaging functions.
pub const MESSAGING_TAG: &str = "messaging";
/// Tag of the built-in health functions.
pub const HEALTH_TAG: &str = "health";

/// A function advertised to discovery consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Function name, e.g. `message.send`
    pub name: String,
    /// Capability tag used for lookup
    pub tag: String,
    pub version: String,
    pub description: String,
    /// JSON schema of the arguments, if any
    pub input_schema: Option<serde_json::Value>,
}

impl FunctionDescriptor {
    pub fn new(name: &str, tag: &str) -> Self {
        Self {
            name: name.to_string(),
            tag: tag.to_string(),
            version: "1".to_string(),
            description: String::new(),
            input_schema: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// Functions every node supports: sending a message and querying health.
pub fn core_functions() -> Vec<FunctionDescriptor> {
    vec![
        FunctionDescriptor::new("message.send", MESSAGING_TAG)
            .with_description("Deliver an encoded wire message to a tier or target")
            .with_input_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "frame": { "type": "string", "contentEncoding": "base64" },
                    "target": { "type": "string" }
                },
                "required": ["frame"]
            })),
        FunctionDescriptor::new("health.query", HEALTH_TAG)
            .with_description("Report Healthy, Degraded or Down for a target")
            .with_input_schema(serde_json::json!({
                "type": "object",
                "properties": { "target": { "type": "string" } },
                "required": ["target"]
            })),
    ]
}

/// Proof of an `advertise` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryHandle {
    /// Registry version after the call
    pub version: u64,
    indices: Vec<usize>,
    pub advertised_at: Timestamp,
}

impl RegistryHandle {
    /// Number of descriptors this handle covers.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Serializable registry view for discovery consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryManifest {
    pub version: u64,
    /// No functions beyond plain messaging are available
    pub messaging_only: bool,
    pub functions: Vec<FunctionDescriptor>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<FunctionDescriptor>,
    by_tag: HashMap<String, Vec<usize>>,
    version: u64,
}

/// Append-only capability registry.
#[derive(Default)]
pub struct ProtocolRegistry {
    inner: RwLock<Inner>,
}

impl ProtocolRegistry {
    /// An empty registry: messaging only.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with [`core_functions`].
    pub fn with_core_functions() -> Self {
        let registry = Self::new();
        registry.advertise(core_functions());
        registry
    }

    /// Append capabilities. Descriptors already present are not duplicated;
    /// the handle still covers them.
    pub fn advertise(&self, capabilities: Vec<FunctionDescriptor>) -> RegistryHandle {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut indices = Vec::with_capacity(capabilities.len());
        let mut added = 0usize;

        for descriptor in capabilities {
            let existing = inner
                .by_tag
                .get(&descriptor.tag)
                .and_then(|slots| slots.iter().copied().find(|i| inner.entries[*i] == descriptor));
            let index = match existing {
                Some(index) => index,
                None => {
                    let index = inner.entries.len();
                    inner.by_tag.entry(descriptor.tag.clone()).or_default().push(index);
                    inner.entries.push(descriptor);
                    added += 1;
                    index
                }
            };
            indices.push(index);
        }

        if added > 0 {
            inner.version += 1;
            info!(version = inner.version, added, "capabilities advertised");
        }

        RegistryHandle {
            version: inner.version,
            indices,
            advertised_at: now(),
        }
    }

    /// Descriptors advertised under `tag`, in advertisement order.
    pub fn lookup(&self, tag: &str) -> Vec<FunctionDescriptor> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .by_tag
            .get(tag)
            .map(|slots| slots.iter().map(|i| inner.entries[*i].clone()).collect())
            .unwrap_or_default()
    }

    /// Descriptors covered by a handle.
    pub fn resolve(&self, handle: &RegistryHandle) -> Vec<FunctionDescriptor> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        handle
            .indices
            .iter()
            .filter_map(|i| inner.entries.get(*i).cloned())
            .collect()
    }

    /// Monotonic version, bumped whenever a descriptor is added.
    pub fn version(&self) -> u64 {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).version
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All advertised tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut tags: Vec<String> = inner.by_tag.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn manifest(&self) -> RegistryManifest {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        RegistryManifest {
            version: inner.version,
            messaging_only: inner.entries.is_empty(),
            functions: inner.entries.clone(),
        }
    }

    pub fn manifest_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.manifest())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_is_messaging_only() {
        let registry = ProtocolRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.lookup(MESSAGING_TAG).is_empty());

        let handle = registry.advertise(Vec::new());
        assert!(handle.is_empty());
        assert_eq!(registry.version(), 0);

        let manifest = registry.manifest();
        assert!(manifest.messaging_only);
        assert!(manifest.functions.is_empty());
    }

    #[test]
    fn test_core_functions() {
        let registry = ProtocolRegistry::with_core_functions();
        assert_eq!(registry.version(), 1);
        assert_eq!(registry.lookup(MESSAGING_TAG)[0].name, "message.send");
        assert_eq!(registry.lookup(HEALTH_TAG)[0].name, "health.query");
        assert_eq!(registry.tags(), vec!["health".to_string(), "messaging".to_string()]);
    }

    #[test]
    fn test_lookup_unaffected_by_other_tags() {
        let registry = ProtocolRegistry::with_core_functions();
        let before = registry.lookup(HEALTH_TAG);
        registry.advertise(vec![FunctionDescriptor::new("gesture.stream", "gesture")]);
        assert_eq!(registry.lookup(HEALTH_TAG), before);
    }

    #[test]
    fn test_handles_stay_valid() {
        let registry = ProtocolRegistry::new();
        let first = registry.advertise(vec![FunctionDescriptor::new("a", "x")]);
        let second = registry.advertise(vec![
            FunctionDescriptor::new("b", "x"),
            FunctionDescriptor::new("c", "y"),
        ]);
        assert!(second.version > first.version);

        let names: Vec<String> = registry.resolve(&first).into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a".to_string()]);
        assert_eq!(registry.resolve(&second).len(), 2);
        assert_eq!(registry.lookup("x").len(), 2);
    }

    #[test]
    fn test_duplicates_not_appended() {
        let registry = ProtocolRegistry::new();
        registry.advertise(vec![FunctionDescriptor::new("a", "x")]);
        let again = registry.advertise(vec![FunctionDescriptor::new("a", "x")]);
        assert_eq!(registry.len(), 1);
        assert_eq!(again.version, 1);
        assert_eq!(again.len(), 1);

        registry.advertise(vec![FunctionDescriptor::new("a", "x").with_version("2")]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.version(), 2);
    }

    #[test]
    fn test_manifest_json() {
        let registry = ProtocolRegistry::with_core_functions();
        let json = registry.manifest_json().unwrap();
        let parsed: RegistryManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.version, 1);
        assert!(!parsed.messaging_only);
        assert_eq!(parsed.functions.len(), 2);
    }
}
