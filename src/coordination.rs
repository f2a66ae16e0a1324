//! Attribute store client.
//!
//! A small set of globally visible items (version attributes, ensemble
//! membership, fabric requirements, default JVM options) lives in a
//! hierarchical key-value coordination service instead of the git tree, so
//! agents can read them without a git round-trip. The store consumes the
//! service through the [`AttributeStore`] trait; deployments plug in their
//! coordination client, tests use [`MemoryAttributeStore`].

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StoreError;
use crate::properties;

/// Well-known attribute store paths.
pub mod paths {
    /// Cluster id of the current ensemble.
    pub const ENSEMBLES: &str = "/fabric/configs/ensembles";
    /// Fabric-wide requirements JSON.
    pub const REQUIREMENTS_JSON: &str =
        "/fabric/configs/org.fusesource.fabric.requirements.json";
    /// Default JVM options for new containers.
    pub const DEFAULT_JVM_OPTIONS: &str = "/fabric/configs/default-jvm-options";
    /// Version new containers are created on.
    pub const DEFAULT_VERSION: &str = "/fabric/configs/default-version";

    /// Comma-separated container names of ensemble `id`.
    pub fn ensemble(id: &str) -> String {
        format!("/fabric/configs/ensemble/{id}")
    }

    /// Attributes of version `version`.
    pub fn version(version: &str) -> String {
        format!("/fabric/configs/versions/{version}")
    }
}

/// Hierarchical key-value service holding fabric-wide metadata.
///
/// The service is independently consistent; callers treat it as eventually
/// consistent and never access it under the git operation lock.
pub trait AttributeStore: Send + Sync {
    /// Whether the coordination service is currently reachable.
    fn is_connected(&self) -> bool;

    fn exists(&self, path: &str) -> Result<bool, StoreError>;

    fn get_string(&self, path: &str) -> Result<Option<String>, StoreError>;

    fn set_string(&self, path: &str, value: &str) -> Result<(), StoreError>;

    /// Read the node at `path` as a properties map; absent node is empty.
    fn get_map(&self, path: &str) -> Result<BTreeMap<String, String>, StoreError> {
        match self.get_string(path)? {
            Some(text) => properties::parse(text.as_bytes()),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Write `map` to the node at `path` in properties format.
    fn set_map(&self, path: &str, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let text = String::from_utf8(properties::render(map))
            .map_err(|e| StoreError::Coordination(e.to_string()))?;
        self.set_string(path, &text)
    }
}

/// In-memory attribute store.
///
/// Backs tests and single-node embedding; `set_connected(false)` simulates a
/// disconnected coordinator.
#[derive(Default)]
pub struct MemoryAttributeStore {
    nodes: Mutex<BTreeMap<String, String>>,
    disconnected: AtomicBool,
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    fn check_connected(&self) -> Result<(), StoreError> {
        if self.disconnected.load(Ordering::SeqCst) {
            Err(StoreError::Coordination("not connected".into()))
        } else {
            Ok(())
        }
    }
}

impl AttributeStore for MemoryAttributeStore {
    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        self.check_connected()?;
        Ok(self.nodes.lock().expect("attribute store lock").contains_key(path))
    }

    fn get_string(&self, path: &str) -> Result<Option<String>, StoreError> {
        self.check_connected()?;
        Ok(self.nodes.lock().expect("attribute store lock").get(path).cloned())
    }

    fn set_string(&self, path: &str, value: &str) -> Result<(), StoreError> {
        self.check_connected()?;
        self.nodes
            .lock()
            .expect("attribute store lock")
            .insert(path.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_round_trip_through_nodes() {
        let store = MemoryAttributeStore::new();
        let node = paths::version("1.0");
        assert!(store.get_map(&node).unwrap().is_empty());

        let mut attrs = BTreeMap::new();
        attrs.insert("parent".to_string(), "1.0".to_string());
        attrs.insert("description".to_string(), "first cut".to_string());
        store.set_map(&node, &attrs).unwrap();
        assert_eq!(store.get_map(&node).unwrap(), attrs);
    }

    #[test]
    fn disconnection_surfaces_as_coordination_error() {
        let store = MemoryAttributeStore::new();
        store.set_connected(false);
        assert!(!store.is_connected());
        let err = store.get_string(paths::ENSEMBLES).unwrap_err();
        assert!(matches!(err, StoreError::Coordination(_)));
    }

    #[test]
    fn well_known_paths() {
        assert_eq!(paths::version("1.1"), "/fabric/configs/versions/1.1");
        assert_eq!(paths::ensemble("0000"), "/fabric/configs/ensemble/0000");
    }
}
