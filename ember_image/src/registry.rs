//! The table of loaded object memories.
//!
//! Children name their parent by URI; the loader resolves that name here.
//! Lookups are read-mostly (every dependent image load is one lookup), so
//! a read-write lock over a hash map is plenty.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::memory::ObjectMemory;

/// Process-wide registry of loaded object memories, keyed by URI.
#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: RwLock<FxHashMap<String, Arc<ObjectMemory>>>,
}

impl ImageRegistry {
    /// Create an empty registry.
    pub fn new() -> ImageRegistry {
        ImageRegistry {
            images: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register a loaded memory under its URI. Re-registering a URI
    /// replaces the previous entry and returns it.
    pub fn register(&self, memory: Arc<ObjectMemory>) -> Option<Arc<ObjectMemory>> {
        self.images
            .write()
            .insert(memory.uri().to_string(), memory)
    }

    /// Find a loaded memory by URI.
    pub fn lookup(&self, uri: &str) -> Option<Arc<ObjectMemory>> {
        self.images.read().get(uri).cloned()
    }

    /// Number of registered memories.
    pub fn len(&self) -> usize {
        self.images.read().len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.images.read().is_empty()
    }
}
