//! Compiled-library cache keyed by source content hash

use super::CompiledLibrary;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-mostly map from the SHA-256 of a library's source text to its
/// compiled form. Share one instance between managers with `Arc`.
#[derive(Debug, Default)]
pub struct LibraryCache {
    entries: RwLock<HashMap<String, Arc<CompiledLibrary>>>,
}

impl LibraryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower-case hex SHA-256 of the source text
    pub fn content_hash(source: &str) -> String {
        format!("{:x}", Sha256::digest(source.as_bytes()))
    }

    pub fn get(&self, hash: &str) -> Option<Arc<CompiledLibrary>> {
        let hit = self.entries.read().get(hash).cloned();
        if let Some(library) = &hit {
            log::debug!("library cache hit for {}", library.name().unwrap_or("<anonymous>"));
        }
        hit
    }

    pub fn insert(&self, hash: String, library: Arc<CompiledLibrary>) {
        self.entries.write().insert(hash, library);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_hex() {
        let hash = LibraryCache::content_hash("define A: 1");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, LibraryCache::content_hash("define A: 1"));
        assert_ne!(hash, LibraryCache::content_hash("define A: 2"));
    }

    #[test]
    fn test_insert_and_get() {
        let cache = LibraryCache::new();
        let library = CompiledLibrary::parse("define A: 1").map(Arc::new).ok();
        let Some(library) = library else {
            panic!("library failed to compile");
        };
        let hash = LibraryCache::content_hash("define A: 1");
        cache.insert(hash.clone(), Arc::clone(&library));
        assert_eq!(cache.get(&hash).map(|l| l.id()), Some(library.id()));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
