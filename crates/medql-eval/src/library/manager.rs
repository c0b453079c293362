//! Include resolution
//!
//! The manager loads library text from a [`LibrarySource`], resolves its
//! includes depth-first and compiles it. Identical source text is compiled
//! once per [`LibraryCache`]. A chain of the libraries currently being
//! resolved detects include cycles.

use super::{CompiledLibrary, LibraryCache, LibrarySource};
use indexmap::IndexMap;
use medql_diagnostics::{MQL0101, MQL0102, MQL0103, MQL0104, MedqlError};
use std::sync::Arc;

pub struct LibraryManager {
    source: Box<dyn LibrarySource>,
    cache: Arc<LibraryCache>,
}

impl LibraryManager {
    /// Manager with a private cache
    pub fn new(source: impl LibrarySource + 'static) -> Self {
        Self::with_cache(source, Arc::new(LibraryCache::new()))
    }

    pub fn with_cache(source: impl LibrarySource + 'static, cache: Arc<LibraryCache>) -> Self {
        Self {
            source: Box::new(source),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<LibraryCache> {
        &self.cache
    }

    /// Load and compile a library with all of its includes
    pub fn resolve(&self, name: &str, version: Option<&str>) -> Result<Arc<CompiledLibrary>, MedqlError> {
        self.resolve_in_chain(name, version, &mut Vec::new())
    }

    /// Compile source text whose includes come from this manager's source
    pub fn compile_source(&self, source: &str) -> Result<Arc<CompiledLibrary>, MedqlError> {
        self.compile_in_chain(source, &mut Vec::new())
    }

    /// Compile an already-built library (for example one loaded from the
    /// interchange format), resolving its includes through this manager
    pub fn compile(&self, library: medql_ast::Library) -> Result<Arc<CompiledLibrary>, MedqlError> {
        let mut chain: Vec<String> = library.name().map(str::to_string).into_iter().collect();
        let resolved = self.resolve_includes(&library, &mut chain)?;
        Ok(Arc::new(CompiledLibrary::with_includes(library, resolved)?))
    }

    fn resolve_in_chain(
        &self,
        name: &str,
        version: Option<&str>,
        chain: &mut Vec<String>,
    ) -> Result<Arc<CompiledLibrary>, MedqlError> {
        if let Some(start) = chain.iter().position(|n| n == name) {
            let cycle: Vec<&str> = chain[start..].iter().map(String::as_str).chain([name]).collect();
            return Err(MedqlError::semantic(
                MQL0102,
                format!("Circular include detected: {}", cycle.join(" -> ")),
            ));
        }
        log::debug!("resolving library {name} version {}", version.unwrap_or("<any>"));
        let text = self.source.load(name, version).ok_or_else(|| {
            let message = match version {
                Some(v) => format!("Library '{name}' version '{v}' not found"),
                None => format!("Library '{name}' not found"),
            };
            MedqlError::semantic(MQL0101, message)
        })?;
        let library = self.compile_in_chain(&text, chain)?;

        if let Some(wanted) = version {
            if library.version() != Some(wanted) {
                return Err(MedqlError::semantic(
                    MQL0103,
                    format!(
                        "Library '{name}' has version '{}' but version '{wanted}' was requested",
                        library.version().unwrap_or("<none>")
                    ),
                ));
            }
        }
        Ok(library)
    }

    fn compile_in_chain(&self, text: &str, chain: &mut Vec<String>) -> Result<Arc<CompiledLibrary>, MedqlError> {
        let hash = LibraryCache::content_hash(text);
        if let Some(hit) = self.cache.get(&hash) {
            return Ok(hit);
        }

        let library = medql_parser::parse_library(text)?;
        let pushed = library.name().map(str::to_string);
        if let Some(name) = &pushed {
            chain.push(name.clone());
        }
        let resolved = self.resolve_includes(&library, chain);
        if pushed.is_some() {
            chain.pop();
        }

        let compiled = Arc::new(CompiledLibrary::with_includes(library, resolved?)?);
        self.cache.insert(hash, Arc::clone(&compiled));
        Ok(compiled)
    }

    fn resolve_includes(
        &self,
        library: &medql_ast::Library,
        chain: &mut Vec<String>,
    ) -> Result<IndexMap<String, Arc<CompiledLibrary>>, MedqlError> {
        let mut resolved = IndexMap::new();
        for include in &library.includes {
            let alias = include.local_name().to_string();
            if resolved.contains_key(&alias) {
                return Err(MedqlError::semantic(MQL0104, format!("Duplicate include alias '{alias}'")));
            }
            let compiled = self.resolve_in_chain(&include.library, include.version.as_deref(), chain)?;
            resolved.insert(alias, compiled);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::InMemoryLibrarySource;

    #[test]
    fn test_resolves_includes_by_alias() {
        let source = InMemoryLibrarySource::new()
            .with_library("Common", Some("1.0"), "library Common version '1.0'\ndefine Two: 2")
            .with_library("Main", None, "library Main\ninclude Common version '1.0' called C\ndefine Four: C.Two * 2");
        let manager = LibraryManager::new(source);
        let main = manager.resolve("Main", None).unwrap_or_else(|e| panic!("{e}"));
        let common = main.include("C").map(|c| c.name().map(str::to_string));
        assert_eq!(common, Some(Some("Common".to_string())));
        assert_eq!(manager.cache().len(), 2);
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let source = InMemoryLibrarySource::new()
            .with_library("A", None, "library A\ninclude B\ndefine X: 1")
            .with_library("B", None, "library B\ninclude A\ndefine Y: 1");
        let err = LibraryManager::new(source).resolve("A", None).err();
        match err {
            Some(MedqlError::Semantic { code, message }) => {
                assert_eq!(code, MQL0102);
                assert_eq!(message, "Circular include detected: A -> B -> A");
            }
            other => panic!("expected a semantic error, got {other:?}"),
        }
    }

    #[test]
    fn test_version_mismatch() {
        let source = InMemoryLibrarySource::new().with_library("Common", None, "library Common version '2.0'");
        let err = LibraryManager::new(source).resolve("Common", Some("1.0")).err();
        assert_eq!(err.map(|e| e.code()), Some(MQL0103));
    }

    #[test]
    fn test_missing_library() {
        let err = LibraryManager::new(InMemoryLibrarySource::new())
            .compile_source("include Nowhere\ndefine X: 1")
            .err();
        assert_eq!(err.map(|e| e.code()), Some(MQL0101));
    }

    #[test]
    fn test_shared_cache_skips_recompilation() {
        let cache = Arc::new(LibraryCache::new());
        let text = "library Shared\ndefine X: 1";
        let first = LibraryManager::with_cache(InMemoryLibrarySource::new(), Arc::clone(&cache))
            .compile_source(text)
            .map(|l| l.id())
            .ok();
        let second = LibraryManager::with_cache(InMemoryLibrarySource::new(), cache)
            .compile_source(text)
            .map(|l| l.id())
            .ok();
        assert_eq!(first, second);
    }
}
