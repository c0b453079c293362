//! Where library source text comes from

use std::collections::HashMap;
use std::path::PathBuf;

/// Supplies the source text of a library by name and optional version
pub trait LibrarySource: Send + Sync {
    fn load(&self, name: &str, version: Option<&str>) -> Option<String>;
}

/// Library sources registered up front
#[derive(Debug, Clone, Default)]
pub struct InMemoryLibrarySource {
    libraries: HashMap<String, Vec<(Option<String>, String)>>,
}

impl InMemoryLibrarySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(mut self, name: impl Into<String>, version: Option<&str>, source: impl Into<String>) -> Self {
        self.insert(name, version, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, version: Option<&str>, source: impl Into<String>) {
        self.libraries
            .entry(name.into())
            .or_default()
            .push((version.map(str::to_string), source.into()));
    }
}

impl LibrarySource for InMemoryLibrarySource {
    /// An exact version match wins; otherwise the most recently added
    /// source of that name is returned and the caller checks its version
    fn load(&self, name: &str, version: Option<&str>) -> Option<String> {
        let candidates = self.libraries.get(name)?;
        let exact = version.and_then(|v| candidates.iter().rev().find(|(cv, _)| cv.as_deref() == Some(v)));
        exact.or_else(|| candidates.last()).map(|(_, source)| source.clone())
    }
}

/// Searches directories for `Name-version.cql`, then `Name.cql`
#[derive(Debug, Clone, Default)]
pub struct FileLibrarySource {
    paths: Vec<PathBuf>,
}

impl FileLibrarySource {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl LibrarySource for FileLibrarySource {
    fn load(&self, name: &str, version: Option<&str>) -> Option<String> {
        let mut file_names = Vec::with_capacity(2);
        if let Some(v) = version {
            file_names.push(format!("{name}-{v}.cql"));
        }
        file_names.push(format!("{name}.cql"));

        for dir in &self.paths {
            for file_name in &file_names {
                let path = dir.join(file_name);
                match std::fs::read_to_string(&path) {
                    Ok(source) => {
                        log::debug!("loaded library {name} from {}", path.display());
                        return Some(source);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => log::warn!("cannot read {}: {e}", path.display()),
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_prefers_exact_version() {
        let source = InMemoryLibrarySource::new()
            .with_library("Common", Some("1.0"), "library Common version '1.0'")
            .with_library("Common", Some("2.0"), "library Common version '2.0'");
        assert_eq!(source.load("Common", Some("1.0")).as_deref(), Some("library Common version '1.0'"));
        assert_eq!(source.load("Common", None).as_deref(), Some("library Common version '2.0'"));
        assert!(source.load("Other", None).is_none());
    }

    #[test]
    fn test_file_source_search_order() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("Common.cql"), "library Common")?;
        std::fs::write(dir.path().join("Common-2.0.cql"), "library Common version '2.0'")?;

        let source = FileLibrarySource::new([dir.path()]);
        assert_eq!(source.load("Common", Some("2.0")).as_deref(), Some("library Common version '2.0'"));
        assert_eq!(source.load("Common", Some("3.0")).as_deref(), Some("library Common"));
        assert_eq!(source.load("Common", None).as_deref(), Some("library Common"));
        assert!(source.load("Missing", None).is_none());
        Ok(())
    }
}
