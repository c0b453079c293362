//! Library file loading and include resolution

use anyhow::{Context, Result};
use medql_eval::{CompiledLibrary, FileLibrarySource, LibraryManager};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extra search directories, separated like `PATH`
pub const LIBRARY_PATH_ENV: &str = "MEDQL_LIBRARY_PATH";

/// Search paths for includes: the explicit ones, then the directory of the
/// main library, then anything in [`LIBRARY_PATH_ENV`]
pub fn search_paths(explicit: &[PathBuf], main_file: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = explicit.to_vec();
    if let Some(dir) = main_file.and_then(Path::parent) {
        let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
        if !paths.iter().any(|p| p == dir) {
            paths.push(dir.to_path_buf());
        }
    }
    if let Some(env_paths) = std::env::var_os(LIBRARY_PATH_ENV) {
        paths.extend(std::env::split_paths(&env_paths).filter(|p| !p.as_os_str().is_empty()));
    }
    paths
}

pub fn library_manager(search_paths: Vec<PathBuf>) -> LibraryManager {
    log::debug!("library search paths: {search_paths:?}");
    LibraryManager::new(FileLibrarySource::new(search_paths))
}

/// Whether a file holds an interchange document rather than source text
pub fn is_interchange(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Load and compile a library from source text or an interchange document,
/// resolving its includes through `manager`
pub fn load_library(manager: &LibraryManager, path: &Path) -> Result<Arc<CompiledLibrary>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let compiled = if is_interchange(path) {
        let library = medql_elm::library_from_str(&text)?;
        manager.compile(library)?
    } else {
        manager.compile_source(&text)?
    };
    log::info!(
        "loaded library {} from {}",
        compiled.name().unwrap_or("(anonymous)"),
        path.display()
    );
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interchange_detection() {
        assert!(is_interchange(Path::new("lib/Screening.json")));
        assert!(is_interchange(Path::new("Screening.JSON")));
        assert!(!is_interchange(Path::new("Screening.cql")));
        assert!(!is_interchange(Path::new("Screening")));
    }

    #[test]
    fn test_main_file_directory_is_searched() {
        let paths = search_paths(&[PathBuf::from("common")], Some(Path::new("measures/Screening.cql")));
        assert_eq!(paths[0], PathBuf::from("common"));
        assert_eq!(paths[1], PathBuf::from("measures"));
    }

    #[test]
    fn test_bare_file_name_searches_current_directory() {
        let paths = search_paths(&[], Some(Path::new("Screening.cql")));
        assert_eq!(paths[0], PathBuf::from("."));
    }
}
