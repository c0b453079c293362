//! Compiled libraries
//!
//! A [`CompiledLibrary`] is a parsed library with its declarations indexed
//! by name and its includes resolved. It is immutable and shared behind an
//! `Arc`; all per-evaluation state lives in the evaluation context.

mod cache;
mod manager;
mod source;

pub use cache::LibraryCache;
pub use manager::LibraryManager;
pub use source::{FileLibrarySource, InMemoryLibrarySource, LibrarySource};

use indexmap::IndexMap;
use medql_ast::{
    AccessModifier, CodeDef, CodeSystemDef, ConceptDef, ExpressionDef, FunctionDef, Library, LibraryIdentifier,
    ParameterDef, Statement, ValueSetDef,
};
use medql_diagnostics::{MQL0100, MQL0101, MQL0104, MedqlError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LIBRARY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct CompiledLibrary {
    id: u64,
    library: Library,
    definitions: IndexMap<String, ExpressionDef>,
    functions: HashMap<String, Vec<FunctionDef>>,
    parameters: IndexMap<String, ParameterDef>,
    codesystems: HashMap<String, CodeSystemDef>,
    valuesets: HashMap<String, ValueSetDef>,
    codes: HashMap<String, CodeDef>,
    concepts: HashMap<String, ConceptDef>,
    includes: IndexMap<String, Arc<CompiledLibrary>>,
}

impl CompiledLibrary {
    /// Compile a library that has no includes
    pub fn new(library: Library) -> Result<Self, MedqlError> {
        Self::with_includes(library, IndexMap::new())
    }

    /// Parse and compile library source that has no includes
    pub fn parse(source: &str) -> Result<Self, MedqlError> {
        let library = medql_parser::parse_library(source)?;
        Self::new(library)
    }

    /// Compile a library whose includes were resolved by the caller, keyed
    /// by the local name (alias) of each include
    pub fn with_includes(
        library: Library,
        mut resolved: IndexMap<String, Arc<CompiledLibrary>>,
    ) -> Result<Self, MedqlError> {
        let mut includes = IndexMap::new();
        for include in &library.includes {
            let alias = include.local_name().to_string();
            if includes.contains_key(&alias) {
                return Err(MedqlError::semantic(MQL0104, format!("Duplicate include alias '{alias}'")));
            }
            let compiled = resolved.shift_remove(&alias).ok_or_else(|| {
                MedqlError::semantic(MQL0101, format!("Included library '{}' could not be resolved", include.library))
            })?;
            includes.insert(alias, compiled);
        }

        let mut seen = HashSet::new();
        let mut claim = |name: &str, what: &str| {
            if seen.insert(name.to_string()) {
                Ok(())
            } else {
                Err(MedqlError::semantic(MQL0100, format!("Duplicate {what} '{name}'")))
            }
        };
        let mut parameters = IndexMap::new();
        for p in &library.parameters {
            claim(&p.name, "parameter")?;
            parameters.insert(p.name.clone(), p.inner.clone());
        }
        let mut codesystems = HashMap::new();
        for cs in &library.codesystems {
            claim(&cs.name, "code system")?;
            codesystems.insert(cs.name.clone(), cs.inner.clone());
        }
        let mut valuesets = HashMap::new();
        for vs in &library.valuesets {
            claim(&vs.name, "value set")?;
            valuesets.insert(vs.name.clone(), vs.inner.clone());
        }
        let mut codes = HashMap::new();
        for code in &library.codes {
            claim(&code.name, "code")?;
            if !codesystems.contains_key(&code.codesystem) {
                return Err(MedqlError::semantic(
                    MQL0100,
                    format!("Code '{}' refers to undeclared code system '{}'", code.name, code.codesystem),
                ));
            }
            codes.insert(code.name.clone(), code.inner.clone());
        }
        let mut concepts = HashMap::new();
        for concept in &library.concepts {
            claim(&concept.name, "concept")?;
            concepts.insert(concept.name.clone(), concept.inner.clone());
        }

        let mut definitions = IndexMap::new();
        let mut functions: HashMap<String, Vec<FunctionDef>> = HashMap::new();
        for statement in &library.statements {
            match &statement.inner {
                Statement::Expression(def) => {
                    claim(&def.name, "definition")?;
                    definitions.insert(def.name.clone(), def.clone());
                }
                Statement::Function(def) => {
                    let overloads = functions.entry(def.name.clone()).or_default();
                    let same_signature = overloads.iter().any(|f| {
                        f.operands.len() == def.operands.len()
                            && f.operands.iter().zip(&def.operands).all(|(a, b)| a.type_specifier == b.type_specifier)
                    });
                    if same_signature {
                        return Err(MedqlError::semantic(
                            MQL0100,
                            format!("Duplicate function '{}' with the same signature", def.name),
                        ));
                    }
                    overloads.push(def.clone());
                }
            }
        }
        if let Some(name) = functions.keys().find(|f| definitions.contains_key(*f)) {
            return Err(MedqlError::semantic(
                MQL0100,
                format!("'{name}' is defined both as an expression and a function"),
            ));
        }

        Ok(Self {
            id: NEXT_LIBRARY_ID.fetch_add(1, Ordering::Relaxed),
            library,
            definitions,
            functions,
            parameters,
            codesystems,
            valuesets,
            codes,
            concepts,
            includes,
        })
    }

    /// Process-unique identity, used to key per-context caches
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn identifier(&self) -> Option<&LibraryIdentifier> {
        self.library.identifier.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.library.name()
    }

    pub fn version(&self) -> Option<&str> {
        self.identifier().and_then(|id| id.version.as_deref())
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn definition(&self, name: &str) -> Option<&ExpressionDef> {
        self.definitions.get(name)
    }

    /// Expression definitions in source order
    pub fn definitions(&self) -> impl Iterator<Item = &ExpressionDef> {
        self.definitions.values()
    }

    pub fn public_definitions(&self) -> impl Iterator<Item = &ExpressionDef> {
        self.definitions.values().filter(|d| d.access == AccessModifier::Public)
    }

    pub fn functions(&self, name: &str) -> &[FunctionDef] {
        self.functions.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &ParameterDef> {
        self.parameters.values()
    }

    pub fn codesystem(&self, name: &str) -> Option<&CodeSystemDef> {
        self.codesystems.get(name)
    }

    pub fn valueset(&self, name: &str) -> Option<&ValueSetDef> {
        self.valuesets.get(name)
    }

    pub fn code(&self, name: &str) -> Option<&CodeDef> {
        self.codes.get(name)
    }

    pub fn concept(&self, name: &str) -> Option<&ConceptDef> {
        self.concepts.get(name)
    }

    pub fn include(&self, alias: &str) -> Option<&Arc<CompiledLibrary>> {
        self.includes.get(alias)
    }

    pub fn includes(&self) -> impl Iterator<Item = (&str, &Arc<CompiledLibrary>)> {
        self.includes.iter().map(|(alias, lib)| (alias.as_str(), lib))
    }

    /// Context declared by the library, the last `context` statement
    pub fn context(&self) -> Option<&str> {
        self.library.contexts.last().map(|c| c.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medql_diagnostics::MQL0101;

    #[test]
    fn test_declarations_are_indexed() {
        let library = CompiledLibrary::parse(
            r#"library Demo version '1'
codesystem "LOINC": 'http://loinc.org'
code "Systolic": '8480-6' from "LOINC"
parameter Threshold Integer default 140
define "High": 150 > Threshold
define private Hidden: 1
define function Double(x Integer): x * 2
define function Double(x Decimal): x * 2.0
"#,
        )
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(library.name(), Some("Demo"));
        assert_eq!(library.version(), Some("1"));
        assert!(library.definition("High").is_some());
        assert_eq!(library.public_definitions().count(), 1);
        assert_eq!(library.functions("Double").len(), 2);
        assert!(library.code("Systolic").is_some());
        assert!(library.parameter("Threshold").is_some());
    }

    #[test]
    fn test_duplicate_definition() {
        let err = CompiledLibrary::parse("define A: 1\ndefine A: 2").err();
        assert_eq!(err.map(|e| e.code()), Some(MQL0100));
    }

    #[test]
    fn test_unresolved_include() {
        let err = CompiledLibrary::parse("include Common called C\ndefine A: 1").err();
        assert_eq!(err.map(|e| e.code()), Some(MQL0101));
    }

    #[test]
    fn test_libraries_get_distinct_ids() {
        let a = CompiledLibrary::parse("define A: 1").map(|l| l.id()).ok();
        let b = CompiledLibrary::parse("define A: 1").map(|l| l.id()).ok();
        assert_ne!(a, b);
    }
}
