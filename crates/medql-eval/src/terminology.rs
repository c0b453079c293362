//! Terminology: value set expansion and code membership
//!
//! The engine never talks to a terminology server. A [`TerminologyProvider`]
//! supplies expansions; membership is then decided locally by comparing
//! (system, code) pairs. Version and display never take part.

use medql_types::{Code, Concept, Value};
use std::collections::{HashMap, HashSet};

/// Source of value set expansions and code system contents
pub trait TerminologyProvider: Send + Sync {
    /// Every (system, code) pair in the value set, `None` when unknown
    fn expand(&self, valueset: &str) -> Option<Vec<Code>>;

    /// Whether the code system contains the code, `None` when unknown
    fn code_system_contains(&self, system: &str, code: &str) -> Option<bool>;
}

/// Explicit expansions held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTerminology {
    valuesets: HashMap<String, Vec<Code>>,
    codesystems: HashMap<String, HashSet<String>>,
}

impl InMemoryTerminology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value set. The codes are also recorded as members of their
    /// code systems.
    pub fn with_valueset(mut self, url: impl Into<String>, codes: impl IntoIterator<Item = Code>) -> Self {
        self.add_valueset(url, codes);
        self
    }

    pub fn add_valueset(&mut self, url: impl Into<String>, codes: impl IntoIterator<Item = Code>) {
        let codes: Vec<Code> = codes.into_iter().collect();
        for code in &codes {
            if let Some(system) = &code.system {
                self.codesystems.entry(system.clone()).or_default().insert(code.code.clone());
            }
        }
        self.valuesets.insert(url.into(), codes);
    }

    pub fn add_code_system(&mut self, url: impl Into<String>, codes: impl IntoIterator<Item = impl Into<String>>) {
        self.codesystems
            .entry(url.into())
            .or_default()
            .extend(codes.into_iter().map(Into::into));
    }

    /// Load a FHIR `ValueSet` resource with an `expansion.contains` list
    pub fn add_valueset_resource(&mut self, resource: &Value) -> bool {
        let Some(url) = resource.get("url").and_then(Value::as_str) else {
            return false;
        };
        let codes = resource
            .get("expansion")
            .and_then(|e| e.get("contains"))
            .cloned()
            .unwrap_or_default()
            .into_collection()
            .iter()
            .filter_map(Value::as_code)
            .collect::<Vec<_>>();
        log::debug!("loaded value set {url} with {} codes", codes.len());
        self.add_valueset(url.to_string(), codes);
        true
    }

    pub fn len(&self) -> usize {
        self.valuesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valuesets.is_empty()
    }
}

impl TerminologyProvider for InMemoryTerminology {
    fn expand(&self, valueset: &str) -> Option<Vec<Code>> {
        self.valuesets.get(valueset).cloned()
    }

    fn code_system_contains(&self, system: &str, code: &str) -> Option<bool> {
        self.codesystems.get(system).map(|codes| codes.contains(code))
    }
}

pub fn code_in_codes(code: &Code, codes: &[Code]) -> bool {
    codes.iter().any(|c| c.is_equivalent(code))
}

pub fn concept_in_codes(concept: &Concept, codes: &[Code]) -> bool {
    concept.codes.iter().any(|c| code_in_codes(c, codes))
}

/// Membership of a coded value (code, concept, coding or codeable-concept
/// shaped tuple, or a list of those) in an expansion. Null when the value is
/// Null or not coded at all.
pub fn value_in_codes(value: &Value, codes: &[Code]) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::List(items) => {
            let results: Vec<Option<bool>> = items.iter().map(|v| value_in_codes(v, codes)).collect();
            if results.contains(&Some(true)) {
                Some(true)
            } else if results.iter().all(Option::is_none) && !results.is_empty() {
                None
            } else {
                Some(false)
            }
        }
        Value::String(s) => Some(codes.iter().any(|c| &c.code == s)),
        other => other.as_concept().map(|concept| concept_in_codes(&concept, codes)),
    }
}
