//! Retrieve: fetching clinical records from a data source
//!
//! A `[Condition: code in "Diabetes"]` expression becomes a [`RetrieveRequest`]
//! that is handed to the [`DataSource`] configured on the evaluation context.
//! [`InMemoryDataSource`] serves resources loaded from JSON documents or
//! bundles and applies the compartment, code and date filters itself.

use crate::terminology::{TerminologyProvider, value_in_codes};
use medql_ast::CodeComparator;
use medql_types::{Code, Interval, Value, compare};
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSourceError {
    #[error("Data type '{0}' is not supported by this data source")]
    UnsupportedType(String),

    #[error("Value set '{0}' cannot be expanded")]
    UnknownValueSet(String),

    #[error("{0}")]
    Backend(String),
}

/// Everything the engine knows about one retrieve
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveRequest {
    pub data_type: String,
    /// Name of the evaluation context, `Patient` for instance
    pub context: Option<String>,
    /// The context subject; results are restricted to its compartment
    pub subject: Option<Value>,
    /// Dotted path of the coded element, `code` when not given
    pub code_path: Option<String>,
    pub comparator: Option<CodeComparator>,
    pub codes: Option<Vec<Code>>,
    /// Value set filter; alongside `codes` when the engine already expanded it
    pub valueset: Option<String>,
    pub date_path: Option<String>,
    pub date_range: Option<Interval>,
}

impl RetrieveRequest {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            context: None,
            subject: None,
            code_path: None,
            comparator: None,
            codes: None,
            valueset: None,
            date_path: None,
            date_range: None,
        }
    }

    pub fn with_codes(mut self, codes: Vec<Code>) -> Self {
        self.codes = Some(codes);
        self
    }

    pub fn with_valueset(mut self, url: impl Into<String>) -> Self {
        self.valueset = Some(url.into());
        self
    }

    pub fn with_subject(mut self, context: impl Into<String>, subject: Value) -> Self {
        self.context = Some(context.into());
        self.subject = Some(subject);
        self
    }

    pub fn code_path(&self) -> &str {
        self.code_path.as_deref().unwrap_or("code")
    }
}

/// Supplier of clinical records
pub trait DataSource: Send + Sync {
    fn retrieve(&self, request: &RetrieveRequest) -> Result<Vec<Value>, DataSourceError>;

    /// Resolve a literal reference such as `Patient/123`
    fn resolve_reference(&self, reference: &str) -> Result<Option<Value>, DataSourceError> {
        let _ = reference;
        Ok(None)
    }
}

/// Resources held in memory, in load order
#[derive(Default, Clone)]
pub struct InMemoryDataSource {
    resources: Vec<Value>,
    terminology: Option<Arc<dyn TerminologyProvider>>,
}

impl std::fmt::Debug for InMemoryDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDataSource")
            .field("resources", &self.resources.len())
            .field("terminology", &self.terminology.is_some())
            .finish()
    }
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value set filters are expanded through this provider
    pub fn with_terminology(mut self, terminology: Arc<dyn TerminologyProvider>) -> Self {
        self.terminology = Some(terminology);
        self
    }

    pub fn with_resource(mut self, resource: Value) -> Self {
        self.add(resource);
        self
    }

    pub fn add(&mut self, resource: Value) {
        self.resources.push(resource);
    }

    /// Load a JSON resource. Bundles contribute every `entry[].resource`;
    /// returns the number of resources added.
    pub fn add_json(&mut self, json: &serde_json::Value) -> usize {
        let value = Value::from_json(json);
        if value.resource_type() == Some("Bundle") {
            let entries = value.get("entry").cloned().unwrap_or_default().into_collection();
            let before = self.resources.len();
            for entry in entries {
                if let Some(resource) = entry.get("resource") {
                    self.resources.push(resource.clone());
                }
            }
            self.resources.len() - before
        } else if value.resource_type().is_some() {
            self.resources.push(value);
            1
        } else {
            log::warn!("ignoring JSON document without resourceType");
            0
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        let mut source = Self::new();
        source.add_json(json);
        source
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// First resource of the given type, typically the patient
    pub fn first_of_type(&self, data_type: &str) -> Option<&Value> {
        self.resources.iter().find(|r| r.resource_type() == Some(data_type))
    }

    /// Codes already expanded by the caller win over a value set lookup
    fn filter_codes(&self, request: &RetrieveRequest) -> Result<Option<Vec<Code>>, DataSourceError> {
        if request.codes.is_some() {
            return Ok(request.codes.clone());
        }
        if let Some(url) = &request.valueset {
            let expansion = self
                .terminology
                .as_ref()
                .and_then(|t| t.expand(url))
                .ok_or_else(|| DataSourceError::UnknownValueSet(url.clone()))?;
            return Ok(Some(expansion));
        }
        Ok(None)
    }
}

impl DataSource for InMemoryDataSource {
    fn retrieve(&self, request: &RetrieveRequest) -> Result<Vec<Value>, DataSourceError> {
        let codes = self.filter_codes(request)?;
        let results: Vec<Value> = self
            .resources
            .iter()
            .filter(|r| r.resource_type() == Some(request.data_type.as_str()))
            .filter(|r| in_compartment(r, request))
            .filter(|r| match &codes {
                Some(codes) => value_in_codes(&path_value(r, request.code_path()), codes) == Some(true),
                None => true,
            })
            .filter(|r| match (&request.date_path, &request.date_range) {
                (Some(path), Some(range)) => in_date_range(&path_value(r, path), range),
                _ => true,
            })
            .cloned()
            .collect();
        log::debug!("in-memory retrieve of {} matched {} resource(s)", request.data_type, results.len());
        Ok(results)
    }

    fn resolve_reference(&self, reference: &str) -> Result<Option<Value>, DataSourceError> {
        let Some((resource_type, id)) = reference.rsplit_once('/') else {
            return Ok(None);
        };
        let resource_type = resource_type.rsplit('/').next().unwrap_or(resource_type);
        Ok(self
            .resources
            .iter()
            .find(|r| r.resource_type() == Some(resource_type) && r.get("id").and_then(Value::as_str) == Some(id))
            .cloned())
    }
}

/// Follow a dotted path through tuples, flattening lists on the way
pub fn path_value(resource: &Value, path: &str) -> Value {
    let mut current = vec![resource.clone()];
    for segment in path.split('.') {
        current = current
            .iter()
            .filter_map(|v| v.get(segment))
            .flat_map(|v| v.clone().into_collection())
            .collect();
    }
    match current.len() {
        0 => Value::Null,
        1 => current.pop().unwrap_or_default(),
        _ => Value::List(current),
    }
}

fn reference_of(value: &Value) -> Option<String> {
    let resource_type = value.resource_type()?;
    let id = value.get("id").and_then(Value::as_str)?;
    Some(format!("{resource_type}/{id}"))
}

fn in_compartment(resource: &Value, request: &RetrieveRequest) -> bool {
    let Some(subject) = &request.subject else {
        return true;
    };
    let Some(subject_ref) = reference_of(subject) else {
        return true;
    };
    if reference_of(resource).as_deref() == Some(subject_ref.as_str()) {
        return true;
    }
    ["subject", "patient"].iter().any(|element| {
        resource
            .get(element)
            .and_then(|r| r.get("reference"))
            .and_then(Value::as_str)
            .is_some_and(|r| r == subject_ref || r.ends_with(&format!("/{subject_ref}")))
    })
}

fn at_or_before(a: &Value, b: &Value) -> bool {
    matches!(compare(a, b), Ok(Some(Ordering::Less | Ordering::Equal)))
}

/// A point, or a period with `start`/`end`, that touches the range
fn in_date_range(value: &Value, range: &Interval) -> bool {
    let (start, end) = match value {
        Value::Null => return false,
        Value::Tuple(t) if t.contains_key("start") || t.contains_key("end") => (
            t.get("start").cloned().unwrap_or_default(),
            t.get("end").cloned().unwrap_or_default(),
        ),
        Value::Interval(i) => ((*i.low).clone(), (*i.high).clone()),
        point => (point.clone(), point.clone()),
    };
    let starts_in_time = range.high.is_null() || start.is_null() || at_or_before(&start, &range.high);
    let ends_in_time = range.low.is_null() || end.is_null() || at_or_before(&range.low, &end);
    starts_in_time && ends_in_time
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminology::InMemoryTerminology;
    use medql_types::DateTime;
    use serde_json::json;

    fn bundle() -> serde_json::Value {
        json!({
            "resourceType": "Bundle",
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "p1", "birthDate": "1980-05-01" } },
                { "resource": {
                    "resourceType": "Condition", "id": "c1",
                    "subject": { "reference": "Patient/p1" },
                    "code": { "coding": [{ "system": "http://snomed.info/sct", "code": "44054006" }] },
                    "onsetDateTime": "2023-04-01"
                } },
                { "resource": {
                    "resourceType": "Condition", "id": "c2",
                    "subject": { "reference": "Patient/p2" },
                    "code": { "coding": [{ "system": "http://snomed.info/sct", "code": "44054006" }] }
                } },
                { "resource": {
                    "resourceType": "Encounter", "id": "e1",
                    "subject": { "reference": "Patient/p1" },
                    "period": { "start": "2024-02-01T10:00:00Z", "end": "2024-02-03T10:00:00Z" }
                } }
            ]
        })
    }

    #[test]
    fn test_bundle_loading() {
        let source = InMemoryDataSource::from_json(&bundle());
        assert_eq!(source.len(), 4);
        assert!(source.first_of_type("Patient").is_some());
    }

    #[test]
    fn test_compartment_filter() {
        let source = InMemoryDataSource::from_json(&bundle());
        let patient = source.first_of_type("Patient").cloned().unwrap_or_default();
        let request = RetrieveRequest::new("Condition").with_subject("Patient", patient);
        let conditions = source.retrieve(&request).unwrap_or_default();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].get("id").and_then(Value::as_str), Some("c1"));
    }

    #[test]
    fn test_valueset_filter_uses_terminology() {
        let terminology = InMemoryTerminology::new()
            .with_valueset("http://example.org/vs/diabetes", [Code::new("44054006", "http://snomed.info/sct")]);
        let source = InMemoryDataSource::from_json(&bundle()).with_terminology(Arc::new(terminology));
        let request = RetrieveRequest::new("Condition").with_valueset("http://example.org/vs/diabetes");
        assert_eq!(source.retrieve(&request).map(|r| r.len()), Ok(2));

        let unknown = RetrieveRequest::new("Condition").with_valueset("http://example.org/vs/unknown");
        assert!(matches!(source.retrieve(&unknown), Err(DataSourceError::UnknownValueSet(_))));
    }

    #[test]
    fn test_expanded_codes_need_no_terminology() {
        let source = InMemoryDataSource::from_json(&bundle());
        let request = RetrieveRequest::new("Condition")
            .with_codes(vec![Code::new("44054006", "http://snomed.info/sct")])
            .with_valueset("http://example.org/vs/diabetes");
        assert_eq!(source.retrieve(&request).map(|r| r.len()), Ok(2));
    }

    #[test]
    fn test_date_range_on_period() {
        let source = InMemoryDataSource::from_json(&bundle());
        let mut request = RetrieveRequest::new("Encounter");
        request.date_path = Some("period".into());
        let range = |low: &str, high: &str| {
            Interval::closed(
                DateTime::parse(low).map(Value::DateTime).unwrap_or_default(),
                DateTime::parse(high).map(Value::DateTime).unwrap_or_default(),
            )
        };
        request.date_range = Some(range("2024-01-01T00:00:00Z", "2024-12-31T00:00:00Z"));
        assert_eq!(source.retrieve(&request).map(|r| r.len()), Ok(1));
        request.date_range = Some(range("2023-01-01T00:00:00Z", "2023-12-31T00:00:00Z"));
        assert_eq!(source.retrieve(&request).map(|r| r.len()), Ok(0));
    }

    #[test]
    fn test_resolve_reference() {
        let source = InMemoryDataSource::from_json(&bundle());
        let resolved = source.resolve_reference("Patient/p1").ok().flatten();
        assert_eq!(resolved.and_then(|p| p.get("id").cloned()), Some(Value::string("p1")));
        assert_eq!(source.resolve_reference("Patient/none"), Ok(None));
    }

    #[test]
    fn test_path_value_flattens() {
        let source = InMemoryDataSource::from_json(&bundle());
        let condition = source.first_of_type("Condition").cloned().unwrap_or_default();
        let codes = path_value(&condition, "code.coding.code");
        assert_eq!(codes, Value::string("44054006"));
    }
}
