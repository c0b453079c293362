//! Clinical evaluation: retrieves, terminology membership and ages
//!
//! Covers:
//! - Retrieve by type, restricted to the context subject
//! - Retrieve filtered by value set and by explicit codes
//! - `in` with value sets and code systems, `InValueSet`
//! - Unknown value sets
//! - Expanded value set requests keep the value set URL
//! - AgeInYears relative to the evaluation clock

use medql_eval::{
    CompiledLibrary, DataSource, DataSourceError, Engine, EvalError, EvaluationContext, InMemoryDataSource,
    InMemoryTerminology, RetrieveRequest,
};
use medql_types::{Code, DateTime, Value};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};

const DIABETES: &str = "http://example.org/vs/diabetes";
const SNOMED: &str = "http://snomed.info/sct";

const LIBRARY: &str = r#"library Clinical
using FHIR version '4.0.1'

codesystem "SNOMED": 'http://snomed.info/sct'
valueset "Diabetes": 'http://example.org/vs/diabetes'
valueset "Unknown": 'http://example.org/vs/unknown'
code "Type 2": '44054006' from "SNOMED"

context Patient

define Conditions: [Condition]
define Diabetic: [Condition: "Diabetes"]
define ByCode: [Condition: code ~ "Type 2"]
define HasDiabetes: exists ([Condition] C where C.code in "Diabetes")
define ViaFunction: exists ([Condition] C where InValueSet(C.code, "Diabetes"))
define InSnomed: "Type 2" in "SNOMED"
define BadValueSet: [Condition] C where C.code in "Unknown"
define Age: AgeInYears()
define AgeAt: AgeInYearsAt(@2000-01-01)
define Adult: AgeInYears() >= 18
"#;

fn terminology() -> Arc<InMemoryTerminology> {
    Arc::new(InMemoryTerminology::new().with_valueset(
        DIABETES,
        [Code::new("44054006", SNOMED), Code::new("46635009", SNOMED)],
    ))
}

fn patient() -> Value {
    Value::from_json(&json!({
        "resourceType": "Patient",
        "id": "p1",
        "birthDate": "1980-06-15"
    }))
}

fn data() -> InMemoryDataSource {
    let condition = |id: &str, subject: &str, code: &str| {
        json!({
            "resource": {
                "resourceType": "Condition",
                "id": id,
                "subject": { "reference": subject },
                "code": { "coding": [{ "system": SNOMED, "code": code }] }
            }
        })
    };
    InMemoryDataSource::from_json(&json!({
        "resourceType": "Bundle",
        "entry": [
            condition("c1", "Patient/p1", "44054006"),
            condition("c2", "Patient/p1", "195967001"),
            condition("c3", "Patient/p2", "44054006")
        ]
    }))
}

fn context() -> EvaluationContext {
    let now = DateTime::parse("2024-03-01T12:00:00Z").unwrap_or_else(|| panic!("valid datetime"));
    EvaluationContext::builder()
        .subject(patient())
        .context_name("Patient")
        .now(now)
        .data_source(Arc::new(data()))
        .terminology(terminology())
        .build()
}

fn evaluate(name: &str) -> Result<Value, EvalError> {
    let library = Arc::new(CompiledLibrary::parse(LIBRARY).unwrap_or_else(|e| panic!("{e}")));
    Engine::new().evaluate_definition(&library, name, &mut context())
}

fn ids(value: &Value) -> Vec<String> {
    value
        .as_list()
        .unwrap_or_default()
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[test]
fn test_retrieve_is_limited_to_the_subject() {
    let conditions = evaluate("Conditions").unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(ids(&conditions), vec!["c1", "c2"]);
}

#[test]
fn test_retrieve_by_valueset() {
    let diabetic = evaluate("Diabetic").unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(ids(&diabetic), vec!["c1"]);
}

#[test]
fn test_retrieve_by_code() {
    let matched = evaluate("ByCode").unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(ids(&matched), vec!["c1"]);
}

#[test]
fn test_valueset_membership() {
    assert_eq!(evaluate("HasDiabetes").ok(), Some(Value::Boolean(true)));
    assert_eq!(evaluate("ViaFunction").ok(), Some(Value::Boolean(true)));
}

#[test]
fn test_code_system_membership() {
    assert_eq!(evaluate("InSnomed").ok(), Some(Value::Boolean(true)));
}

#[test]
fn test_unknown_valueset_is_an_error() {
    let err = evaluate("BadValueSet").err();
    let unknown = match err {
        Some(EvalError::InDefinition { source, .. }) => {
            matches!(*source, EvalError::DataSource(DataSourceError::UnknownValueSet(_)))
        }
        _ => false,
    };
    assert!(unknown);
}

/// Keeps every request it is asked to serve
#[derive(Default)]
struct RecordingSource {
    requests: Mutex<Vec<RetrieveRequest>>,
}

impl DataSource for RecordingSource {
    fn retrieve(&self, request: &RetrieveRequest) -> Result<Vec<Value>, DataSourceError> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).push(request.clone());
        Ok(Vec::new())
    }
}

#[test]
fn test_expanded_valueset_request_keeps_the_url() {
    let library = Arc::new(CompiledLibrary::parse(LIBRARY).unwrap_or_else(|e| panic!("{e}")));
    let source = Arc::new(RecordingSource::default());
    let mut ctx = EvaluationContext::builder()
        .subject(patient())
        .context_name("Patient")
        .data_source(source.clone())
        .terminology(terminology())
        .build();
    Engine::new()
        .evaluate_definition(&library, "Diabetic", &mut ctx)
        .unwrap_or_else(|e| panic!("{e}"));

    let requests = source.requests.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].valueset.as_deref(), Some(DIABETES));
    assert_eq!(
        requests[0].codes,
        Some(vec![Code::new("44054006", SNOMED), Code::new("46635009", SNOMED)])
    );
}

#[test]
fn test_ages() {
    assert_eq!(evaluate("Age").ok(), Some(Value::Integer(43)));
    assert_eq!(evaluate("AgeAt").ok(), Some(Value::Integer(19)));
    assert_eq!(evaluate("Adult").ok(), Some(Value::Boolean(true)));
}

#[test]
fn test_retrieve_without_data_source_is_empty() {
    let library = Arc::new(CompiledLibrary::parse(LIBRARY).unwrap_or_else(|e| panic!("{e}")));
    let mut ctx = EvaluationContext::builder().subject(patient()).context_name("Patient").build();
    let value = Engine::new().evaluate_definition(&library, "Conditions", &mut ctx).ok();
    assert_eq!(value, Some(Value::List(vec![])));
}
