//! Path expressions against resources
//!
//! Covers:
//! - Navigation through nested lists with flattening
//! - Filtering and projection functions with `$this` and `$index`
//! - Choice-typed elements (`value` finding `valueQuantity`)
//! - Environment constants and `resolve()`
//! - Results are always collections
//! - Equality against an empty collection is empty

use medql_eval::{Engine, EvaluationContext, InMemoryDataSource};
use medql_types::Value;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;

fn patient() -> Value {
    Value::from_json(&json!({
        "resourceType": "Patient",
        "id": "p1",
        "active": true,
        "name": [
            { "use": "official", "family": "Smith", "given": ["Ann", "Marie"] },
            { "use": "nickname", "given": ["Annie"] }
        ],
        "telecom": [
            { "system": "phone", "value": "555-0100" },
            { "system": "email", "value": "ann@example.org" }
        ],
        "generalPractitioner": [{ "reference": "Practitioner/dr1" }],
        "extension": [
            { "url": "http://example.org/ext/eye-color", "valueString": "green" }
        ]
    }))
}

fn eval(path: &str) -> Value {
    Engine::new()
        .evaluate_path(path, &patient())
        .unwrap_or_else(|e| panic!("'{path}' failed: {e}"))
}

fn strings(values: &[&str]) -> Value {
    Value::List(values.iter().map(|s| Value::string(*s)).collect())
}

#[rstest]
#[case("name.given", strings(&["Ann", "Marie", "Annie"]))]
#[case("Patient.name.family", strings(&["Smith"]))]
#[case("name.where(use = 'official').given.first()", strings(&["Ann"]))]
#[case("telecom.where(system = 'email').value", strings(&["ann@example.org"]))]
#[case("name.select(given.first())", strings(&["Ann", "Annie"]))]
#[case("name.given.count()", Value::List(vec![Value::Integer(3)]))]
#[case("name.given.exists($this = 'Marie')", Value::List(vec![Value::Boolean(true)]))]
#[case("name.given.where($index > 0)", strings(&["Marie", "Annie"]))]
#[case("active", Value::List(vec![Value::Boolean(true)]))]
#[case("missing", Value::List(vec![]))]
#[case("name.given.distinct().count() = 3", Value::List(vec![Value::Boolean(true)]))]
#[case("name.given[1]", strings(&["Marie"]))]
#[case("name.family.upper()", strings(&["SMITH"]))]
fn test_navigation(#[case] path: &str, #[case] expected: Value) {
    assert_eq!(eval(path), expected);
}

#[rstest]
#[case("{} = {}")]
#[case("{} != {}")]
#[case("missing = 'x'")]
#[case("missing != 'x'")]
#[case("name.given = {}")]
#[case("{} = name.given")]
fn test_equality_with_an_empty_operand_is_empty(#[case] path: &str) {
    assert_eq!(eval(path), Value::List(vec![]));
}

#[test]
fn test_library_list_equality_keeps_empty_lists_comparable() {
    let result = Engine::new().evaluate_source("{} = {}", &mut EvaluationContext::new());
    assert_eq!(result.ok(), Some(Value::Boolean(true)));
    assert_eq!(eval("name.given.first() = 'Ann'"), Value::List(vec![Value::Boolean(true)]));
}

#[test]
fn test_choice_element() {
    assert_eq!(eval("extension.value"), strings(&["green"]));
    assert_eq!(
        eval("extension('http://example.org/ext/eye-color').value"),
        strings(&["green"])
    );
}

#[test]
fn test_resource_constant() {
    assert_eq!(eval("%resource.id"), strings(&["p1"]));
    assert_eq!(eval("%ucum"), strings(&["http://unitsofmeasure.org"]));
}

#[test]
fn test_all_and_iif() {
    assert_eq!(eval("telecom.all(value.exists())"), Value::List(vec![Value::Boolean(true)]));
    assert_eq!(eval("iif(active, 'yes', 'no')"), strings(&["yes"]));
}

#[test]
fn test_resolve_through_data_source() {
    let practitioner = json!({ "resourceType": "Practitioner", "id": "dr1", "name": [{ "family": "Who" }] });
    let source = InMemoryDataSource::from_json(&practitioner);
    let mut ctx = EvaluationContext::builder().data_source(Arc::new(source)).build();
    let names = Engine::new()
        .evaluate_path_in("generalPractitioner.resolve().name.family", &patient(), &mut ctx)
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(names, strings(&["Who"]));
}

#[test]
fn test_syntax_error_is_reported() {
    assert!(Engine::new().evaluate_path("name.where(", &patient()).is_err());
}
