//! Interchange printing and loading
//!
//! Covers:
//! - Print, load, print again yields the same document
//! - Node shapes for declarations, queries and retrieves
//! - Validation errors name the failing JSON path

use medql_ast::Library;
use medql_diagnostics::{MQL0402, MQL0403, MQL0404, MedqlError};
use medql_elm::{expression_from_json, expression_to_json, library_from_json, library_to_json};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};

const LIBRARY: &str = r#"library Screening version '2.1'
using FHIR version '4.0.1'
include Common version '1.0' called C

parameter "Measurement Period" Interval<DateTime> default Interval[@2024-01-01T00:00:00, @2025-01-01T00:00:00)
parameter Threshold Integer default 10

codesystem "SNOMED": 'http://snomed.info/sct'
valueset "Diabetes": 'http://example.org/vs/diabetes'
code "Type 2": '44054006' from "SNOMED" display 'Type 2 diabetes'
concept "Diabetic": { "Type 2" } display 'Diabetic'

context Patient

define Conditions: [Condition: "Diabetes"]
define ByCode: [Condition: code ~ "Type 2"]
define Recent:
  from [Encounter] E, [Condition] C
    where E.status = 'finished'
    return Tuple { encounter: E.id, condition: C.id }
define Sorted: ({3, 1, 2}) X where X > 1 return distinct X * 2 sort desc
define Total: ({1, 2, 3}) X aggregate A starting 0: A + X
define private Choice: case when Threshold > 5 then 'high' else 'low' end
define Timing: @2024-03-01 same month as @2024-03-15
define Age: years between @2000-06-15 and @2024-06-14
define Casts: '5' as Integer
define function Double(x Integer) returns Integer: x * 2
define fluent function Bump(x Integer): x + 1
define function Shout(s String) returns String: external
"#;

fn parse(source: &str) -> Library {
    medql_parser::parse_library(source).unwrap_or_else(|e| panic!("{e:?}"))
}

fn print(library: &Library) -> Value {
    library_to_json(library).unwrap_or_else(|e| panic!("{e}"))
}

fn statement<'a>(document: &'a Value, name: &str) -> &'a Value {
    document["library"]["statements"]
        .as_array()
        .and_then(|s| s.iter().find(|s| s["name"] == name))
        .unwrap_or_else(|| panic!("no statement {name}"))
}

#[test]
fn test_library_survives_print_load_print() {
    let first = print(&parse(LIBRARY));
    let loaded = library_from_json(&first).unwrap_or_else(|e| panic!("{e}"));
    let second = print(&loaded);
    assert_eq!(first, second);
}

#[test]
fn test_bare_library_object_is_accepted() {
    let document = print(&parse(LIBRARY));
    let loaded = library_from_json(&document["library"]).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(loaded.name(), Some("Screening"));
    assert_eq!(loaded.statements.len(), 12);
}

#[test]
fn test_declaration_shapes() {
    let document = print(&parse(LIBRARY));
    let library = &document["library"];
    assert_eq!(library["identifier"], json!({ "id": "Screening", "version": "2.1" }));
    assert_eq!(
        library["includes"],
        json!([{ "path": "Common", "version": "1.0", "localIdentifier": "C" }])
    );
    assert_eq!(
        library["codes"],
        json!([{
            "name": "Type 2",
            "id": "44054006",
            "codeSystem": "SNOMED",
            "display": "Type 2 diabetes"
        }])
    );
    assert_eq!(statement(&document, "Choice")["accessLevel"], "Private");
    assert_eq!(statement(&document, "Bump")["fluent"], true);

    let shout = statement(&document, "Shout");
    assert_eq!(shout["type"], "FunctionDef");
    assert_eq!(shout["external"], true);
    assert!(shout.get("expression").is_none());
}

#[test]
fn test_retrieve_nodes() {
    let document = print(&parse(LIBRARY));
    assert_eq!(
        statement(&document, "Conditions")["expression"],
        json!({
            "type": "Retrieve",
            "dataType": "Condition",
            "codes": { "type": "IdentifierRef", "name": "Diabetes", "quoted": true }
        })
    );
    let by_code = &statement(&document, "ByCode")["expression"];
    assert_eq!(by_code["codeProperty"], "code");
    assert_eq!(by_code["codeComparator"], "~");
}

#[test]
fn test_query_nodes() {
    let document = print(&parse(LIBRARY));
    let recent = &statement(&document, "Recent")["expression"];
    assert_eq!(recent["type"], "Query");
    let aliases: Vec<&str> = recent["source"]
        .as_array()
        .map(|s| s.iter().filter_map(|s| s["alias"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(aliases, vec!["E", "C"]);
    assert_eq!(recent["where"]["type"], "Equal");

    let sorted = &statement(&document, "Sorted")["expression"];
    assert_eq!(sorted["return"]["distinct"], true);
    assert_eq!(sorted["sort"]["by"][0]["direction"], "desc");

    let total = &statement(&document, "Total")["expression"];
    assert_eq!(total["aggregate"]["identifier"], "A");
}

#[test]
fn test_timing_and_duration_nodes() {
    let document = print(&parse(LIBRARY));
    let timing = &statement(&document, "Timing")["expression"];
    assert_eq!(timing["type"], "SameAs");
    assert_eq!(timing["precision"], "month");

    let age = &statement(&document, "Age")["expression"];
    assert_eq!(age["type"], "DurationBetween");
    assert_eq!(age["precision"], "year");
}

#[rstest]
#[case("1 + 2 * 3")]
#[case("'a' & null")]
#[case("Interval[1, 10) contains 5")]
#[case("5 'mg' + 10 'mg'")]
#[case("@2024-03-09T07:05:00.000+02:00")]
#[case("@T14:30")]
#[case("1 'mg':10 'mL'")]
#[case("name.given.first()")]
#[case("Code { code: '1', system: 'x' }")]
#[case("if true then 1 else 2")]
#[case("convert '5' to Integer")]
#[case("singleton from {1}")]
#[case("year from @2024-01-01")]
#[case("X between 1 and 5")]
fn test_expression_survives_print_load(#[case] source: &str) {
    let parsed = medql_parser::parse_expression(source).unwrap_or_else(|e| panic!("{source}: {e:?}"));
    let printed = expression_to_json(&parsed);
    let loaded = expression_from_json(&printed).unwrap_or_else(|e| panic!("{source}: {e}"));
    // spans are not part of the format, so compare printed forms
    assert_eq!(expression_to_json(&loaded), printed);
}

fn interchange_error(result: Result<Library, MedqlError>) -> (u16, String) {
    match result {
        Err(MedqlError::Interchange { code, path, .. }) => (code.code(), path),
        other => panic!("expected an interchange error, got {other:?}"),
    }
}

#[test]
fn test_missing_statement_expression() {
    let document = json!({
        "library": {
            "identifier": { "id": "Broken" },
            "statements": [
                { "type": "ExpressionDef", "name": "Fine", "expression": { "type": "Null" } },
                {
                    "type": "ExpressionDef",
                    "name": "Bad",
                    "expression": { "type": "If", "condition": { "type": "Null" }, "then": { "type": "Null" } }
                }
            ]
        }
    });
    let (code, path) = interchange_error(library_from_json(&document));
    assert_eq!(code, MQL0403.code());
    assert_eq!(path, "library.statements[1].expression");
}

#[test]
fn test_unknown_statement_type() {
    let document = json!({ "library": { "statements": [{ "type": "MacroDef", "name": "X" }] } });
    let (code, _) = interchange_error(library_from_json(&document));
    assert_eq!(code, MQL0404.code());
}

#[test]
fn test_function_without_body_must_be_external() {
    let document = json!({
        "library": {
            "statements": [{ "type": "FunctionDef", "name": "F", "operand": [] }]
        }
    });
    let (code, path) = interchange_error(library_from_json(&document));
    assert_eq!(code, MQL0403.code());
    assert_eq!(path, "library.statements[0]");
}

#[test]
fn test_wrong_field_type() {
    let value = json!({ "type": "Interval", "low": { "type": "Null" }, "high": { "type": "Null" }, "lowClosed": "yes", "highClosed": true });
    match expression_from_json(&value) {
        Err(MedqlError::Interchange { code, path, .. }) => {
            assert_eq!(code, MQL0402);
            assert_eq!(path, "$.lowClosed");
        }
        other => panic!("expected an interchange error, got {other:?}"),
    }
}
