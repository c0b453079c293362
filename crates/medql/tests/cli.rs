//! Command-line workflows on files in a scratch directory
//!
//! Covers:
//! - Running a library per subject, with includes, parameters and value sets
//! - Translating to the interchange format and running the translated file
//! - Validation diagnostics with locations
//! - Path evaluation against a resource file

#![cfg(feature = "cli")]

use medql::Value;
use medql::cli::eval::{self, EvalConfig};
use medql::cli::output::OutputFormat;
use medql::cli::run::{self, RunConfig, SubjectRun};
use medql::cli::translate::{self, TranslateConfig};
use medql::cli::validate::{self, ValidateConfig};
use medql::diagnostics::{MQL0101, SourceLocation};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const SNOMED: &str = "http://snomed.info/sct";

const SCREENING: &str = r#"library Screening version '1.0'
using FHIR version '4.0.1'
include Common version '1.0' called C

parameter Threshold Integer default 1
valueset "Diabetes": 'http://example.org/vs/diabetes'

context Patient

define ConditionCount: Count([Condition])
define Diabetic: exists ([Condition: "Diabetes"])
define Busy: ConditionCount >= Threshold
define Doubled: C.Double(ConditionCount)
"#;

const COMMON: &str = r#"library Common version '1.0'

define function Double(x Integer) returns Integer: x * 2
"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let workspace = Self {
            dir: TempDir::new().unwrap_or_else(|e| panic!("{e}")),
        };
        workspace.write("Screening.cql", SCREENING);
        workspace.write("Common.cql", COMMON);
        workspace.write("data.json", &bundle().to_string());
        workspace.write("diabetes.json", &valueset().to_string());
        workspace
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, content).unwrap_or_else(|e| panic!("{e}"));
        path
    }

    fn run_config(&self, file: &str) -> RunConfig {
        RunConfig {
            file: self.path(file),
            data: Some(self.path("data.json")),
            terminology: vec![self.path("diabetes.json")],
            subject: None,
            params: Vec::new(),
            defines: Vec::new(),
            library_paths: Vec::new(),
            format: OutputFormat::Json,
            output_file: None,
        }
    }
}

fn bundle() -> serde_json::Value {
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
    json!({
        "resourceType": "Bundle",
        "type": "collection",
        "entry": [
            { "resource": { "resourceType": "Patient", "id": "p1", "name": [{ "given": ["Ada"] }] } },
            { "resource": { "resourceType": "Patient", "id": "p2", "name": [{ "given": ["Grace"] }] } },
            condition("c1", "Patient/p1", "44054006"),
            condition("c2", "Patient/p1", "195967001")
        ]
    })
}

fn valueset() -> serde_json::Value {
    json!({
        "resourceType": "ValueSet",
        "url": "http://example.org/vs/diabetes",
        "expansion": { "contains": [{ "system": SNOMED, "code": "44054006" }] }
    })
}

fn values(run: &SubjectRun) -> Vec<(String, Option<Value>)> {
    run.results
        .iter()
        .map(|(name, result)| (name.clone(), result.as_ref().ok().cloned()))
        .collect()
}

fn expected(count: i32, diabetic: bool, busy: bool) -> Vec<(String, Option<Value>)> {
    vec![
        ("ConditionCount".to_string(), Some(Value::Integer(count))),
        ("Diabetic".to_string(), Some(Value::Boolean(diabetic))),
        ("Busy".to_string(), Some(Value::Boolean(busy))),
        ("Doubled".to_string(), Some(Value::Integer(count * 2))),
    ]
}

fn evaluate(config: &RunConfig) -> Vec<SubjectRun> {
    run::evaluate(config).unwrap_or_else(|e| panic!("{e:#}"))
}

#[test]
fn test_run_evaluates_each_patient() {
    let workspace = Workspace::new();
    let runs = evaluate(&workspace.run_config("Screening.cql"));

    let subjects: Vec<Option<String>> = runs.iter().map(|r| r.subject.clone()).collect();
    assert_eq!(subjects, vec![Some("Patient/p1".to_string()), Some("Patient/p2".to_string())]);
    assert_eq!(values(&runs[0]), expected(2, true, true));
    assert_eq!(values(&runs[1]), expected(0, false, false));
}

#[test]
fn test_run_with_parameter_and_subject_filter() {
    let workspace = Workspace::new();
    let mut config = workspace.run_config("Screening.cql");
    config.params = vec!["Threshold=3".to_string()];
    config.subject = Some("p1".to_string());

    let runs = evaluate(&config);
    assert_eq!(runs.len(), 1);
    assert_eq!(values(&runs[0]), expected(2, true, false));
}

#[test]
fn test_run_selected_definitions() {
    let workspace = Workspace::new();
    let mut config = workspace.run_config("Screening.cql");
    config.defines = vec!["Doubled".to_string()];

    let runs = evaluate(&config);
    let names: Vec<&String> = runs[0].results.keys().collect();
    assert_eq!(names, vec!["Doubled"]);
}

#[test]
fn test_run_rejects_unknown_subject_and_definition() {
    let workspace = Workspace::new();

    let mut config = workspace.run_config("Screening.cql");
    config.subject = Some("p9".to_string());
    let err = run::evaluate(&config).err().map(|e| e.to_string()).unwrap_or_default();
    assert!(err.contains("p9"), "{err}");

    let mut config = workspace.run_config("Screening.cql");
    config.defines = vec!["Nope".to_string()];
    assert!(run::evaluate(&config).is_err());
}

#[test]
fn test_missing_terminology_is_reported_per_definition() {
    let workspace = Workspace::new();
    let mut config = workspace.run_config("Screening.cql");
    config.terminology.clear();

    let runs = evaluate(&config);
    assert!(runs[0].results["Diabetic"].is_err());
    assert_eq!(runs[0].results["ConditionCount"].as_ref().ok(), Some(&Value::Integer(2)));
    assert_eq!(runs[0].failures(), 1);
}

#[test]
fn test_run_without_data_evaluates_once() {
    let workspace = Workspace::new();
    let mut config = workspace.run_config("Common.cql");
    config.data = None;

    let runs = evaluate(&config);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].subject, None);
}

#[test]
fn test_translated_library_runs_identically() {
    let workspace = Workspace::new();
    let document = translate::translate_file(&TranslateConfig {
        file: workspace.path("Screening.cql"),
        pretty: true,
        output_file: None,
    })
    .unwrap_or_else(|e| panic!("{e:#}"));
    let parsed: serde_json::Value = serde_json::from_str(&document).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(parsed["library"]["identifier"]["id"], "Screening");
    workspace.write("Screening.json", &document);

    let from_source = evaluate(&workspace.run_config("Screening.cql"));
    let from_json = evaluate(&workspace.run_config("Screening.json"));
    assert_eq!(from_source.len(), from_json.len());
    for (source, json) in from_source.iter().zip(&from_json) {
        assert_eq!(source.subject, json.subject);
        assert_eq!(values(source), values(json));
    }
}

#[test]
fn test_translate_reports_syntax_errors() {
    let workspace = Workspace::new();
    let file = workspace.write("Broken.cql", "library Broken\ndefine X: 1 + * 2\n");
    let err = translate::translate_file(&TranslateConfig {
        file,
        pretty: false,
        output_file: None,
    })
    .err()
    .map(|e| e.to_string())
    .unwrap_or_default();
    assert!(err.contains("Broken.cql:2:"), "{err}");
}

#[test]
fn test_validate_reports_locations_and_missing_includes() {
    let workspace = Workspace::new();
    let broken = workspace.write("Broken.cql", "library Broken\ndefine X: 1 + * 2\n");
    let orphan = workspace.write("Orphan.cql", "library Orphan\ninclude Missing called M\ndefine Y: M.Z\n");

    let reports = validate::validate_files(&ValidateConfig {
        files: vec![workspace.path("Screening.cql"), broken, orphan],
        library_paths: Vec::new(),
    })
    .unwrap_or_else(|e| panic!("{e:#}"));

    assert!(reports[0].is_valid());

    let syntax = &reports[1].diagnostics;
    assert!(!syntax.is_empty());
    let line = syntax[0].location.as_ref().map(|l: &SourceLocation| l.line);
    assert_eq!(line, Some(2));

    let linking = &reports[2].diagnostics;
    assert_eq!(linking.len(), 1);
    assert_eq!(linking[0].code, MQL0101);
    assert!(linking[0].location.is_none());
}

#[test]
fn test_validate_finds_includes_on_search_path() {
    let workspace = Workspace::new();
    let shared = workspace.path("shared");
    fs::create_dir(&shared).unwrap_or_else(|e| panic!("{e}"));
    fs::write(shared.join("Units.cql"), "library Units\ndefine Scale: 10\n").unwrap_or_else(|e| panic!("{e}"));
    let main = workspace.write("Main.cql", "library Main\ninclude Units called U\ndefine Scaled: U.Scale * 2\n");

    let config = |library_paths: Vec<PathBuf>| ValidateConfig {
        files: vec![main.clone()],
        library_paths,
    };
    let without = validate::validate_files(&config(Vec::new())).unwrap_or_else(|e| panic!("{e:#}"));
    assert!(!without[0].is_valid());
    let with = validate::validate_files(&config(vec![shared.clone()])).unwrap_or_else(|e| panic!("{e:#}"));
    assert!(with[0].is_valid());
}

#[test]
fn test_eval_path_against_resource_file() {
    let workspace = Workspace::new();
    let resource = workspace.write(
        "patient.json",
        &json!({
            "resourceType": "Patient",
            "id": "p1",
            "name": [{ "given": ["Ada", "Augusta"] }, { "given": ["Lovelace"] }]
        })
        .to_string(),
    );
    let config = |expression: &str, constants: Vec<String>| EvalConfig {
        expression: expression.to_string(),
        resource: Some(resource.clone()),
        constants,
        format: OutputFormat::Text,
        output_file: None,
    };

    let given = eval::evaluate(&config("name.given", Vec::new())).unwrap_or_else(|e| panic!("{e:#}"));
    assert_eq!(given.to_string(), "{'Ada', 'Augusta', 'Lovelace'}");

    let count = eval::evaluate(&config("name.given.count() > %min", vec!["min=2".to_string()]))
        .unwrap_or_else(|e| panic!("{e:#}"));
    assert_eq!(count, Value::List(vec![Value::Boolean(true)]));
}

#[test]
fn test_eval_reports_parse_errors() {
    let config = EvalConfig {
        expression: "name.".to_string(),
        resource: None,
        constants: Vec::new(),
        format: OutputFormat::Json,
        output_file: None,
    };
    assert!(eval::evaluate(&config).is_err());
}

#[test]
fn test_output_file_is_written() {
    let workspace = Workspace::new();
    let target = workspace.path("out.json");
    translate::translate(TranslateConfig {
        file: workspace.path("Common.cql"),
        pretty: false,
        output_file: Some(target.clone()),
    })
    .unwrap_or_else(|e| panic!("{e:#}"));
    let written = fs::read_to_string(&target).unwrap_or_else(|e| panic!("{e}"));
    assert!(written.contains("\"Double\""));
}
