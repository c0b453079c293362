//! Library evaluation
//!
//! Covers:
//! - Definition caching and cache statistics
//! - Parameters: caller values, defaults, declared-type coercion
//! - User-defined and fluent functions, overloads, recursion limit
//! - Includes: qualified definitions, functions and terminology
//! - External functions served by plugins
//! - Per-definition errors from evaluate_all

use medql_eval::{
    CompiledLibrary, Engine, EngineConfig, EvalError, EvaluationContext, FunctionDefinition, FunctionParameter,
    InMemoryLibrarySource, LibraryManager,
};
use medql_types::{Value, ValueType};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn compile(source: &str) -> Arc<CompiledLibrary> {
    Arc::new(CompiledLibrary::parse(source).unwrap_or_else(|e| panic!("{e}")))
}

fn define(engine: &Engine, library: &Arc<CompiledLibrary>, name: &str, ctx: &mut EvaluationContext) -> Value {
    engine
        .evaluate_definition(library, name, ctx)
        .unwrap_or_else(|e| panic!("{name}: {e}"))
}

// === Definitions ===

#[test]
fn test_definitions_are_cached() {
    let library = compile(
        r#"library Test
define "Sum": 1 + 2 + 3
define "Double": "Sum" * 2
"#,
    );
    let engine = Engine::new();
    let mut ctx = EvaluationContext::new();
    assert_eq!(define(&engine, &library, "Sum", &mut ctx), Value::Integer(6));
    assert_eq!(define(&engine, &library, "Double", &mut ctx), Value::Integer(12));

    let stats = ctx.definition_cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
}

#[test]
fn test_unknown_definition() {
    let library = compile("library Test\ndefine A: 1\n");
    let err = Engine::new()
        .evaluate_definition(&library, "B", &mut EvaluationContext::new())
        .err();
    assert!(matches!(err, Some(EvalError::UndefinedReference { .. })));
}

#[test]
fn test_circular_definitions_fail() {
    let library = compile("library Test\ndefine A: B + 1\ndefine B: A + 1\n");
    let err = Engine::new()
        .evaluate_definition(&library, "A", &mut EvaluationContext::new())
        .err();
    let root = err.map(|e| e.to_string()).unwrap_or_default();
    assert!(root.contains("Circular"), "unexpected error: {root}");
}

#[test]
fn test_evaluate_all_reports_errors_per_definition() {
    let library = compile(
        r#"library Test
define Good: 1 + 1
define Bad: singleton from {1, 2}
define private Hidden: 3
define AlsoGood: Good * 10
"#,
    );
    let results = Engine::new().evaluate_all(&library, &mut EvaluationContext::new());
    let names: Vec<&str> = results.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["Good", "Bad", "AlsoGood"]);
    assert_eq!(results["Good"].as_ref().ok(), Some(&Value::Integer(2)));
    assert_eq!(results["AlsoGood"].as_ref().ok(), Some(&Value::Integer(20)));

    let bad = results["Bad"].as_ref().err();
    assert_eq!(bad.and_then(EvalError::definition), Some("Bad"));
}

// === Parameters ===

#[test]
fn test_parameter_default_and_override() {
    let library = compile(
        r#"library Test
parameter Threshold Integer default 10
parameter Unset Integer
define Check: Threshold * 2
define Missing: Unset
"#,
    );
    let engine = Engine::new();
    let mut ctx = EvaluationContext::new();
    assert_eq!(define(&engine, &library, "Check", &mut ctx), Value::Integer(20));
    assert_eq!(define(&engine, &library, "Missing", &mut ctx), Value::Null);

    let mut ctx = EvaluationContext::builder().parameter("Threshold", Value::Integer(4)).build();
    assert_eq!(define(&engine, &library, "Check", &mut ctx), Value::Integer(8));
}

#[test]
fn test_parameter_is_coerced_to_declared_type() {
    let library = compile("library Test\nparameter Rate Decimal\ndefine R: Rate\n");
    let mut ctx = EvaluationContext::builder().parameter("Rate", Value::Integer(2)).build();
    let value = define(&Engine::new(), &library, "R", &mut ctx);
    assert!(matches!(value, Value::Decimal(_)));
}

// === Functions ===

#[test]
fn test_user_functions() {
    let library = compile(
        r#"library Test
define function Double(x Integer) returns Integer: x * 2
define function Describe(x Integer): 'int'
define function Describe(x String): 'string'
define fluent function plusOne(x Integer): x + 1
define UseDouble: Double(21)
define UseOverloadInt: Describe(1)
define UseOverloadString: Describe('a')
define UseFluent: (4).plusOne()
"#,
    );
    let engine = Engine::new();
    let mut ctx = EvaluationContext::new();
    assert_eq!(define(&engine, &library, "UseDouble", &mut ctx), Value::Integer(42));
    assert_eq!(define(&engine, &library, "UseOverloadInt", &mut ctx), Value::string("int"));
    assert_eq!(define(&engine, &library, "UseOverloadString", &mut ctx), Value::string("string"));
    assert_eq!(define(&engine, &library, "UseFluent", &mut ctx), Value::Integer(5));
}

#[test]
fn test_function_operands_do_not_leak_into_callers() {
    let library = compile(
        r#"library Test
define function Inner(): x
define function Outer(x Integer): Inner()
define Call: Outer(1)
"#,
    );
    let err = Engine::new()
        .evaluate_definition(&library, "Call", &mut EvaluationContext::new())
        .err();
    assert!(err.is_some());
}

#[test]
fn test_recursion_limit() {
    let library = compile(
        r#"library Test
define function Forever(n Integer): Forever(n + 1)
define Loop: Forever(0)
"#,
    );
    let engine = Engine::with_config(EngineConfig {
        max_call_depth: 32,
        ..EngineConfig::default()
    });
    let err = engine
        .evaluate_definition(&library, "Loop", &mut EvaluationContext::new())
        .err();
    let limited = match err {
        Some(EvalError::InDefinition { source, .. }) => matches!(*source, EvalError::RecursionLimit { limit: 32, .. }),
        _ => false,
    };
    assert!(limited);
}

#[test]
fn test_default_limits_fit_a_default_thread_stack() {
    let handle = std::thread::spawn(|| {
        let terms = vec!["1"; 600].join(" + ");
        let library = compile(&format!(
            r#"library Test
define function Runaway(n Integer) returns Integer: Runaway(n + 1)
define Calls: Runaway(0)
define Chain: {terms}
"#
        ));
        let engine = Engine::new();
        let mut ctx = EvaluationContext::new();
        ["Calls", "Chain"].map(|name| match engine.evaluate_definition(&library, name, &mut ctx).err() {
            Some(EvalError::InDefinition { source, .. }) => match *source {
                EvalError::RecursionLimit { what, .. } => Some(what),
                _ => None,
            },
            _ => None,
        })
    });
    let limits = handle.join().unwrap_or_else(|_| panic!("evaluation overflowed the thread stack"));
    assert_eq!(limits, [Some("function calls"), Some("expression nesting")]);
}

#[test]
fn test_recursive_function_within_limit() {
    let library = compile(
        r#"library Test
define function Factorial(n Integer): if n <= 1 then 1 else n * Factorial(n - 1)
define F: Factorial(5)
"#,
    );
    let mut ctx = EvaluationContext::new();
    assert_eq!(define(&Engine::new(), &library, "F", &mut ctx), Value::Integer(120));
}

#[test]
fn test_external_function_uses_plugin() {
    let library = compile(
        r#"library Test
define function Shout(s String) returns String: external
define Loud: Shout('hi')
define Direct: Reverse('abc')
"#,
    );
    let mut engine = Engine::new();
    engine.plugins_mut().register(
        FunctionDefinition::new(
            "Shout",
            vec![FunctionParameter::required("s", ValueType::String)],
            |args: &[Value]| Ok(args[0].as_str().map_or(Value::Null, |s| Value::string(s.to_uppercase()))),
        )
        .returns(ValueType::String),
    );
    engine.plugins_mut().register(FunctionDefinition::new(
        "Reverse",
        vec![FunctionParameter::required("s", ValueType::String)],
        |args: &[Value]| Ok(args[0].as_str().map_or(Value::Null, |s| Value::string(s.chars().rev().collect::<String>()))),
    ));

    let mut ctx = EvaluationContext::new();
    assert_eq!(define(&engine, &library, "Loud", &mut ctx), Value::string("HI"));
    assert_eq!(define(&engine, &library, "Direct", &mut ctx), Value::string("cba"));
}

#[test]
fn test_plugin_argument_type_is_checked() {
    let mut engine = Engine::new();
    engine.plugins_mut().register(FunctionDefinition::new(
        "Twice",
        vec![FunctionParameter::required("n", ValueType::Integer)],
        |args: &[Value]| Ok(Value::Integer(args[0].as_i64().unwrap_or(0) as i32 * 2)),
    ));
    let mut ctx = EvaluationContext::new();
    assert_eq!(engine.evaluate_source("Twice(4)", &mut ctx).ok(), Some(Value::Integer(8)));
    assert!(matches!(
        engine.evaluate_source("Twice('x')", &mut ctx),
        Err(EvalError::Plugin { .. })
    ));
}

// === Includes ===

const COMMON: &str = r#"library Common version '1.0'
codesystem "LOINC": 'http://loinc.org'
code "Glucose": '2345-7' from "LOINC" display 'Glucose'
define Base: 100
define private Secret: 1
define function Half(x Integer): x / 2
"#;

fn manager() -> LibraryManager {
    LibraryManager::new(InMemoryLibrarySource::new().with_library("Common", Some("1.0"), COMMON))
}

#[test]
fn test_included_definitions_and_functions() {
    let library = manager()
        .compile_source(
            r#"library Main
include Common version '1.0' called C
define UsesBase: C.Base + 1
define UsesFunction: C.Half(10)
define UsesCode: C."Glucose".code
"#,
        )
        .unwrap_or_else(|e| panic!("{e}"));
    let engine = Engine::new();
    let mut ctx = EvaluationContext::new();
    assert_eq!(define(&engine, &library, "UsesBase", &mut ctx), Value::Integer(101));
    assert!(matches!(define(&engine, &library, "UsesFunction", &mut ctx), Value::Decimal(_)));
    assert_eq!(define(&engine, &library, "UsesCode", &mut ctx), Value::string("2345-7"));
}

#[test]
fn test_private_definitions_are_not_visible_through_includes() {
    let library = manager()
        .compile_source("library Main\ninclude Common version '1.0' called C\ndefine Peek: C.Secret\n")
        .unwrap_or_else(|e| panic!("{e}"));
    let err = Engine::new()
        .evaluate_definition(&library, "Peek", &mut EvaluationContext::new())
        .err();
    assert!(err.is_some());
}

#[test]
fn test_code_declarations() {
    let library = compile(
        r#"library Test
codesystem "SNOMED": 'http://snomed.info/sct' version '2024'
code "Fever": '386661006' from "SNOMED" display 'Fever'
concept "Febrile": { "Fever" } display 'Febrile'
define C: "Fever"
define K: "Febrile"
"#,
    );
    let engine = Engine::new();
    let mut ctx = EvaluationContext::new();
    match define(&engine, &library, "C", &mut ctx) {
        Value::Code(code) => {
            assert_eq!(code.code, "386661006");
            assert_eq!(code.system.as_deref(), Some("http://snomed.info/sct"));
            assert_eq!(code.version.as_deref(), Some("2024"));
        }
        other => panic!("expected a code, got {other:?}"),
    }
    match define(&engine, &library, "K", &mut ctx) {
        Value::Concept(concept) => assert_eq!(concept.codes.len(), 1),
        other => panic!("expected a concept, got {other:?}"),
    }
}
