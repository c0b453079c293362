//! Expression evaluation through the public entry points
//!
//! Covers:
//! - Arithmetic precedence and aggregates
//! - Null propagation and three-valued logic
//! - Interval membership and timing relations
//! - Date comparison at differing precisions
//! - List positional access and cardinality errors
//! - Queries: filtering, projection, duplicates, sorting

use medql_eval::{Engine, EvalError, EvaluationContext};
use medql_types::Value;
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;

fn eval(source: &str) -> Result<Value, EvalError> {
    Engine::new().evaluate_source(source, &mut EvaluationContext::new())
}

fn ok(source: &str) -> Value {
    eval(source).unwrap_or_else(|e| panic!("'{source}' failed: {e}"))
}

fn ints(values: &[i32]) -> Value {
    Value::List(values.iter().map(|i| Value::Integer(*i)).collect())
}

// === Arithmetic ===

#[rstest]
#[case("1 + 2 * 3", Value::Integer(7))]
#[case("Sum({1, 2, 3, 4, 5})", Value::Integer(15))]
#[case("7 div 2", Value::Integer(3))]
#[case("7 mod 2", Value::Integer(1))]
#[case("2 ^ 10", Value::Integer(1024))]
#[case("Count({1, null, 3})", Value::Integer(2))]
#[case("Abs(-4)", Value::Integer(4))]
fn test_arithmetic(#[case] source: &str, #[case] expected: Value) {
    assert_eq!(ok(source), expected);
}

#[test]
fn test_decimal_division() {
    assert_eq!(ok("1 / 4"), Value::Decimal(Decimal::new(25, 2)));
    assert_eq!(ok("1 / 0"), Value::Null);
}

#[test]
fn test_quantity_arithmetic() {
    assert_eq!(ok("5 'mg' + 10 'mg'"), Value::quantity(Decimal::from(15), "mg"));
}

// === Nulls and logic ===

#[rstest]
#[case("null + 1")]
#[case("null = 1")]
#[case("null and true")]
#[case("null < 3")]
#[case("'a' & null = null")]
fn test_null_propagation(#[case] source: &str) {
    assert_eq!(ok(source), Value::Null);
}

#[rstest]
#[case("null and false", Value::Boolean(false))]
#[case("null or true", Value::Boolean(true))]
#[case("false implies null", Value::Boolean(true))]
#[case("true xor false", Value::Boolean(true))]
#[case("not null", Value::Null)]
#[case("Coalesce(null, null, 3)", Value::Integer(3))]
fn test_three_valued_logic(#[case] source: &str, #[case] expected: Value) {
    assert_eq!(ok(source), expected);
}

#[test]
fn test_equivalence_treats_nulls_as_equal() {
    assert_eq!(ok("null ~ null"), Value::Boolean(true));
    assert_eq!(ok("'Abc' ~ 'abc'"), Value::Boolean(true));
}

// === Intervals ===

#[rstest]
#[case("5 in Interval[1, 10]", true)]
#[case("10 in Interval[1, 10)", false)]
#[case("Interval[1, 5] overlaps Interval[4, 8]", true)]
#[case("Interval[1, 3] before Interval[4, 8]", true)]
#[case("Interval[1, 3] meets Interval[4, 8]", true)]
#[case("Interval[1, 10] includes Interval[2, 3]", true)]
fn test_interval_relations(#[case] source: &str, #[case] expected: bool) {
    assert_eq!(ok(source), Value::Boolean(expected));
}

#[test]
fn test_interval_with_reversed_bounds_fails() {
    assert!(eval("Interval[10, 1]").is_err());
}

// === Dates ===

#[test]
fn test_date_precision_comparison() {
    assert_eq!(ok("@2023 = @2024-01"), Value::Boolean(false));
    assert_eq!(ok("@2024 = @2024-01"), Value::Null);
    assert_eq!(ok("@2024-01-01 < @2024-01-02"), Value::Boolean(true));
}

#[test]
fn test_duration_between() {
    assert_eq!(ok("years between @2000-06-15 and @2024-06-14"), Value::Integer(23));
}

#[rstest]
#[case("@2024-01-01 + 999999999999999999 years")]
#[case("@2024-01-01T00:00:00 - 9223372036854775807 months")]
#[case("@2024-01-01 + 2000000000000000000 weeks")]
#[case("@9999-12-31 + 1 day")]
fn test_date_arithmetic_out_of_range_is_null(#[case] source: &str) {
    assert_eq!(ok(source), Value::Null);
}

// === Lists ===

#[test]
fn test_positional_on_empty_list() {
    assert_eq!(ok("First({})"), Value::Null);
    assert_eq!(ok("Last({})"), Value::Null);
    assert_eq!(ok("singleton from {}"), Value::Null);
}

#[test]
fn test_singleton_from_many_is_a_cardinality_error() {
    let err = eval("singleton from {1, 2}").err();
    assert!(matches!(err, Some(EvalError::Cardinality { .. })));
}

#[test]
fn test_list_set_operations() {
    assert_eq!(ok("{1, 2, 2} union {2, 3}"), ints(&[1, 2, 3]));
    assert_eq!(ok("{1, 2, 3} except {2}"), ints(&[1, 3]));
    assert_eq!(ok("{1, 2, 3} intersect {3, 4}"), ints(&[3]));
    assert_eq!(ok("{1, 2, 3} contains 2"), Value::Boolean(true));
}

// === Queries ===

#[test]
fn test_query_filters_and_projects() {
    assert_eq!(ok("({1, 2, 3, 4, 5}) X where X > 2 return X * 2"), ints(&[6, 8, 10]));
}

#[test]
fn test_query_return_keeps_duplicates() {
    assert_eq!(ok("({1, 1, 2}) X return X"), ints(&[1, 1, 2]));
}

#[test]
fn test_query_sort_by_element() {
    let sorted = ok("({ Tuple { n: 3 }, Tuple { n: 1 }, Tuple { n: 2 } }) T sort by n");
    let values: Vec<Value> = sorted
        .as_list()
        .unwrap_or_default()
        .iter()
        .filter_map(|t| t.get("n").cloned())
        .collect();
    assert_eq!(values, vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
}

// === Types ===

#[rstest]
#[case("5 is Integer", Value::Boolean(true))]
#[case("'5' as Integer", Value::Null)]
#[case("convert '5' to Integer", Value::Integer(5))]
#[case("ToString(42)", Value::string("42"))]
#[case("ToInteger('12')", Value::Integer(12))]
#[case("maximum Integer", Value::Integer(i32::MAX))]
fn test_type_operators(#[case] source: &str, #[case] expected: Value) {
    assert_eq!(ok(source), expected);
}

#[test]
fn test_strict_cast_fails() {
    assert!(matches!(eval("cast '5' as Integer"), Err(EvalError::InvalidCast { .. })));
}

// === Errors ===

#[test]
fn test_unknown_function() {
    assert!(matches!(eval("NoSuchFunction(1)"), Err(EvalError::UndefinedFunction { .. })));
}

#[test]
fn test_unknown_identifier() {
    assert!(matches!(eval("Missing + 1"), Err(EvalError::UndefinedReference { .. })));
}
