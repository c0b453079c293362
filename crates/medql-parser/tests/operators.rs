//! Operator parsing and precedence
//!
//! Covers:
//! - Arithmetic, comparison, logical and membership precedence
//! - Unary minus versus binary subtraction
//! - Type operators binding tighter than comparison
//! - Timing phrases and interval selectors
//! - Path grammar restrictions

use medql_ast::*;
use medql_diagnostics::{MQL0004, MQL0015, MQL0017};
use medql_parser::{parse_expression, parse_path};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn parse_expr(input: &str) -> Expression {
    parse_expression(input)
        .unwrap_or_else(|e| panic!("Failed to parse '{input}': {e:?}"))
        .into_inner()
}

fn binary_parts(expr: &Expression) -> (&Expression, BinaryOp, &Expression) {
    match expr {
        Expression::BinaryOp(b) => (&b.left.inner, b.op, &b.right.inner),
        other => panic!("Expected BinaryOp, got: {other:?}"),
    }
}

fn int(i: i32) -> Expression {
    Expression::Literal(Literal::Integer(i))
}

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    let expr = parse_expr("1 + 2 * 3");
    let (left, op, right) = binary_parts(&expr);
    assert_eq!(op, BinaryOp::Add);
    assert_eq!(left, &int(1));
    let (l, op, r) = binary_parts(right);
    assert_eq!((l, op, r), (&int(2), BinaryOp::Multiply, &int(3)));
}

#[test]
fn test_subtraction_is_left_associative() {
    let expr = parse_expr("10 - 4 - 3");
    let (left, op, right) = binary_parts(&expr);
    assert_eq!(op, BinaryOp::Subtract);
    assert_eq!(right, &int(3));
    assert_eq!(binary_parts(left).1, BinaryOp::Subtract);
}

#[test]
fn test_power_is_right_associative() {
    let expr = parse_expr("2 ^ 3 ^ 2");
    let (left, op, right) = binary_parts(&expr);
    assert_eq!(op, BinaryOp::Power);
    assert_eq!(left, &int(2));
    assert_eq!(binary_parts(right).1, BinaryOp::Power);
}

#[test]
fn test_implies_is_right_associative() {
    let expr = parse_expr("a implies b implies c");
    let (_, op, right) = binary_parts(&expr);
    assert_eq!(op, BinaryOp::Implies);
    assert_eq!(binary_parts(right).1, BinaryOp::Implies);
}

#[rstest]
#[case("a or b and c", BinaryOp::Or)]
#[case("a and b or c", BinaryOp::Or)]
#[case("a = b and c", BinaryOp::And)]
#[case("x in y = true", BinaryOp::In)]
#[case("a < b = c < d", BinaryOp::Equal)]
#[case("a | b < c", BinaryOp::Less)]
#[case("a + b | c", BinaryOp::Union)]
#[case("a & b + c", BinaryOp::Add)]
#[case("a xor b implies c", BinaryOp::Implies)]
fn test_root_operator(#[case] input: &str, #[case] expected: BinaryOp) {
    assert_eq!(binary_parts(&parse_expr(input)).1, expected);
}

#[test]
fn test_leading_minus_is_unary() {
    assert_eq!(parse_expr("-5"), int(-5));
    match parse_expr("-x") {
        Expression::UnaryOp(u) => assert_eq!(u.op, UnaryOp::Negate),
        other => panic!("Expected negation, got {other:?}"),
    }
}

#[rstest]
#[case("-2147483648", Literal::Integer(i32::MIN))]
#[case("-9223372036854775808L", Literal::Long(i64::MIN))]
#[case("-2147483647", Literal::Integer(-2_147_483_647))]
fn test_most_negative_literals(#[case] input: &str, #[case] expected: Literal) {
    assert_eq!(parse_expr(input), Expression::Literal(expected.clone()));
    assert_eq!(parse_path(input).map(|e| e.into_inner()).ok(), Some(Expression::Literal(expected)));
}

#[rstest]
#[case("2147483648")]
#[case("-2147483649")]
#[case("-9223372036854775809L")]
fn test_literals_past_the_range_are_rejected(#[case] input: &str) {
    let errors = parse_expression(input).err().unwrap_or_default();
    assert_eq!(errors.first().map(|e| e.code), Some(MQL0004));
}

#[test]
fn test_minus_before_invocation_negates_the_result() {
    match parse_path("-5.abs()").map(|e| e.into_inner()) {
        Ok(Expression::UnaryOp(u)) => assert_eq!(u.op, UnaryOp::Negate),
        other => panic!("Expected negation, got {other:?}"),
    }
}

#[test]
fn test_minus_after_operand_is_binary() {
    let expr = parse_expr("5 - -3");
    let (left, op, right) = binary_parts(&expr);
    assert_eq!((left, op, right), (&int(5), BinaryOp::Subtract, &int(-3)));
}

#[test]
fn test_is_binds_tighter_than_comparison() {
    let expr = parse_expr("x is Integer = true");
    let (left, op, _) = binary_parts(&expr);
    assert_eq!(op, BinaryOp::Equal);
    assert!(matches!(left, Expression::Is(_)));
}

#[test]
fn test_as_binds_tighter_than_relational() {
    let expr = parse_expr("x as Decimal < 5.0");
    let (left, op, _) = binary_parts(&expr);
    assert_eq!(op, BinaryOp::Less);
    match left {
        Expression::As(cast) => {
            assert!(!cast.strict);
            assert_eq!(cast.type_specifier, TypeSpecifier::named("Decimal"));
        }
        other => panic!("Expected cast, got {other:?}"),
    }
}

#[rstest]
#[case("x is null", UnaryOp::IsNull)]
#[case("x is true", UnaryOp::IsTrue)]
#[case("x is false", UnaryOp::IsFalse)]
#[case("not x", UnaryOp::Not)]
#[case("exists [Condition]", UnaryOp::Exists)]
#[case("start of Interval[1, 2]", UnaryOp::Start)]
#[case("singleton from {1}", UnaryOp::SingletonFrom)]
#[case("predecessor of 5", UnaryOp::Predecessor)]
fn test_unary_keywords(#[case] input: &str, #[case] expected: UnaryOp) {
    match parse_expr(input) {
        Expression::UnaryOp(u) => assert_eq!(u.op, expected),
        other => panic!("Expected {expected:?}, got {other:?}"),
    }
}

#[test]
fn test_is_not_null() {
    match parse_expr("x is not null") {
        Expression::UnaryOp(not) => {
            assert_eq!(not.op, UnaryOp::Not);
            assert!(matches!(&not.operand.inner, Expression::UnaryOp(u) if u.op == UnaryOp::IsNull));
        }
        other => panic!("Expected not(is null), got {other:?}"),
    }
}

#[test]
fn test_strings_and_identifiers_are_distinct() {
    assert_eq!(parse_expr("'Name'"), Expression::Literal(Literal::String("Name".into())));
    assert_eq!(parse_expr("\"Name\""), Expression::IdentifierRef(Identifier::quoted("Name")));
}

#[rstest]
#[case("a same day as b", IntervalOp::SameAs, Some(TemporalPrecision::Day))]
#[case("a same or before b", IntervalOp::SameOrBefore, None)]
#[case("a on or after month of b", IntervalOp::SameOrAfter, Some(TemporalPrecision::Month))]
#[case("a before b", IntervalOp::Before, None)]
#[case("a after day of b", IntervalOp::After, Some(TemporalPrecision::Day))]
#[case("a meets before b", IntervalOp::MeetsBefore, None)]
#[case("a overlaps b", IntervalOp::Overlaps, None)]
#[case("a during b", IntervalOp::During, None)]
#[case("a properly includes b", IntervalOp::ProperlyIncludes, None)]
#[case("a included in b", IntervalOp::IncludedIn, None)]
#[case("a in day of b", IntervalOp::During, Some(TemporalPrecision::Day))]
fn test_timing_phrases(#[case] input: &str, #[case] op: IntervalOp, #[case] precision: Option<TemporalPrecision>) {
    match parse_expr(input) {
        Expression::IntervalOp(i) => {
            assert_eq!(i.op, op);
            assert_eq!(i.precision, precision);
        }
        other => panic!("Expected {op:?}, got {other:?}"),
    }
}

#[test]
fn test_starts_qualifier_wraps_left_operand() {
    match parse_expr("a starts before b") {
        Expression::IntervalOp(i) => {
            assert_eq!(i.op, IntervalOp::Before);
            assert!(matches!(&i.left.inner, Expression::UnaryOp(u) if u.op == UnaryOp::Start));
        }
        other => panic!("Expected timing phrase, got {other:?}"),
    }
}

#[test]
fn test_within_and_between() {
    match parse_expr("a within 3 days of b") {
        Expression::Within(w) => {
            assert_eq!(w.quantity.unit, "days");
            assert!(!w.proper);
        }
        other => panic!("Expected within, got {other:?}"),
    }
    match parse_expr("age between 18 and 65 and flag") {
        Expression::BinaryOp(and) => {
            assert_eq!(and.op, BinaryOp::And);
            assert!(matches!(&and.left.inner, Expression::Between(_)));
        }
        other => panic!("Expected and, got {other:?}"),
    }
}

#[test]
fn test_interval_selector_bounds() {
    match parse_expr("Interval[1, 10)") {
        Expression::Interval(i) => {
            assert!(i.low_closed);
            assert!(!i.high_closed);
        }
        other => panic!("Expected interval, got {other:?}"),
    }
}

#[test]
fn test_quantities_and_ratios() {
    match parse_expr("5 'mg'") {
        Expression::Literal(Literal::Quantity(q)) => assert_eq!(q.unit, "mg"),
        other => panic!("Expected quantity, got {other:?}"),
    }
    assert!(matches!(parse_expr("1 'mg':10 'mL'"), Expression::Literal(Literal::Ratio(_))));
    assert!(matches!(parse_expr("3 months"), Expression::Literal(Literal::Quantity(_))));
}

#[test]
fn test_duration_phrases() {
    match parse_expr("years between @2000-01-01 and @2020-06-01") {
        Expression::DurationBetween(d) => assert_eq!(d.precision, TemporalPrecision::Year),
        other => panic!("Expected duration, got {other:?}"),
    }
    assert!(matches!(
        parse_expr("difference in days between a and b"),
        Expression::DifferenceBetween(_)
    ));
    assert!(matches!(parse_expr("year from @2020-01-01"), Expression::DateTimeComponent(_)));
}

#[test]
fn test_selectors() {
    assert!(matches!(parse_expr("Tuple { a: 1, b: 'x' }"), Expression::Tuple(t) if t.elements.len() == 2));
    assert!(matches!(parse_expr("{ a: 1 }"), Expression::Tuple(_)));
    assert!(matches!(parse_expr("List<Integer> { 1, 2 }"), Expression::List(l) if l.element_type.is_some()));
    assert!(matches!(parse_expr("Code { code: '1', system: 's' }"), Expression::Instance(_)));
    match parse_expr("Code '8480-6' from \"LOINC\" display 'Systolic'") {
        Expression::Code(c) => {
            assert_eq!(c.system, "LOINC");
            assert_eq!(c.display.as_deref(), Some("Systolic"));
        }
        other => panic!("Expected code selector, got {other:?}"),
    }
}

#[test]
fn test_case_forms() {
    match parse_expr("case when x > 1 then 'a' when x > 0 then 'b' else 'c' end") {
        Expression::Case(c) => {
            assert!(c.comparand.is_none());
            assert_eq!(c.items.len(), 2);
        }
        other => panic!("Expected case, got {other:?}"),
    }
    match parse_expr("case x when 1 then 'one' else 'other' end") {
        Expression::Case(c) => assert!(c.comparand.is_some()),
        other => panic!("Expected case, got {other:?}"),
    }
}

#[test]
fn test_path_invocations() {
    let expr = parse_path("Patient.name.where(use = 'official').given.first()")
        .unwrap_or_else(|e| panic!("{e:?}"))
        .into_inner();
    match expr {
        Expression::FunctionRef(f) => {
            assert_eq!(f.name, "first");
            assert!(f.arguments.is_empty());
            assert!(f.receiver.is_some());
        }
        other => panic!("Expected call, got {other:?}"),
    }
}

#[test]
fn test_path_union_and_indexer() {
    let expr = parse_path("name[0].given | name[1].given").unwrap_or_else(|e| panic!("{e:?}")).into_inner();
    assert_eq!(binary_parts(&expr).1, BinaryOp::Union);
}

#[test]
fn test_path_keywords_are_function_names() {
    let expr = parse_path("telecom.exists() and not(false).not()");
    assert!(expr.is_ok(), "{expr:?}");
}

#[rstest]
#[case("Interval[1, 2]")]
#[case("if a then b else c")]
#[case("a before b")]
fn test_path_rejects_library_constructs(#[case] input: &str) {
    let errors = parse_path(input).expect_err("library construct accepted");
    assert_eq!(errors[0].code, MQL0015);
}

// === Nesting ===

fn nested(depth: usize) -> String {
    format!("{}1{}", "(".repeat(depth), ")".repeat(depth))
}

#[test]
fn test_moderate_nesting_parses() {
    assert_eq!(parse_expr(&nested(40)), int(1));
}

#[test]
fn test_deep_nesting_is_a_syntax_error_on_a_default_stack() {
    let handle = std::thread::spawn(|| {
        let source = nested(5000);
        let library = parse_expression(&source).err().unwrap_or_default();
        let path = parse_path(&source).err().unwrap_or_default();
        (library.first().map(|e| e.code), path.first().map(|e| e.code))
    });
    let codes = handle.join().unwrap_or_else(|_| panic!("parser overflowed the thread stack"));
    assert_eq!(codes, (Some(MQL0017), Some(MQL0017)));
}
