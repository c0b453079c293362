//! AST to interchange JSON
//!
//! Every expression becomes an object whose `"type"` names its node kind.
//! Operator nodes take their kind from the operator (`Add`, `Before`,
//! `SingletonFrom`) and list their arguments under `"operand"`.

use medql_ast::{
    CaseExpr, DateLiteral, DateTimeLiteral, Expression, FunctionDef, Library, Literal, QuantityLiteral, Query,
    Retrieve, SortDirection, Spanned, Statement, TimeLiteral, TupleElement, TypeSpecifier,
};
use serde_json::{Map, Value};

use crate::model::{
    CodeNode, CodeSystemNode, ConceptNode, ContextNode, ExpressionDefNode, FunctionDefNode, IncludeNode,
    LibraryDocument, LibraryNode, OperandNode, ParameterNode, StatementNode, TypeSpecifierNode, UsingNode,
    ValueSetNode, VersionedIdentifier,
};

/// Build the interchange document for a library
pub fn print_library(library: &Library) -> LibraryDocument {
    let node = LibraryNode {
        identifier: library.identifier.as_ref().map(|id| VersionedIdentifier {
            id: id.name.clone(),
            version: id.version.clone(),
        }),
        usings: library
            .usings
            .iter()
            .map(|u| UsingNode {
                local_identifier: u.model.clone(),
                version: u.version.clone(),
            })
            .collect(),
        includes: library
            .includes
            .iter()
            .map(|i| IncludeNode {
                path: i.library.clone(),
                version: i.version.clone(),
                local_identifier: i.alias.clone(),
            })
            .collect(),
        parameters: library
            .parameters
            .iter()
            .map(|p| ParameterNode {
                name: p.name.clone(),
                access_level: p.access.into(),
                parameter_type_specifier: p.type_specifier.as_ref().map(Into::into),
                default: p.default.as_ref().map(print_expression),
            })
            .collect(),
        code_systems: library
            .codesystems
            .iter()
            .map(|cs| CodeSystemNode {
                name: cs.name.clone(),
                id: cs.id.clone(),
                version: cs.version.clone(),
                access_level: cs.access.into(),
            })
            .collect(),
        value_sets: library
            .valuesets
            .iter()
            .map(|vs| ValueSetNode {
                name: vs.name.clone(),
                id: vs.id.clone(),
                version: vs.version.clone(),
                code_system: vs.codesystems.clone(),
                access_level: vs.access.into(),
            })
            .collect(),
        codes: library
            .codes
            .iter()
            .map(|c| CodeNode {
                name: c.name.clone(),
                id: c.code.clone(),
                code_system: c.codesystem.clone(),
                display: c.display.clone(),
                access_level: c.access.into(),
            })
            .collect(),
        concepts: library
            .concepts
            .iter()
            .map(|c| ConceptNode {
                name: c.name.clone(),
                code: c.codes.clone(),
                display: c.display.clone(),
                access_level: c.access.into(),
            })
            .collect(),
        contexts: library
            .contexts
            .iter()
            .map(|c| ContextNode {
                name: c.name.clone(),
                model: c.model.clone(),
            })
            .collect(),
        statements: library.statements.iter().map(|s| print_statement(&s.inner)).collect(),
    };
    LibraryDocument { library: node }
}

fn print_statement(statement: &Statement) -> StatementNode {
    match statement {
        Statement::Expression(def) => StatementNode::ExpressionDef(ExpressionDefNode {
            name: def.name.clone(),
            context: def.context.clone(),
            access_level: def.access.into(),
            expression: print_expression(&def.expression),
        }),
        Statement::Function(def) => StatementNode::FunctionDef(print_function(def)),
    }
}

fn print_function(def: &FunctionDef) -> FunctionDefNode {
    FunctionDefNode {
        name: def.name.clone(),
        context: def.context.clone(),
        access_level: def.access.into(),
        fluent: def.fluent,
        operand: def
            .operands
            .iter()
            .map(|o| OperandNode {
                name: o.name.clone(),
                operand_type_specifier: (&o.type_specifier).into(),
            })
            .collect(),
        result_type_specifier: def.return_type.as_ref().map(Into::into),
        expression: def.body.as_ref().map(print_expression),
        external: def.body.is_none(),
    }
}

/// Object builder for one node
struct Node(Map<String, Value>);

impl Node {
    fn new(kind: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(kind.to_string()));
        Self(fields)
    }

    fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    fn optional(self, key: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.field(key, v),
            None => self,
        }
    }

    /// Only written when set
    fn flag(self, key: &str, set: bool) -> Self {
        if set { self.field(key, true) } else { self }
    }

    fn expr(self, key: &str, expr: &Spanned<Expression>) -> Self {
        self.field(key, print_expression(expr))
    }

    fn operands<'a>(self, exprs: impl IntoIterator<Item = &'a Spanned<Expression>>) -> Self {
        let operands: Vec<Value> = exprs.into_iter().map(print_expression).collect();
        self.field("operand", operands)
    }

    fn type_specifier(self, key: &str, spec: &TypeSpecifier) -> Self {
        let node = TypeSpecifierNode::from(spec);
        self.field(key, serde_json::to_value(node).unwrap_or(Value::Null))
    }

    fn build(self) -> Value {
        Value::Object(self.0)
    }
}

/// Print one expression tree
pub fn print_expression(expr: &Spanned<Expression>) -> Value {
    match &expr.inner {
        Expression::Literal(lit) => print_literal(lit),
        Expression::IdentifierRef(id) => Node::new("IdentifierRef")
            .field("name", id.name.as_str())
            .flag("quoted", id.quoted)
            .build(),
        Expression::Property(p) => Node::new("Property")
            .expr("source", &p.source)
            .field("path", p.name.as_str())
            .build(),
        Expression::ExternalConstant(name) => Node::new("ExternalConstant").field("name", name.as_str()).build(),
        Expression::Iteration(var) => Node::new("IterationVariable").field("name", var.symbol()).build(),
        Expression::BinaryOp(b) => Node::new(b.op.node_name()).operands([&*b.left, &*b.right]).build(),
        Expression::UnaryOp(u) => Node::new(u.op.node_name()).expr("operand", &u.operand).build(),
        Expression::IntervalOp(i) => Node::new(i.op.node_name())
            .operands([&*i.left, &*i.right])
            .optional("precision", i.precision.map(|p| p.keyword()))
            .build(),
        Expression::Within(w) => Node::new("Within")
            .operands([&*w.left, &*w.right])
            .field("quantity", print_quantity(&w.quantity))
            .flag("proper", w.proper)
            .build(),
        Expression::Between(b) => Node::new("Between")
            .operands([&*b.operand, &*b.low, &*b.high])
            .flag("proper", b.proper)
            .build(),
        Expression::Is(t) => Node::new("Is")
            .expr("operand", &t.operand)
            .type_specifier("isTypeSpecifier", &t.type_specifier)
            .build(),
        Expression::As(t) => Node::new("As")
            .expr("operand", &t.operand)
            .type_specifier("asTypeSpecifier", &t.type_specifier)
            .flag("strict", t.strict)
            .build(),
        Expression::Convert(c) => match &c.target {
            medql_ast::ConvertTarget::Type(spec) => Node::new("Convert")
                .expr("operand", &c.operand)
                .type_specifier("toTypeSpecifier", spec)
                .build(),
            medql_ast::ConvertTarget::Unit(unit) => Node::new("ConvertQuantity")
                .expr("operand", &c.operand)
                .field("unit", unit.as_str())
                .build(),
        },
        Expression::MinValue(spec) => Node::new("MinValue").type_specifier("valueType", spec).build(),
        Expression::MaxValue(spec) => Node::new("MaxValue").type_specifier("valueType", spec).build(),
        Expression::If(i) => Node::new("If")
            .expr("condition", &i.condition)
            .expr("then", &i.then_expr)
            .expr("else", &i.else_expr)
            .build(),
        Expression::Case(c) => print_case(c),
        Expression::List(l) => {
            let node = Node::new("List").operands(&l.elements);
            match &l.element_type {
                Some(spec) => node.type_specifier("typeSpecifier", spec).build(),
                None => node.build(),
            }
        }
        Expression::Tuple(t) => Node::new("Tuple").field("element", print_elements(&t.elements)).build(),
        Expression::Instance(i) => Node::new("Instance")
            .field("classType", i.class_type.full_name())
            .field("element", print_elements(&i.elements))
            .build(),
        Expression::Interval(i) => Node::new("Interval")
            .expr("low", &i.low)
            .expr("high", &i.high)
            .field("lowClosed", i.low_closed)
            .field("highClosed", i.high_closed)
            .build(),
        Expression::Code(c) => Node::new("Code")
            .field("code", c.code.as_str())
            .field("system", c.system.as_str())
            .optional("display", c.display.as_deref())
            .build(),
        Expression::Concept(c) => Node::new("Concept")
            .operands(&c.codes)
            .optional("display", c.display.as_deref())
            .build(),
        Expression::Indexer(i) => Node::new("Indexer").operands([&*i.source, &*i.index]).build(),
        Expression::FunctionRef(f) => {
            let node = Node::new("FunctionRef").field("name", f.name.as_str());
            let node = match &f.receiver {
                Some(receiver) => node.expr("source", receiver),
                None => node,
            };
            node.operands(&f.arguments).build()
        }
        Expression::DurationBetween(d) => Node::new("DurationBetween")
            .field("precision", d.precision.keyword())
            .operands([&*d.low, &*d.high])
            .build(),
        Expression::DifferenceBetween(d) => Node::new("DifferenceBetween")
            .field("precision", d.precision.keyword())
            .operands([&*d.low, &*d.high])
            .build(),
        Expression::DateTimeComponent(d) => Node::new("DateTimeComponentFrom")
            .field("component", d.component.keyword())
            .expr("operand", &d.operand)
            .build(),
        Expression::Query(q) => print_query(q),
        Expression::Retrieve(r) => print_retrieve(r),
        Expression::Error => Node::new("Error").build(),
    }
}

fn print_literal(lit: &Literal) -> Value {
    let typed = |value_type: &str, value: Value| {
        Node::new("Literal").field("valueType", value_type).field("value", value).build()
    };
    match lit {
        Literal::Null => Node::new("Null").build(),
        Literal::Boolean(b) => typed("Boolean", Value::Bool(*b)),
        Literal::Integer(i) => typed("Integer", Value::from(*i)),
        Literal::Long(l) => typed("Long", Value::from(*l)),
        Literal::Decimal(d) => typed("Decimal", Value::String(d.to_string())),
        Literal::String(s) => typed("String", Value::String(s.clone())),
        Literal::Date(d) => date_fields(Node::new("Date"), d).build(),
        Literal::DateTime(dt) => print_datetime(dt),
        Literal::Time(t) => time_fields(Node::new("Time"), t).build(),
        Literal::Quantity(q) => print_quantity(q),
        Literal::Ratio(r) => Node::new("Ratio")
            .field("numerator", print_quantity(&r.numerator))
            .field("denominator", print_quantity(&r.denominator))
            .build(),
    }
}

fn date_fields(node: Node, date: &DateLiteral) -> Node {
    node.field("year", date.year)
        .optional("month", date.month)
        .optional("day", date.day)
}

fn time_fields(node: Node, time: &TimeLiteral) -> Node {
    node.field("hour", time.hour)
        .optional("minute", time.minute)
        .optional("second", time.second)
        .optional("millisecond", time.millisecond)
}

fn print_datetime(dt: &DateTimeLiteral) -> Value {
    let node = date_fields(Node::new("DateTime"), &dt.date);
    let node = match &dt.time {
        Some(time) => time_fields(node, time),
        None => node,
    };
    node.optional("offsetMinutes", dt.offset_minutes).build()
}

fn print_quantity(q: &QuantityLiteral) -> Value {
    Node::new("Quantity")
        .field("value", q.value.to_string())
        .field("unit", q.unit.as_str())
        .build()
}

fn print_elements(elements: &[TupleElement]) -> Vec<Value> {
    elements
        .iter()
        .map(|e| {
            let mut fields = Map::new();
            fields.insert("name".to_string(), Value::String(e.name.clone()));
            fields.insert("value".to_string(), print_expression(&e.value));
            Value::Object(fields)
        })
        .collect()
}

fn print_case(case: &CaseExpr) -> Value {
    let items: Vec<Value> = case
        .items
        .iter()
        .map(|item| {
            let mut fields = Map::new();
            fields.insert("when".to_string(), print_expression(&item.when));
            fields.insert("then".to_string(), print_expression(&item.then));
            Value::Object(fields)
        })
        .collect();
    let node = Node::new("Case");
    let node = match &case.comparand {
        Some(comparand) => node.expr("comparand", comparand),
        None => node,
    };
    node.field("caseItem", items).expr("else", &case.else_expr).build()
}

fn print_query(query: &Query) -> Value {
    let aliased = |alias: &str, expression: &Spanned<Expression>| {
        let mut fields = Map::new();
        fields.insert("alias".to_string(), Value::String(alias.to_string()));
        fields.insert("expression".to_string(), print_expression(expression));
        fields
    };

    let sources: Vec<Value> = query
        .sources
        .iter()
        .map(|s| Value::Object(aliased(&s.alias, &s.expression)))
        .collect();
    let mut node = Node::new("Query").field("source", sources);

    if !query.lets.is_empty() {
        let lets: Vec<Value> = query
            .lets
            .iter()
            .map(|l| {
                let mut fields = Map::new();
                fields.insert("identifier".to_string(), Value::String(l.identifier.clone()));
                fields.insert("expression".to_string(), print_expression(&l.expression));
                Value::Object(fields)
            })
            .collect();
        node = node.field("let", lets);
    }
    if !query.relationships.is_empty() {
        let relationships: Vec<Value> = query
            .relationships
            .iter()
            .map(|r| {
                let mut fields = aliased(&r.source.alias, &r.source.expression);
                let kind = match r.kind {
                    medql_ast::RelationshipKind::With => "With",
                    medql_ast::RelationshipKind::Without => "Without",
                };
                fields.insert("type".to_string(), Value::String(kind.to_string()));
                fields.insert("suchThat".to_string(), print_expression(&r.such_that));
                Value::Object(fields)
            })
            .collect();
        node = node.field("relationship", relationships);
    }
    if let Some(condition) = &query.where_clause {
        node = node.expr("where", condition);
    }
    if let Some(ret) = &query.return_clause {
        let clause = Node::new("ReturnClause")
            .flag("distinct", ret.distinct)
            .flag("all", ret.all)
            .expr("expression", &ret.expression);
        node = node.field("return", clause.build());
    }
    if let Some(agg) = &query.aggregate_clause {
        let clause = Node::new("AggregateClause")
            .field("identifier", agg.identifier.as_str())
            .flag("distinct", agg.distinct);
        let clause = match &agg.starting {
            Some(starting) => clause.expr("starting", starting),
            None => clause,
        };
        node = node.field("aggregate", clause.expr("expression", &agg.expression).build());
    }
    if let Some(sort) = &query.sort_clause {
        let by: Vec<Value> = sort
            .items
            .iter()
            .map(|item| {
                let direction = match item.direction {
                    SortDirection::Ascending => "asc",
                    SortDirection::Descending => "desc",
                };
                let by = Node::new("SortByItem").field("direction", direction);
                match &item.expression {
                    Some(expr) => by.expr("expression", expr).build(),
                    None => by.build(),
                }
            })
            .collect();
        node = node.field("sort", Node::new("SortClause").field("by", by).build());
    }
    node.build()
}

fn print_retrieve(retrieve: &Retrieve) -> Value {
    let node = Node::new("Retrieve")
        .field("dataType", retrieve.data_type.full_name())
        .optional("codeProperty", retrieve.code_path.as_deref())
        .optional("codeComparator", retrieve.code_comparator.map(|c| c.symbol()))
        .optional("dateProperty", retrieve.date_path.as_deref());
    let node = match &retrieve.codes {
        Some(codes) => node.expr("codes", codes),
        None => node,
    };
    match &retrieve.date_range {
        Some(range) => node.expr("dateRange", range).build(),
        None => node.build(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medql_ast::{BinaryOp, BinaryOpExpr};
    use serde_json::json;

    fn int(i: i32) -> Spanned<Expression> {
        Spanned::synthetic(Expression::Literal(Literal::Integer(i)))
    }

    #[test]
    fn test_binary_operator_node() {
        let sum = Spanned::synthetic(Expression::BinaryOp(BinaryOpExpr {
            op: BinaryOp::Add,
            left: Box::new(int(1)),
            right: Box::new(int(2)),
        }));
        assert_eq!(
            print_expression(&sum),
            json!({
                "type": "Add",
                "operand": [
                    { "type": "Literal", "valueType": "Integer", "value": 1 },
                    { "type": "Literal", "valueType": "Integer", "value": 2 }
                ]
            })
        );
    }

    #[test]
    fn test_partial_date_omits_missing_components() {
        let date = Spanned::synthetic(Expression::Literal(Literal::Date(DateLiteral::new(2024, Some(3), None))));
        assert_eq!(print_expression(&date), json!({ "type": "Date", "year": 2024, "month": 3 }));
    }
}
