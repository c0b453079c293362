//! Interchange JSON to AST
//!
//! The loader checks every node for its `"type"` and the fields that type
//! requires before building the AST node. Errors carry a JSON path such as
//! `library.statements[2].expression.operand[0]`.

use medql_ast::{
    AggregateClause, BetweenExpr, BinaryOp, BinaryOpExpr, BoxExpr, CaseExpr, CaseItem, CodeComparator, CodeDef,
    CodeSelector, CodeSystemDef, ConceptDef, ConceptSelector, ContextDef, ConvertExpr, ConvertTarget, DateLiteral,
    DateTimeComponent, DateTimeComponentExpr, DateTimeLiteral, Expression, ExpressionDef, FunctionDef,
    FunctionRefExpr, Identifier, IfExpr, IncludeDef, IndexerExpr, InstanceExpr, IntervalExpr, IntervalOp,
    IntervalOpExpr, IterationVar, LetClause, Library, LibraryIdentifier, ListExpr, Literal, NamedTypeSpecifier,
    OperandDef, ParameterDef, PropertyAccess, QuantityLiteral, Query, QuerySource, RatioLiteral, RelationshipClause,
    RelationshipKind, Retrieve, ReturnClause, SortClause, SortDirection, SortItem, Spanned, Statement,
    TemporalBetweenExpr, TemporalPrecision, TimeLiteral, TupleElement, TupleExpr, TypeCastExpr, TypeSpecifier,
    TypeTestExpr, UnaryOp, UnaryOpExpr, UsingDef, ValueSetDef, WithinExpr,
};
use medql_diagnostics::{ErrorCode, MQL0402, MQL0403, MQL0404, MedqlError};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::model::{LibraryDocument, LibraryNode, StatementNode, TypeSpecifierNode};

type Result<T> = std::result::Result<T, MedqlError>;

/// Load a library from either `{ "library": { ... } }` or the bare library object
pub fn load_library(value: &Value) -> Result<Library> {
    let node = match value.get("library") {
        Some(_) => decode::<LibraryDocument>(value, "$")?.library,
        None => decode::<LibraryNode>(value, "library")?,
    };
    convert_library(node)
}

/// Load a single expression tree rooted at `path`
pub fn load_expression(value: &Value, path: &str) -> Result<Spanned<Expression>> {
    let node = Node::at(value, path.to_string())?;
    node.expression()
}

fn decode<T: serde::de::DeserializeOwned>(value: &Value, path: &str) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| {
        let message = e.to_string();
        let code = if message.starts_with("missing field") {
            MQL0403
        } else if message.starts_with("unknown variant") {
            MQL0404
        } else {
            MQL0402
        };
        MedqlError::interchange(code, message, path)
    })
}

fn convert_library(node: LibraryNode) -> Result<Library> {
    let mut library = Library {
        identifier: node.identifier.map(|id| LibraryIdentifier {
            name: id.id,
            version: id.version,
        }),
        ..Library::default()
    };

    library.usings = node
        .usings
        .into_iter()
        .map(|u| {
            Spanned::synthetic(UsingDef {
                model: u.local_identifier,
                version: u.version,
            })
        })
        .collect();
    library.includes = node
        .includes
        .into_iter()
        .map(|i| {
            Spanned::synthetic(IncludeDef {
                library: i.path,
                version: i.version,
                alias: i.local_identifier,
            })
        })
        .collect();
    for (i, p) in node.parameters.into_iter().enumerate() {
        let path = format!("library.parameters[{i}].default");
        let default = p.default.as_ref().map(|d| load_expression(d, &path)).transpose()?;
        library.parameters.push(Spanned::synthetic(ParameterDef {
            access: p.access_level.into(),
            name: p.name,
            type_specifier: p.parameter_type_specifier.map(Into::into),
            default,
        }));
    }
    library.codesystems = node
        .code_systems
        .into_iter()
        .map(|cs| {
            Spanned::synthetic(CodeSystemDef {
                access: cs.access_level.into(),
                name: cs.name,
                id: cs.id,
                version: cs.version,
            })
        })
        .collect();
    library.valuesets = node
        .value_sets
        .into_iter()
        .map(|vs| {
            Spanned::synthetic(ValueSetDef {
                access: vs.access_level.into(),
                name: vs.name,
                id: vs.id,
                version: vs.version,
                codesystems: vs.code_system,
            })
        })
        .collect();
    library.codes = node
        .codes
        .into_iter()
        .map(|c| {
            Spanned::synthetic(CodeDef {
                access: c.access_level.into(),
                name: c.name,
                code: c.id,
                codesystem: c.code_system,
                display: c.display,
            })
        })
        .collect();
    library.concepts = node
        .concepts
        .into_iter()
        .map(|c| {
            Spanned::synthetic(ConceptDef {
                access: c.access_level.into(),
                name: c.name,
                codes: c.code,
                display: c.display,
            })
        })
        .collect();
    library.contexts = node
        .contexts
        .into_iter()
        .map(|c| {
            Spanned::synthetic(ContextDef {
                model: c.model,
                name: c.name,
            })
        })
        .collect();

    for (i, statement) in node.statements.into_iter().enumerate() {
        let path = format!("library.statements[{i}]");
        let statement = match statement {
            StatementNode::ExpressionDef(def) => Statement::Expression(ExpressionDef {
                access: def.access_level.into(),
                expression: load_expression(&def.expression, &format!("{path}.expression"))?,
                name: def.name,
                context: def.context,
            }),
            StatementNode::FunctionDef(def) => {
                let body = match (&def.expression, def.external) {
                    (Some(body), false) => Some(load_expression(body, &format!("{path}.expression"))?),
                    (None, true) => None,
                    (Some(_), true) => {
                        return Err(MedqlError::interchange(
                            MQL0402,
                            format!("External function '{}' must not have a body", def.name),
                            path,
                        ));
                    }
                    (None, false) => return Err(missing(&path, "expression")),
                };
                Statement::Function(FunctionDef {
                    access: def.access_level.into(),
                    name: def.name,
                    fluent: def.fluent,
                    context: def.context,
                    operands: def
                        .operand
                        .into_iter()
                        .map(|o| OperandDef {
                            name: o.name,
                            type_specifier: o.operand_type_specifier.into(),
                        })
                        .collect(),
                    return_type: def.result_type_specifier.map(Into::into),
                    body,
                })
            }
        };
        library.statements.push(Spanned::synthetic(statement));
    }

    Ok(library)
}

fn missing(path: &str, field: &str) -> MedqlError {
    MedqlError::interchange(MQL0403, format!("Missing required field '{field}'"), path)
}

fn invalid(code: ErrorCode, path: &str, message: impl Into<String>) -> MedqlError {
    MedqlError::interchange(code, message, path)
}

/// One JSON object being read as a node
struct Node<'a> {
    fields: &'a Map<String, Value>,
    path: String,
}

impl<'a> Node<'a> {
    fn at(value: &'a Value, path: String) -> Result<Self> {
        match value.as_object() {
            Some(fields) => Ok(Self { fields, path }),
            None => Err(invalid(MQL0402, &path, "Expected a JSON object")),
        }
    }

    fn child_path(&self, key: &str) -> String {
        format!("{}.{}", self.path, key)
    }

    fn optional(&self, key: &str) -> Option<&'a Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    fn required(&self, key: &str) -> Result<&'a Value> {
        self.optional(key).ok_or_else(|| missing(&self.path, key))
    }

    fn string(&self, key: &str) -> Result<&'a str> {
        self.required(key)?
            .as_str()
            .ok_or_else(|| invalid(MQL0402, &self.child_path(key), "Expected a string"))
    }

    fn opt_string(&self, key: &str) -> Result<Option<String>> {
        match self.optional(key) {
            Some(v) => v
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| invalid(MQL0402, &self.child_path(key), "Expected a string")),
            None => Ok(None),
        }
    }

    /// Absent flags are false
    fn flag(&self, key: &str) -> Result<bool> {
        match self.optional(key) {
            Some(v) => v
                .as_bool()
                .ok_or_else(|| invalid(MQL0402, &self.child_path(key), "Expected a boolean")),
            None => Ok(false),
        }
    }

    fn boolean(&self, key: &str) -> Result<bool> {
        self.required(key)?
            .as_bool()
            .ok_or_else(|| invalid(MQL0402, &self.child_path(key), "Expected a boolean"))
    }

    fn int<T: TryFrom<i64>>(&self, key: &str) -> Result<T> {
        self.required(key)?
            .as_i64()
            .and_then(|i| T::try_from(i).ok())
            .ok_or_else(|| invalid(MQL0402, &self.child_path(key), "Expected an integer in range"))
    }

    fn opt_int<T: TryFrom<i64>>(&self, key: &str) -> Result<Option<T>> {
        match self.optional(key) {
            Some(_) => self.int(key).map(Some),
            None => Ok(None),
        }
    }

    fn array(&self, key: &str) -> Result<&'a [Value]> {
        self.required(key)?
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| invalid(MQL0402, &self.child_path(key), "Expected an array"))
    }

    /// Absent arrays are empty
    fn opt_array(&self, key: &str) -> Result<&'a [Value]> {
        match self.optional(key) {
            Some(_) => self.array(key),
            None => Ok(&[]),
        }
    }

    fn node(&self, key: &str) -> Result<Node<'a>> {
        Node::at(self.required(key)?, self.child_path(key))
    }

    fn expr(&self, key: &str) -> Result<Spanned<Expression>> {
        self.node(key)?.expression()
    }

    fn boxed(&self, key: &str) -> Result<BoxExpr> {
        self.expr(key).map(Box::new)
    }

    fn opt_expr(&self, key: &str) -> Result<Option<Spanned<Expression>>> {
        match self.optional(key) {
            Some(_) => self.expr(key).map(Some),
            None => Ok(None),
        }
    }

    fn expr_list(&self, key: &str) -> Result<Vec<Spanned<Expression>>> {
        self.opt_array(key)?
            .iter()
            .enumerate()
            .map(|(i, v)| Node::at(v, format!("{}.{key}[{i}]", self.path))?.expression())
            .collect()
    }

    /// Exactly `N` operands
    fn operands<const N: usize>(&self) -> Result<[BoxExpr; N]> {
        let operands = self.expr_list("operand")?;
        if operands.len() != N {
            return Err(invalid(
                MQL0402,
                &self.child_path("operand"),
                format!("Expected {N} operands, found {}", operands.len()),
            ));
        }
        let boxed: Vec<BoxExpr> = operands.into_iter().map(Box::new).collect();
        boxed
            .try_into()
            .map_err(|_| invalid(MQL0402, &self.child_path("operand"), "Operand count mismatch"))
    }

    fn type_specifier(&self, key: &str) -> Result<TypeSpecifier> {
        let node: TypeSpecifierNode = decode(self.required(key)?, &self.child_path(key))?;
        Ok(node.into())
    }

    fn precision(&self, key: &str) -> Result<Option<TemporalPrecision>> {
        match self.opt_string(key)? {
            Some(p) => TemporalPrecision::from_keyword(&p)
                .map(Some)
                .ok_or_else(|| invalid(MQL0402, &self.child_path(key), format!("Unknown precision '{p}'"))),
            None => Ok(None),
        }
    }

    fn required_precision(&self, key: &str) -> Result<TemporalPrecision> {
        self.precision(key)?.ok_or_else(|| missing(&self.path, key))
    }

    fn decimal(&self, key: &str) -> Result<Decimal> {
        let path = self.child_path(key);
        match self.required(key)? {
            Value::String(s) => Decimal::from_str(s).map_err(|e| invalid(MQL0402, &path, e.to_string())),
            Value::Number(n) => Decimal::from_str(&n.to_string()).map_err(|e| invalid(MQL0402, &path, e.to_string())),
            _ => Err(invalid(MQL0402, &path, "Expected a decimal")),
        }
    }

    fn quantity(&self) -> Result<QuantityLiteral> {
        Ok(QuantityLiteral {
            value: self.decimal("value")?,
            unit: self.string("unit")?.to_string(),
        })
    }

    fn elements(&self) -> Result<Vec<TupleElement>> {
        self.opt_array("element")?
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let element = Node::at(v, format!("{}.element[{i}]", self.path))?;
                Ok(TupleElement {
                    name: element.string("name")?.to_string(),
                    value: element.expr("value")?,
                })
            })
            .collect()
    }

    fn date(&self) -> Result<DateLiteral> {
        Ok(DateLiteral::new(self.int("year")?, self.opt_int("month")?, self.opt_int("day")?))
    }

    fn time(&self) -> Result<TimeLiteral> {
        Ok(TimeLiteral {
            hour: self.int("hour")?,
            minute: self.opt_int("minute")?,
            second: self.opt_int("second")?,
            millisecond: self.opt_int("millisecond")?,
        })
    }

    fn expression(&self) -> Result<Spanned<Expression>> {
        let kind = self.string("type")?;
        let expr = match kind {
            "Null" => Expression::Literal(Literal::Null),
            "Literal" => Expression::Literal(self.literal()?),
            "Date" => Expression::Literal(Literal::Date(self.date()?)),
            "DateTime" => Expression::Literal(Literal::DateTime(DateTimeLiteral {
                date: self.date()?,
                time: match self.optional("hour") {
                    Some(_) => Some(self.time()?),
                    None => None,
                },
                offset_minutes: self.opt_int("offsetMinutes")?,
            })),
            "Time" => Expression::Literal(Literal::Time(self.time()?)),
            "Quantity" => Expression::Literal(Literal::Quantity(self.quantity()?)),
            "Ratio" => Expression::Literal(Literal::Ratio(RatioLiteral {
                numerator: self.node("numerator")?.quantity()?,
                denominator: self.node("denominator")?.quantity()?,
            })),
            "IdentifierRef" => Expression::IdentifierRef(Identifier {
                name: self.string("name")?.to_string(),
                quoted: self.flag("quoted")?,
            }),
            "Property" => Expression::Property(PropertyAccess {
                source: self.boxed("source")?,
                name: self.string("path")?.to_string(),
            }),
            "ExternalConstant" => Expression::ExternalConstant(self.string("name")?.to_string()),
            "IterationVariable" => Expression::Iteration(match self.string("name")? {
                "$this" => IterationVar::This,
                "$index" => IterationVar::Index,
                "$total" => IterationVar::Total,
                other => {
                    return Err(invalid(
                        MQL0402,
                        &self.child_path("name"),
                        format!("Unknown iteration variable '{other}'"),
                    ));
                }
            }),
            "Within" => {
                let [left, right] = self.operands::<2>()?;
                Expression::Within(WithinExpr {
                    left,
                    quantity: self.node("quantity")?.quantity()?,
                    right,
                    proper: self.flag("proper")?,
                })
            }
            "Between" => {
                let [operand, low, high] = self.operands::<3>()?;
                Expression::Between(BetweenExpr {
                    operand,
                    low,
                    high,
                    proper: self.flag("proper")?,
                })
            }
            "Is" => Expression::Is(TypeTestExpr {
                operand: self.boxed("operand")?,
                type_specifier: self.type_specifier("isTypeSpecifier")?,
            }),
            "As" => Expression::As(TypeCastExpr {
                operand: self.boxed("operand")?,
                type_specifier: self.type_specifier("asTypeSpecifier")?,
                strict: self.flag("strict")?,
            }),
            "Convert" => Expression::Convert(ConvertExpr {
                operand: self.boxed("operand")?,
                target: ConvertTarget::Type(self.type_specifier("toTypeSpecifier")?),
            }),
            "ConvertQuantity" => Expression::Convert(ConvertExpr {
                operand: self.boxed("operand")?,
                target: ConvertTarget::Unit(self.string("unit")?.to_string()),
            }),
            "MinValue" => Expression::MinValue(self.type_specifier("valueType")?),
            "MaxValue" => Expression::MaxValue(self.type_specifier("valueType")?),
            "If" => Expression::If(IfExpr {
                condition: self.boxed("condition")?,
                then_expr: self.boxed("then")?,
                else_expr: self.boxed("else")?,
            }),
            "Case" => Expression::Case(self.case()?),
            "List" => Expression::List(ListExpr {
                element_type: match self.optional("typeSpecifier") {
                    Some(_) => Some(self.type_specifier("typeSpecifier")?),
                    None => None,
                },
                elements: self.expr_list("operand")?,
            }),
            "Tuple" => Expression::Tuple(TupleExpr {
                elements: self.elements()?,
            }),
            "Instance" => Expression::Instance(InstanceExpr {
                class_type: NamedTypeSpecifier::from(self.string("classType")?),
                elements: self.elements()?,
            }),
            "Interval" => Expression::Interval(IntervalExpr {
                low: self.boxed("low")?,
                high: self.boxed("high")?,
                low_closed: self.boolean("lowClosed")?,
                high_closed: self.boolean("highClosed")?,
            }),
            "Code" => Expression::Code(CodeSelector {
                code: self.string("code")?.to_string(),
                system: self.string("system")?.to_string(),
                display: self.opt_string("display")?,
            }),
            "Concept" => Expression::Concept(ConceptSelector {
                codes: self.expr_list("operand")?,
                display: self.opt_string("display")?,
            }),
            "Indexer" => {
                let [source, index] = self.operands::<2>()?;
                Expression::Indexer(IndexerExpr { source, index })
            }
            "FunctionRef" => Expression::FunctionRef(FunctionRefExpr {
                receiver: match self.optional("source") {
                    Some(_) => Some(self.boxed("source")?),
                    None => None,
                },
                name: self.string("name")?.to_string(),
                arguments: self.expr_list("operand")?,
            }),
            "DurationBetween" | "DifferenceBetween" => {
                let [low, high] = self.operands::<2>()?;
                let between = TemporalBetweenExpr {
                    precision: self.required_precision("precision")?,
                    low,
                    high,
                };
                if kind == "DurationBetween" {
                    Expression::DurationBetween(between)
                } else {
                    Expression::DifferenceBetween(between)
                }
            }
            "DateTimeComponentFrom" => {
                let component = self.string("component")?;
                Expression::DateTimeComponent(DateTimeComponentExpr {
                    component: DateTimeComponent::from_keyword(component).ok_or_else(|| {
                        invalid(
                            MQL0402,
                            &self.child_path("component"),
                            format!("Unknown component '{component}'"),
                        )
                    })?,
                    operand: self.boxed("operand")?,
                })
            }
            "Query" => Expression::Query(Box::new(self.query()?)),
            "Retrieve" => Expression::Retrieve(Box::new(self.retrieve()?)),
            other => self.operator(other)?,
        };
        Ok(Spanned::synthetic(expr))
    }

    fn operator(&self, kind: &str) -> Result<Expression> {
        if let Some(op) = BinaryOp::from_node_name(kind) {
            let [left, right] = self.operands::<2>()?;
            return Ok(Expression::BinaryOp(BinaryOpExpr { op, left, right }));
        }
        if let Some(op) = UnaryOp::from_node_name(kind) {
            return Ok(Expression::UnaryOp(UnaryOpExpr {
                op,
                operand: self.boxed("operand")?,
            }));
        }
        if let Some(op) = IntervalOp::from_node_name(kind) {
            let [left, right] = self.operands::<2>()?;
            return Ok(Expression::IntervalOp(IntervalOpExpr {
                op,
                left,
                right,
                precision: self.precision("precision")?,
            }));
        }
        Err(invalid(
            MQL0404,
            &self.child_path("type"),
            format!("Unknown node type '{kind}'"),
        ))
    }

    fn literal(&self) -> Result<Literal> {
        let value_type = self.string("valueType")?;
        let path = self.child_path("value");
        let value = self.required("value")?;
        let wrong = || invalid(MQL0402, &path, format!("Invalid {value_type} literal"));
        Ok(match value_type {
            "Boolean" => Literal::Boolean(value.as_bool().ok_or_else(wrong)?),
            "Integer" => Literal::Integer(self.int("value")?),
            "Long" => Literal::Long(value.as_i64().ok_or_else(wrong)?),
            "Decimal" => Literal::Decimal(self.decimal("value")?),
            "String" => Literal::String(value.as_str().ok_or_else(wrong)?.to_string()),
            other => {
                return Err(invalid(
                    MQL0404,
                    &self.child_path("valueType"),
                    format!("Unknown literal type '{other}'"),
                ));
            }
        })
    }

    fn case(&self) -> Result<CaseExpr> {
        let items = self
            .array("caseItem")?
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let item = Node::at(v, format!("{}.caseItem[{i}]", self.path))?;
                Ok(CaseItem {
                    when: item.expr("when")?,
                    then: item.expr("then")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CaseExpr {
            comparand: self.opt_expr("comparand")?.map(Box::new),
            items,
            else_expr: self.boxed("else")?,
        })
    }

    fn aliased(&self, key: &str, i: usize) -> Result<(Node<'a>, QuerySource)> {
        let values = self.array(key)?;
        let node = Node::at(&values[i], format!("{}.{key}[{i}]", self.path))?;
        let source = QuerySource {
            alias: node.string("alias")?.to_string(),
            expression: node.expr("expression")?,
        };
        Ok((node, source))
    }

    fn query(&self) -> Result<Query> {
        let source_count = self.array("source")?.len();
        if source_count == 0 {
            return Err(invalid(MQL0402, &self.child_path("source"), "A query needs at least one source"));
        }
        let sources = (0..source_count)
            .map(|i| self.aliased("source", i).map(|(_, s)| s))
            .collect::<Result<Vec<_>>>()?;

        let lets = self
            .opt_array("let")?
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let node = Node::at(v, format!("{}.let[{i}]", self.path))?;
                Ok(LetClause {
                    identifier: node.string("identifier")?.to_string(),
                    expression: node.expr("expression")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let relationships = (0..self.opt_array("relationship")?.len())
            .map(|i| {
                let (node, source) = self.aliased("relationship", i)?;
                let kind = match node.string("type")? {
                    "With" => RelationshipKind::With,
                    "Without" => RelationshipKind::Without,
                    other => {
                        return Err(invalid(
                            MQL0404,
                            &node.child_path("type"),
                            format!("Unknown relationship '{other}'"),
                        ));
                    }
                };
                Ok(RelationshipClause {
                    kind,
                    source,
                    such_that: node.expr("suchThat")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let return_clause = match self.optional("return") {
            Some(_) => {
                let node = self.node("return")?;
                Some(ReturnClause {
                    distinct: node.flag("distinct")?,
                    all: node.flag("all")?,
                    expression: node.expr("expression")?,
                })
            }
            None => None,
        };
        let aggregate_clause = match self.optional("aggregate") {
            Some(_) => {
                let node = self.node("aggregate")?;
                Some(AggregateClause {
                    distinct: node.flag("distinct")?,
                    identifier: node.string("identifier")?.to_string(),
                    starting: node.opt_expr("starting")?,
                    expression: node.expr("expression")?,
                })
            }
            None => None,
        };
        if return_clause.is_some() && aggregate_clause.is_some() {
            return Err(invalid(
                MQL0402,
                &self.path,
                "A query cannot have both a return and an aggregate clause",
            ));
        }
        let sort_clause = match self.optional("sort") {
            Some(_) => {
                let sort = self.node("sort")?;
                let items = sort
                    .array("by")?
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        let by = Node::at(v, format!("{}.by[{i}]", sort.path))?;
                        let direction = match by.opt_string("direction")?.as_deref() {
                            None | Some("asc") | Some("ascending") => SortDirection::Ascending,
                            Some("desc") | Some("descending") => SortDirection::Descending,
                            Some(other) => {
                                return Err(invalid(
                                    MQL0402,
                                    &by.child_path("direction"),
                                    format!("Unknown sort direction '{other}'"),
                                ));
                            }
                        };
                        Ok(SortItem {
                            expression: by.opt_expr("expression")?,
                            direction,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(SortClause { items })
            }
            None => None,
        };

        Ok(Query {
            sources,
            lets,
            relationships,
            where_clause: self.opt_expr("where")?,
            return_clause,
            aggregate_clause,
            sort_clause,
        })
    }

    fn retrieve(&self) -> Result<Retrieve> {
        let code_comparator = match self.opt_string("codeComparator")?.as_deref() {
            None => None,
            Some("in") => Some(CodeComparator::In),
            Some("=") => Some(CodeComparator::Equal),
            Some("~") => Some(CodeComparator::Equivalent),
            Some(other) => {
                return Err(invalid(
                    MQL0402,
                    &self.child_path("codeComparator"),
                    format!("Unknown code comparator '{other}'"),
                ));
            }
        };
        Ok(Retrieve {
            data_type: NamedTypeSpecifier::from(self.string("dataType")?),
            code_path: self.opt_string("codeProperty")?,
            code_comparator,
            codes: self.opt_expr("codes")?,
            date_path: self.opt_string("dateProperty")?,
            date_range: self.opt_expr("dateRange")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code_of(value: Value) -> Option<ErrorCode> {
        load_expression(&value, "expr").err().map(|e| e.code())
    }

    #[test]
    fn test_missing_operand_is_reported_with_path() {
        let err = load_expression(&json!({ "type": "Not" }), "expr").err();
        match err {
            Some(MedqlError::Interchange { code, path, .. }) => {
                assert_eq!(code, MQL0403);
                assert_eq!(path, "expr");
            }
            other => panic!("expected an interchange error, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_error_path() {
        let value = json!({
            "type": "Add",
            "operand": [
                { "type": "Literal", "valueType": "Integer", "value": 1 },
                { "type": "Literal", "valueType": "Integer" }
            ]
        });
        let path = match load_expression(&value, "expr").err() {
            Some(MedqlError::Interchange { path, .. }) => path,
            other => panic!("expected an interchange error, got {other:?}"),
        };
        assert_eq!(path, "expr.operand[1]");
    }

    #[test]
    fn test_operand_count_is_checked() {
        let value = json!({
            "type": "Subtract",
            "operand": [{ "type": "Null" }]
        });
        assert_eq!(code_of(value), Some(MQL0402));
    }

    #[test]
    fn test_unknown_node_type() {
        assert_eq!(code_of(json!({ "type": "Teleport" })), Some(MQL0404));
        assert_eq!(code_of(json!({ "type": "Error" })), Some(MQL0404));
        assert_eq!(code_of(json!([1, 2])), Some(MQL0402));
    }

    #[test]
    fn test_integer_out_of_range() {
        let value = json!({ "type": "Literal", "valueType": "Integer", "value": 5_000_000_000_i64 });
        assert_eq!(code_of(value), Some(MQL0402));
    }
}
