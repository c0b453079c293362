//! Evaluation engine
//!
//! [`Engine`] walks the syntax tree directly. It holds only read-only
//! state (plugins, limits); everything that changes while evaluating lives
//! in the [`EvaluationContext`], so one engine serves any number of
//! contexts.

use crate::context::{EvaluationContext, IterationFrame};
use crate::error::{EvalError, EvalResult};
use crate::library::CompiledLibrary;
use crate::operators::clinical::codes_of;
use crate::operators::logical::{and3, implies3, not3, or3, xor3};
use crate::operators::{arithmetic, boolean, comparison, condition, interval, list, singleton, string};
use crate::registry::PluginRegistry;
use indexmap::IndexMap;
use medql_ast::{
    AccessModifier, BinaryOp, BinaryOpExpr, CaseExpr, CodeSelector, ConceptSelector, Expression, IfExpr,
    IndexerExpr, InstanceExpr, IntervalExpr, IterationVar, ListExpr, PropertyAccess, Spanned, TupleExpr, UnaryOp,
    UnaryOpExpr,
};
use medql_diagnostics::MedqlError;
use medql_types::equality::promote;
use medql_types::{Code, Concept, Interval, Quantity, Value, ValueType, coerce, compare, equals, literal_value};
use std::cmp::Ordering;
use std::sync::Arc;

const UCUM_URL: &str = "http://unitsofmeasure.org";
const SNOMED_URL: &str = "http://snomed.info/sct";
const LOINC_URL: &str = "http://loinc.org";

/// Evaluation limits. The defaults keep a runaway recursion inside a
/// 2 MiB thread stack; callers on larger stacks may raise them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Nested user-defined function calls
    pub max_call_depth: usize,
    /// Nested expression nodes being evaluated at once
    pub max_expression_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            max_expression_depth: 256,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
    plugins: PluginRegistry,
    config: EngineConfig,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            plugins: PluginRegistry::new(),
            config,
        }
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut PluginRegistry {
        &mut self.plugins
    }

    // === Entry points ===

    /// Evaluate a parsed expression in the given context
    pub fn evaluate_expression(&self, expr: &Spanned<Expression>, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        self.evaluate(expr, ctx)
    }

    /// Parse and evaluate a library-grammar expression such as `1 + 2 * 3`
    pub fn evaluate_source(&self, source: &str, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let expr = medql_parser::parse_expression(source).map_err(|e| EvalError::Compile(MedqlError::Syntax(e)))?;
        self.evaluate(&expr, ctx)
    }

    /// Evaluate a named definition. The result is cached in the context, so
    /// a definition is computed at most once per subject.
    pub fn evaluate_definition(
        &self,
        library: &Arc<CompiledLibrary>,
        name: &str,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Value> {
        if library.definition(name).is_none() {
            return Err(EvalError::undefined_reference(name));
        }
        self.definition_value(library, name, ctx)
    }

    /// Evaluate every public definition. A failing definition is reported
    /// in its slot and does not stop the others.
    pub fn evaluate_all(
        &self,
        library: &Arc<CompiledLibrary>,
        ctx: &mut EvaluationContext,
    ) -> IndexMap<String, EvalResult<Value>> {
        let names: Vec<String> = library.public_definitions().map(|d| d.name.clone()).collect();
        names
            .into_iter()
            .map(|name| {
                let result = self.evaluate_definition(library, &name, ctx);
                if let Err(e) = &result {
                    log::debug!("definition {name} failed: {e}");
                }
                (name, result)
            })
            .collect()
    }

    /// Evaluate a path expression against a resource. The result is always
    /// a collection.
    pub fn evaluate_path(&self, source: &str, resource: &Value) -> EvalResult<Value> {
        let mut ctx = EvaluationContext::new();
        self.evaluate_path_in(source, resource, &mut ctx)
    }

    /// [`Engine::evaluate_path`] with a caller-built context, for constants
    /// or a data source used by `resolve()`
    pub fn evaluate_path_in(&self, source: &str, resource: &Value, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let expr = medql_parser::parse_path(source).map_err(|e| EvalError::Compile(MedqlError::Syntax(e)))?;
        let previous = ctx.set_root(Some(resource.clone()));
        ctx.push_frame(IterationFrame::focus(resource.clone()));
        let result = self.evaluate(&expr, ctx);
        ctx.pop_frame();
        ctx.set_root(previous);
        Ok(Value::List(result?.into_collection()))
    }

    // === Dispatch ===

    pub fn evaluate(&self, expr: &Spanned<Expression>, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        if ctx.expr_depth >= self.config.max_expression_depth {
            log::warn!("expression nesting limit of {} reached", self.config.max_expression_depth);
            return Err(EvalError::RecursionLimit {
                limit: self.config.max_expression_depth,
                what: "expression nesting",
            });
        }
        ctx.expr_depth += 1;
        let result = self.dispatch(&expr.inner, ctx);
        ctx.expr_depth -= 1;
        result
    }

    fn dispatch(&self, expr: &Expression, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        match expr {
            Expression::Literal(lit) => Ok(literal_value(lit).unwrap_or_default()),

            // === References ===
            Expression::IdentifierRef(id) => self.eval_identifier(&id.name, ctx),
            Expression::Property(p) => self.eval_property(p, ctx),
            Expression::ExternalConstant(name) => self.eval_external_constant(name, ctx),
            Expression::Iteration(var) => self.eval_iteration_var(*var, ctx),

            // === Operators ===
            Expression::BinaryOp(b) => self.eval_binary(b, ctx),
            Expression::UnaryOp(u) => self.eval_unary(u, ctx),
            Expression::IntervalOp(i) => self.eval_interval_op(i, ctx),
            Expression::Within(w) => self.eval_within(w, ctx),
            Expression::Between(b) => self.eval_between(b, ctx),

            // === Types ===
            Expression::Is(t) => self.eval_is(t, ctx),
            Expression::As(t) => self.eval_as(t, ctx),
            Expression::Convert(c) => self.eval_convert(c, ctx),
            Expression::MinValue(t) => self.eval_min_value(t),
            Expression::MaxValue(t) => self.eval_max_value(t),

            // === Conditionals ===
            Expression::If(i) => self.eval_if(i, ctx),
            Expression::Case(c) => self.eval_case(c, ctx),

            // === Selectors ===
            Expression::List(l) => self.eval_list(l, ctx),
            Expression::Tuple(t) => self.eval_tuple(t, ctx),
            Expression::Instance(i) => self.eval_instance(i, ctx),
            Expression::Interval(i) => self.eval_interval(i, ctx),
            Expression::Code(c) => self.eval_code_selector(c, ctx),
            Expression::Concept(c) => self.eval_concept_selector(c, ctx),

            Expression::Indexer(i) => self.eval_indexer(i, ctx),
            Expression::FunctionRef(f) => self.eval_function(f, ctx),

            // === Date/time ===
            Expression::DurationBetween(d) => self.eval_temporal_between(d, false, ctx),
            Expression::DifferenceBetween(d) => self.eval_temporal_between(d, true, ctx),
            Expression::DateTimeComponent(d) => self.eval_component(d, ctx),

            Expression::Query(q) => self.eval_query(q, ctx),
            Expression::Retrieve(r) => self.eval_retrieve(r, ctx),

            Expression::Error => Err(EvalError::evaluation("expression contains a syntax error")),
        }
    }

    // === Definitions and parameters ===

    pub(crate) fn definition_value(
        &self,
        library: &Arc<CompiledLibrary>,
        name: &str,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Value> {
        let Some(def) = library.definition(name) else {
            return Err(EvalError::undefined_reference(name));
        };
        if let Some(value) = ctx.cached_definition(library.id(), name) {
            return Ok(value);
        }
        if !ctx.begin_definition(library.id(), name) {
            return Err(EvalError::CircularDefinition { name: name.to_string() });
        }
        let saved = ctx.isolate();
        ctx.push_library(Arc::clone(library));
        let result = self.evaluate(&def.expression, ctx);
        ctx.pop_library();
        ctx.restore(saved);
        ctx.end_definition(library.id(), name);

        let value = result.map_err(|e| e.in_definition(name))?;
        ctx.cache_definition(library.id(), name, value.clone());
        Ok(value)
    }

    /// Caller-supplied value, else the declared default (evaluated once per
    /// context), else Null
    fn parameter_value(
        &self,
        library: &Arc<CompiledLibrary>,
        name: &str,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Value> {
        let Some(def) = library.parameter(name) else {
            return Err(EvalError::undefined_reference(name));
        };
        let declared = def.type_specifier.as_ref().map(ValueType::from_specifier);
        if let Some(value) = ctx.parameter(name) {
            return Ok(match &declared {
                Some(ty) => match coerce(value, ty) {
                    Value::Null => value.clone(),
                    coerced => coerced,
                },
                None => value.clone(),
            });
        }
        if let Some(value) = ctx.parameter_default(library.id(), name) {
            return Ok(value.clone());
        }
        let value = match &def.default {
            Some(default) => {
                let saved = ctx.isolate();
                ctx.push_library(Arc::clone(library));
                let result = self.evaluate(default, ctx);
                ctx.pop_library();
                ctx.restore(saved);
                result.map_err(|e| e.in_definition(name))?
            }
            None => Value::Null,
        };
        ctx.cache_parameter_default(library.id(), name, value.clone());
        Ok(value)
    }

    fn code_of(library: &CompiledLibrary, name: &str) -> Option<Code> {
        let def = library.code(name)?;
        let system = library.codesystem(&def.codesystem)?;
        Some(Code {
            code: def.code.clone(),
            system: Some(system.id.clone()),
            version: system.version.clone(),
            display: def.display.clone(),
        })
    }

    /// Code systems, value sets, codes and concepts declared in a library
    fn terminology_value(&self, library: &CompiledLibrary, name: &str, ctx: &EvaluationContext) -> Option<Value> {
        if let Some(cs) = library.codesystem(name) {
            return Some(Value::tuple([
                ("name", Value::string(cs.name.clone())),
                ("id", Value::string(cs.id.clone())),
                ("version", cs.version.clone().map_or(Value::Null, Value::String)),
            ]));
        }
        if let Some(vs) = library.valueset(name) {
            let expansion = ctx.terminology().and_then(|t| t.expand(&vs.id));
            if expansion.is_none() {
                log::debug!("value set {} has no expansion", vs.id);
            }
            return Some(expansion.map_or(Value::Null, |codes| {
                Value::List(codes.into_iter().map(Value::Code).collect())
            }));
        }
        if let Some(code) = Self::code_of(library, name) {
            return Some(Value::Code(code));
        }
        let concept = library.concept(name)?;
        let codes = concept.codes.iter().filter_map(|c| Self::code_of(library, c));
        Some(Value::Concept(Concept::new(codes, concept.display.clone())))
    }

    /// `Alias.Name` where `Alias` is an included library; private
    /// declarations are not visible
    fn included_value(
        &self,
        library: &Arc<CompiledLibrary>,
        alias: &str,
        name: &str,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Value> {
        if let Some(def) = library.definition(name) {
            if def.access == AccessModifier::Public {
                return self.definition_value(library, name, ctx);
            }
        } else if let Some(param) = library.parameter(name) {
            if param.access == AccessModifier::Public {
                return self.parameter_value(library, name, ctx);
            }
        } else if terminology_access(library, name) == Some(AccessModifier::Public) {
            if let Some(value) = self.terminology_value(library, name, ctx) {
                return Ok(value);
            }
        }
        Err(EvalError::undefined_reference(format!("{alias}.{name}")))
    }

    // === References ===

    fn eval_identifier(&self, name: &str, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        if let Some(value) = ctx.lookup(name) {
            return Ok(value.clone());
        }
        if let Some(library) = ctx.current_library().cloned() {
            if library.definition(name).is_some() {
                return self.definition_value(&library, name, ctx);
            }
            if library.parameter(name).is_some() {
                return self.parameter_value(&library, name, ctx);
            }
            if let Some(value) = self.terminology_value(&library, name, ctx) {
                return Ok(value);
            }
        }
        if ctx.context_name() == Some(name) {
            if let Some(subject) = ctx.subject() {
                return Ok(subject.clone());
            }
        }
        if let Some(focus) = ctx.focus() {
            if focus.resource_type() == Some(name) {
                return Ok(focus.clone());
            }
            return Ok(property(focus, name));
        }
        Err(EvalError::undefined_reference(name))
    }

    fn eval_property(&self, p: &PropertyAccess, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        if let Expression::IdentifierRef(alias) = &p.source.inner {
            if ctx.lookup(&alias.name).is_none() {
                let included = ctx.current_library().and_then(|l| l.include(&alias.name)).cloned();
                if let Some(library) = included {
                    return self.included_value(&library, &alias.name, &p.name, ctx);
                }
            }
        }
        let source = self.evaluate(&p.source, ctx)?;
        Ok(property(&source, &p.name))
    }

    fn eval_external_constant(&self, name: &str, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        Ok(match name {
            "resource" | "context" | "rootResource" => ctx.root().cloned().unwrap_or_default(),
            "ucum" => Value::string(UCUM_URL),
            "sct" => Value::string(SNOMED_URL),
            "loinc" => Value::string(LOINC_URL),
            other => ctx
                .constant(other)
                .cloned()
                .ok_or_else(|| EvalError::undefined_reference(format!("%{other}")))?,
        })
    }

    fn eval_iteration_var(&self, var: IterationVar, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let frame = ctx.frame();
        match var {
            IterationVar::This => frame
                .map(|f| f.this.clone())
                .ok_or_else(|| EvalError::undefined_reference(var.symbol())),
            IterationVar::Index => Ok(frame
                .and_then(|f| f.index)
                .and_then(|i| i32::try_from(i).ok())
                .map_or(Value::Null, Value::Integer)),
            IterationVar::Total => Ok(frame.and_then(|f| f.total.clone()).unwrap_or_default()),
        }
    }

    fn eval_indexer(&self, expr: &IndexerExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let source = self.evaluate(&expr.source, ctx)?;
        let index = singleton(self.evaluate(&expr.index, ctx)?, "[]")?;
        list::element_at(&source, &index)
    }

    // === Operators ===

    fn eval_binary(&self, expr: &BinaryOpExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        match expr.op {
            BinaryOp::And => self.eval_and(expr, ctx),
            BinaryOp::Or => self.eval_or(expr, ctx),
            BinaryOp::Xor => self.eval_xor(expr, ctx),
            BinaryOp::Implies => self.eval_implies(expr, ctx),
            BinaryOp::In => {
                if let Some(reference) = self.terminology_ref(&expr.right, ctx) {
                    let value = self.evaluate(&expr.left, ctx)?;
                    return self.terminology_membership(&value, &reference, ctx);
                }
                let left = self.evaluate(&expr.left, ctx)?;
                let right = self.evaluate(&expr.right, ctx)?;
                membership(left, right)
            }
            BinaryOp::Equal | BinaryOp::NotEqual if ctx.in_path() => {
                let left = self.evaluate(&expr.left, ctx)?;
                let right = self.evaluate(&expr.right, ctx)?;
                let empty = |v: &Value| matches!(v, Value::List(items) if items.is_empty());
                if empty(&left) || empty(&right) {
                    return Ok(Value::Null);
                }
                apply_binary(expr.op, left, right)
            }
            op => {
                let left = self.evaluate(&expr.left, ctx)?;
                let right = self.evaluate(&expr.right, ctx)?;
                apply_binary(op, left, right)
            }
        }
    }

    fn eval_unary(&self, expr: &UnaryOpExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let operand = self.evaluate(&expr.operand, ctx)?;
        apply_unary(expr.op, operand)
    }

    // === Conditionals ===

    fn eval_if(&self, expr: &IfExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let test = self.evaluate(&expr.condition, ctx)?;
        if condition(&test, "if")? == Some(true) {
            self.evaluate(&expr.then_expr, ctx)
        } else {
            self.evaluate(&expr.else_expr, ctx)
        }
    }

    fn eval_case(&self, expr: &CaseExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let comparand = match &expr.comparand {
            Some(c) => Some(self.evaluate(c, ctx)?),
            None => None,
        };
        for item in &expr.items {
            let when = self.evaluate(&item.when, ctx)?;
            let matched = match &comparand {
                Some(c) => equals(c, &when) == Some(true),
                None => condition(&when, "case")? == Some(true),
            };
            if matched {
                return self.evaluate(&item.then, ctx);
            }
        }
        self.evaluate(&expr.else_expr, ctx)
    }

    // === Selectors ===

    fn eval_list(&self, expr: &ListExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let element_type = expr.element_type.as_ref().map(ValueType::from_specifier);
        let mut out = Vec::with_capacity(expr.elements.len());
        for element in &expr.elements {
            let value = self.evaluate(element, ctx)?;
            out.push(match &element_type {
                Some(ty) => match coerce(&value, ty) {
                    Value::Null => value,
                    coerced => coerced,
                },
                None => value,
            });
        }
        Ok(Value::List(out))
    }

    fn eval_tuple(&self, expr: &TupleExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let mut tuple = IndexMap::with_capacity(expr.elements.len());
        for element in &expr.elements {
            tuple.insert(element.name.clone(), self.evaluate(&element.value, ctx)?);
        }
        Ok(Value::Tuple(tuple))
    }

    fn eval_instance(&self, expr: &InstanceExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let mut elements = IndexMap::with_capacity(expr.elements.len());
        for element in &expr.elements {
            elements.insert(element.name.clone(), self.evaluate(&element.value, ctx)?);
        }
        let text = |name: &str| elements.get(name).and_then(Value::as_str).map(str::to_string);
        Ok(match expr.class_type.name.as_str() {
            "Code" => match text("code") {
                Some(code) => Value::Code(Code {
                    code,
                    system: text("system"),
                    version: text("version"),
                    display: text("display"),
                }),
                None => Value::Null,
            },
            "Concept" => {
                let codes = elements.get("codes").map(codes_of).unwrap_or_default();
                Value::Concept(Concept::new(codes, text("display")))
            }
            "Quantity" => match elements.get("value").and_then(Value::as_decimal) {
                Some(value) => Value::Quantity(Quantity::new(value, text("unit").unwrap_or_default())),
                None => Value::Null,
            },
            _ => Value::Tuple(elements),
        })
    }

    fn eval_interval(&self, expr: &IntervalExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let low = singleton(self.evaluate(&expr.low, ctx)?, "Interval")?;
        let high = singleton(self.evaluate(&expr.high, ctx)?, "Interval")?;
        let (low, high) = {
            let (l, h) = promote(&low, &high);
            (l.into_owned(), h.into_owned())
        };
        if compare(&low, &high)? == Some(Ordering::Greater) {
            return Err(EvalError::evaluation(format!(
                "invalid interval: low bound {low} is greater than high bound {high}"
            )));
        }
        Ok(Value::Interval(Interval::new(low, high, expr.low_closed, expr.high_closed)))
    }

    fn eval_code_selector(&self, expr: &CodeSelector, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let system = ctx
            .current_library()
            .and_then(|l| l.codesystem(&expr.system))
            .ok_or_else(|| EvalError::undefined_reference(expr.system.clone()))?;
        Ok(Value::Code(Code {
            code: expr.code.clone(),
            system: Some(system.id.clone()),
            version: system.version.clone(),
            display: expr.display.clone(),
        }))
    }

    fn eval_concept_selector(&self, expr: &ConceptSelector, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let mut codes = Vec::new();
        for code in &expr.codes {
            codes.extend(codes_of(&self.evaluate(code, ctx)?));
        }
        Ok(Value::Concept(Concept::new(codes, expr.display.clone())))
    }
}

fn terminology_access(library: &CompiledLibrary, name: &str) -> Option<AccessModifier> {
    library
        .codesystem(name)
        .map(|d| d.access)
        .or_else(|| library.valueset(name).map(|d| d.access))
        .or_else(|| library.code(name).map(|d| d.access))
        .or_else(|| library.concept(name).map(|d| d.access))
}

/// Property navigation. Lists map over their items and drop Null results;
/// `value` also finds a `value[x]` choice element such as `valueQuantity`.
pub fn property(value: &Value, name: &str) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| property(item, name))
                .flat_map(Value::into_collection)
                .collect(),
        ),
        Value::Tuple(t) => match t.get(name) {
            Some(v) => v.clone(),
            None => t
                .iter()
                .find(|(key, _)| {
                    key.strip_prefix(name)
                        .and_then(|rest| rest.chars().next())
                        .is_some_and(char::is_uppercase)
                })
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
        },
        Value::Code(c) => match name {
            "code" => Value::string(c.code.clone()),
            "system" => c.system.clone().map_or(Value::Null, Value::String),
            "version" => c.version.clone().map_or(Value::Null, Value::String),
            "display" => c.display.clone().map_or(Value::Null, Value::String),
            _ => Value::Null,
        },
        Value::Concept(c) => match name {
            "codes" | "coding" => Value::List(c.codes.iter().cloned().map(Value::Code).collect()),
            "display" | "text" => c.display.clone().map_or(Value::Null, Value::String),
            _ => Value::Null,
        },
        Value::Quantity(q) => match name {
            "value" => Value::Decimal(q.value),
            "unit" | "code" => Value::string(q.unit.clone()),
            _ => Value::Null,
        },
        Value::Ratio(r) => match name {
            "numerator" => Value::Quantity(r.numerator.clone()),
            "denominator" => Value::Quantity(r.denominator.clone()),
            _ => Value::Null,
        },
        Value::Interval(i) => match name {
            "low" => (*i.low).clone(),
            "high" => (*i.high).clone(),
            "lowClosed" => Value::Boolean(i.low_closed),
            "highClosed" => Value::Boolean(i.high_closed),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

/// Quantity-shaped tuples (`value` with `unit` or `code`) take part in
/// arithmetic and comparison as quantities
fn quantity_shaped(value: Value) -> Value {
    let shaped = matches!(
        &value,
        Value::Tuple(t) if t.contains_key("value") && (t.contains_key("unit") || t.contains_key("code"))
    );
    match value.as_quantity() {
        Some(q) if shaped => Value::Quantity(q),
        _ => value,
    }
}

/// `item in collection`: interval containment or list membership. A list
/// on the left must be a subset of the right.
pub fn membership(item: Value, collection: Value) -> EvalResult<Value> {
    if let Value::Interval(i) = &collection {
        let point = quantity_shaped(singleton(item, "in")?);
        return interval::contains_point(i, &point, None);
    }
    match item {
        Value::List(mut items) => match items.len() {
            0 => Ok(Value::Null),
            1 => Ok(list::in_list(&items.swap_remove(0), &collection)),
            _ => Ok(list::subset_of(&Value::List(items), &collection)),
        },
        item => Ok(list::in_list(&item, &collection)),
    }
}

/// Value-level binary operators, shared by the evaluator and the built-in
/// function table
pub fn apply_binary(op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
    let scalar = |v: Value, op: BinaryOp| singleton(v, op.symbol()).map(quantity_shaped);
    match op {
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Implies => {
            let a = condition(&left, op.symbol())?;
            let b = condition(&right, op.symbol())?;
            Ok(boolean(match op {
                BinaryOp::And => and3(a, b),
                BinaryOp::Or => or3(a, b),
                BinaryOp::Xor => xor3(a, b),
                _ => implies3(a, b),
            }))
        }
        BinaryOp::In => membership(left, right),
        BinaryOp::Contains => membership(right, left),

        BinaryOp::Equal => Ok(comparison::equal(&quantity_shaped(left), &quantity_shaped(right))),
        BinaryOp::NotEqual => Ok(comparison::not_equal(&quantity_shaped(left), &quantity_shaped(right))),
        BinaryOp::Equivalent => Ok(comparison::equivalent_value(&left, &right)),
        BinaryOp::NotEquivalent => Ok(comparison::not_equivalent(&left, &right)),

        BinaryOp::Less => comparison::less(&scalar(left, op)?, &scalar(right, op)?),
        BinaryOp::LessOrEqual => comparison::less_or_equal(&scalar(left, op)?, &scalar(right, op)?),
        BinaryOp::Greater => comparison::greater(&scalar(left, op)?, &scalar(right, op)?),
        BinaryOp::GreaterOrEqual => comparison::greater_or_equal(&scalar(left, op)?, &scalar(right, op)?),

        BinaryOp::Union | BinaryOp::Intersect | BinaryOp::Except => match (&left, &right) {
            (Value::Interval(a), Value::Interval(b)) => match op {
                BinaryOp::Union => interval::union(a, b),
                BinaryOp::Intersect => interval::intersect(a, b),
                _ => interval::except(a, b),
            },
            (Value::Interval(_), Value::Null) | (Value::Null, Value::Interval(_)) => Ok(Value::Null),
            _ => Ok(match op {
                BinaryOp::Union => list::union(&left, &right),
                BinaryOp::Intersect => list::intersect(&left, &right),
                _ => list::except(&left, &right),
            }),
        },

        BinaryOp::Add => arithmetic::add(&scalar(left, op)?, &scalar(right, op)?),
        BinaryOp::Subtract => arithmetic::subtract(&scalar(left, op)?, &scalar(right, op)?),
        BinaryOp::Multiply => arithmetic::multiply(&scalar(left, op)?, &scalar(right, op)?),
        BinaryOp::Divide => arithmetic::divide(&scalar(left, op)?, &scalar(right, op)?),
        BinaryOp::TruncatedDivide => arithmetic::truncated_divide(&scalar(left, op)?, &scalar(right, op)?),
        BinaryOp::Modulo => arithmetic::modulo(&scalar(left, op)?, &scalar(right, op)?),
        BinaryOp::Power => arithmetic::power(&scalar(left, op)?, &scalar(right, op)?),
        BinaryOp::Concatenate => string::concatenate(&[singleton(left, "&")?, singleton(right, "&")?]),
    }
}

pub fn apply_unary(op: UnaryOp, operand: Value) -> EvalResult<Value> {
    let keyword = op.keyword();
    match op {
        UnaryOp::Not => Ok(boolean(not3(condition(&operand, keyword)?))),
        UnaryOp::Plus => arithmetic::plus(&singleton(operand, keyword)?),
        UnaryOp::Negate => arithmetic::negate(&quantity_shaped(singleton(operand, keyword)?)),
        UnaryOp::Exists => Ok(list::exists(&operand)),
        UnaryOp::Distinct => Ok(list::distinct(&operand)),
        UnaryOp::Flatten => Ok(list::flatten(&operand)),
        UnaryOp::Collapse => interval::collapse(&operand, None),
        UnaryOp::Expand => interval::expand(&operand, None),
        UnaryOp::SingletonFrom => list::singleton_from(&operand),
        UnaryOp::PointFrom => interval::point_from(&singleton(operand, keyword)?),
        UnaryOp::Start => interval::start_of(&singleton(operand, keyword)?),
        UnaryOp::End => interval::end_of(&singleton(operand, keyword)?),
        UnaryOp::Width => interval::width(&singleton(operand, keyword)?),
        UnaryOp::Size => interval::size(&singleton(operand, keyword)?),
        UnaryOp::Predecessor => arithmetic::predecessor(&singleton(operand, keyword)?),
        UnaryOp::Successor => arithmetic::successor(&singleton(operand, keyword)?),
        UnaryOp::IsNull => Ok(Value::Boolean(operand.is_null())),
        UnaryOp::IsTrue => Ok(Value::Boolean(operand.is_true())),
        UnaryOp::IsFalse => Ok(Value::Boolean(operand.is_false())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn eval(source: &str) -> EvalResult<Value> {
        Engine::new().evaluate_source(source, &mut EvaluationContext::new())
    }

    #[rstest]
    #[case("1 + 2 * 3", Value::Integer(7))]
    #[case("(1 + 2) * 3", Value::Integer(9))]
    #[case("'a' & 'b'", Value::string("ab"))]
    #[case("if 1 > 2 then 'x' else 'y'", Value::string("y"))]
    #[case("case 2 when 1 then 'one' when 2 then 'two' else 'many' end", Value::string("two"))]
    #[case("5 in Interval[1, 10]", Value::Boolean(true))]
    #[case("10 in Interval[1, 10)", Value::Boolean(false))]
    #[case("2 in {1, 2, 3}", Value::Boolean(true))]
    #[case("null is null", Value::Boolean(true))]
    fn test_evaluate_source(#[case] source: &str, #[case] expected: Value) {
        assert_eq!(eval(source).ok(), Some(expected));
    }

    #[test]
    fn test_invalid_interval() {
        assert!(eval("Interval[5, 1]").is_err());
    }

    #[test]
    fn test_property_navigation() {
        let patient = Value::from_json(&serde_json::json!({
            "resourceType": "Patient",
            "name": [{ "given": ["Ann", "Marie"] }, { "given": ["Annie"] }],
            "valueQuantity": { "value": 5, "unit": "mg" }
        }));
        let given = property(&property(&patient, "name"), "given");
        assert_eq!(given.as_list().map(<[Value]>::len), Some(3));
        assert!(matches!(property(&patient, "value"), Value::Tuple(_)));
        assert_eq!(property(&patient, "missing"), Value::Null);
    }

    #[test]
    fn test_membership_with_list_operand() {
        let set = Value::List(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(membership(Value::List(vec![]), set.clone()).ok(), Some(Value::Null));
        let pair = Value::List(vec![Value::Integer(2), Value::Integer(1)]);
        assert_eq!(membership(pair, set).ok(), Some(Value::Boolean(true)));
    }

    #[test]
    fn test_expression_depth_limit() {
        let engine = Engine::with_config(EngineConfig {
            max_call_depth: 8,
            max_expression_depth: 4,
        });
        let err = engine.evaluate_source("1 + (1 + (1 + (1 + 1)))", &mut EvaluationContext::new()).err();
        assert!(matches!(err, Some(EvalError::RecursionLimit { .. })));
    }
}
