//! Function calls
//!
//! A call is resolved in this order:
//! 1. `Alias.Name(..)` where `Alias` is an included library
//! 2. forms that take an unevaluated argument (`where`, `select`, `iif`,
//!    `ofType`, value set membership, ...)
//! 3. functions defined in the current library, then public functions of
//!    its includes
//! 4. the built-in function table
//! 5. plugin functions
//!
//! A receiver (`x.f(y)`) is passed as the first argument. In a path
//! expression a call without a receiver falls back to the current focus,
//! so `count()` means `$this.count()`.
//!
//! Built-ins with a lowercase name follow the path grammar; capitalised
//! names are the library-grammar spellings. Where the two differ
//! (`indexOf`/`IndexOf`, `combine`/`Combine`) both are provided.

use crate::context::{EvaluationContext, IterationFrame};
use crate::engine::{Engine, apply_binary, apply_unary, property};
use crate::error::{EvalError, EvalResult};
use crate::library::CompiledLibrary;
use crate::operators::clinical::{age_unit, calculate_age};
use crate::operators::{
    aggregate, arithmetic, condition, datetime, interval, items, list, logical, singleton, string, type_ops,
};
use medql_ast::{AccessModifier, BinaryOp, Expression, FunctionDef, FunctionRefExpr, Literal, Spanned, UnaryOp};
use medql_types::{TemporalUnit, Value, ValueType, coerce, convert, is_type};
use medql_types::coercion::converts_to;
use std::sync::Arc;

/// Type named by an argument such as `ofType(Patient)`, `is(FHIR.Patient)`
/// or `as('Quantity')`
fn type_argument(expr: &Spanned<Expression>) -> Option<ValueType> {
    match &expr.inner {
        Expression::IdentifierRef(id) => Some(ValueType::from_name(&id.name)),
        Expression::Property(p) => Some(ValueType::from_name(&p.name)),
        Expression::Literal(Literal::String(s)) => Some(ValueType::from_name(s)),
        _ => None,
    }
}

/// `AgeInYears`, `AgeInMonthsAt`, `CalculateAgeInDays`, ... split into the
/// unit and whether an `as of` argument is expected
fn age_function(name: &str) -> Option<(bool, TemporalUnit, bool)> {
    let (calculate, rest) = match name.strip_prefix("CalculateAgeIn") {
        Some(rest) => (true, rest),
        None => (false, name.strip_prefix("AgeIn")?),
    };
    let (suffix, at) = match rest.strip_suffix("At") {
        Some(suffix) => (suffix, true),
        None => (rest, false),
    };
    Some((calculate, age_unit(suffix)?, at))
}

fn present_type(ty: ValueType) -> Option<ValueType> {
    match ty {
        ValueType::Model(_) | ValueType::Any => None,
        other => Some(other),
    }
}

/// Single-argument conversion applied to a singleton input
fn conversion(value: &Value, name: &str, f: impl Fn(&Value) -> Value) -> EvalResult<Value> {
    let value = singleton(value.clone(), name)?;
    if value.is_null() {
        return Ok(Value::Null);
    }
    Ok(f(&value))
}

impl Engine {
    pub fn eval_function(&self, call: &FunctionRefExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        if let Some(result) = self.eval_qualified_call(call, ctx)? {
            return Ok(result);
        }
        if let Some(result) = self.eval_special_form(call, ctx)? {
            return Ok(result);
        }

        let mut args = Vec::with_capacity(call.arguments.len() + 1);
        if let Some(receiver) = &call.receiver {
            args.push(self.evaluate(receiver, ctx)?);
        }
        for argument in &call.arguments {
            args.push(self.evaluate(argument, ctx)?);
        }
        if let Some(result) = self.call_function(&call.name, &args, ctx)? {
            return Ok(result);
        }

        if call.receiver.is_none() {
            if let Some(focus) = ctx.focus().cloned() {
                let mut with_focus = Vec::with_capacity(args.len() + 1);
                with_focus.push(focus);
                with_focus.extend(args.iter().cloned());
                if let Some(result) = self.call_function(&call.name, &with_focus, ctx)? {
                    return Ok(result);
                }
            }
        }
        Err(EvalError::undefined_function(call.name.clone(), args.len()))
    }

    /// `Alias.Function(..)` against an included library
    fn eval_qualified_call(&self, call: &FunctionRefExpr, ctx: &mut EvaluationContext) -> EvalResult<Option<Value>> {
        let Some(receiver) = &call.receiver else {
            return Ok(None);
        };
        let Expression::IdentifierRef(alias) = &receiver.inner else {
            return Ok(None);
        };
        if ctx.lookup(&alias.name).is_some() {
            return Ok(None);
        }
        let Some(library) = ctx.current_library().and_then(|l| l.include(&alias.name)).cloned() else {
            return Ok(None);
        };
        let mut args = Vec::with_capacity(call.arguments.len());
        for argument in &call.arguments {
            args.push(self.evaluate(argument, ctx)?);
        }
        match select_function(&library, &call.name, &args, true) {
            Some(def) => self.invoke(&library, def, args, ctx).map(Some),
            None => Err(EvalError::undefined_function(format!("{}.{}", alias.name, call.name), args.len())),
        }
    }

    /// Resolve an evaluated call: user functions, built-ins, then plugins
    pub(crate) fn call_function(&self, name: &str, args: &[Value], ctx: &mut EvaluationContext) -> EvalResult<Option<Value>> {
        if let Some(library) = ctx.current_library().cloned() {
            if let Some(def) = select_function(&library, name, args, false) {
                return self.invoke(&library, def, args.to_vec(), ctx).map(Some);
            }
            let included = library
                .includes()
                .map(|(_, lib)| Arc::clone(lib))
                .collect::<Vec<_>>();
            for lib in included {
                if let Some(def) = select_function(&lib, name, args, true) {
                    return self.invoke(&lib, def, args.to_vec(), ctx).map(Some);
                }
            }
        }
        if let Some(result) = self.builtin(name, args, ctx)? {
            return Ok(Some(result));
        }
        if self.plugins().get(name, args.len()).is_some() {
            return self.plugins().call(name, args).map(Some);
        }
        Ok(None)
    }

    /// Run a user-defined function body in a fresh scope holding its
    /// operands. External functions are served by plugins.
    fn invoke(
        &self,
        library: &Arc<CompiledLibrary>,
        def: &FunctionDef,
        args: Vec<Value>,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Value> {
        let Some(body) = &def.body else {
            return self.plugins().call(&def.name, &args);
        };
        let limit = self.config().max_call_depth;
        if ctx.call_depth >= limit {
            log::warn!("call depth limit of {limit} reached in function {}", def.name);
            return Err(EvalError::RecursionLimit {
                limit,
                what: "function calls",
            });
        }

        let saved = ctx.isolate();
        ctx.push_scope();
        for (operand, arg) in def.operands.iter().zip(args) {
            let ty = ValueType::from_specifier(&operand.type_specifier);
            let value = match coerce(&arg, &ty) {
                Value::Null => arg,
                coerced => coerced,
            };
            ctx.bind(operand.name.clone(), value);
        }
        ctx.push_library(Arc::clone(library));
        ctx.call_depth += 1;
        let result = self.evaluate(body, ctx);
        ctx.call_depth -= 1;
        ctx.pop_library();
        ctx.restore(saved);
        result
    }

    // === Forms with unevaluated arguments ===

    /// The input of a path function: the receiver, else the focus
    fn input_of(&self, call: &FunctionRefExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        match &call.receiver {
            Some(receiver) => self.evaluate(receiver, ctx),
            None => Ok(ctx.focus().cloned().unwrap_or_default()),
        }
    }

    /// Evaluate `body` once per item with the item as `$this`
    fn each(
        &self,
        input: &[Value],
        body: &Spanned<Expression>,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(input.len());
        for (index, item) in input.iter().enumerate() {
            ctx.push_frame(IterationFrame {
                this: item.clone(),
                index: Some(index),
                total: None,
            });
            let result = self.evaluate(body, ctx);
            ctx.pop_frame();
            out.push(result?);
        }
        Ok(out)
    }

    fn criteria(
        &self,
        input: &[Value],
        body: &Spanned<Expression>,
        operator: &str,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Vec<bool>> {
        self.each(input, body, ctx)?
            .iter()
            .map(|v| condition(v, operator).map(|c| c == Some(true)))
            .collect()
    }

    fn eval_special_form(&self, call: &FunctionRefExpr, ctx: &mut EvaluationContext) -> EvalResult<Option<Value>> {
        let args = call.arguments.as_slice();
        let result = match (call.name.as_str(), args) {
            ("where", [criteria]) => {
                let input = items(self.input_of(call, ctx)?);
                let keep = self.criteria(&input, criteria, "where", ctx)?;
                Value::List(input.into_iter().zip(keep).filter_map(|(v, k)| k.then_some(v)).collect())
            }
            ("select", [projection]) => {
                let input = items(self.input_of(call, ctx)?);
                let projected = self.each(&input, projection, ctx)?;
                Value::List(projected.into_iter().flat_map(Value::into_collection).collect())
            }
            ("all", [criteria]) => {
                let input = items(self.input_of(call, ctx)?);
                Value::Boolean(self.criteria(&input, criteria, "all", ctx)?.into_iter().all(|b| b))
            }
            ("exists", [criteria]) => {
                let input = items(self.input_of(call, ctx)?);
                Value::Boolean(self.criteria(&input, criteria, "exists", ctx)?.into_iter().any(|b| b))
            }
            ("repeat", [projection]) => {
                let mut frontier = items(self.input_of(call, ctx)?);
                let mut seen: Vec<Value> = Vec::new();
                while !frontier.is_empty() {
                    let next = self.each(&frontier, projection, ctx)?;
                    frontier = Vec::new();
                    for item in next.into_iter().flat_map(Value::into_collection) {
                        if !seen.iter().any(|s| list::same(s, &item)) {
                            seen.push(item.clone());
                            frontier.push(item);
                        }
                    }
                }
                Value::List(seen)
            }
            ("aggregate", [aggregator, rest @ ..]) if rest.len() <= 1 => {
                let input = items(self.input_of(call, ctx)?);
                let mut total = match rest.first() {
                    Some(init) => self.evaluate(init, ctx)?,
                    None => Value::Null,
                };
                for (index, item) in input.into_iter().enumerate() {
                    ctx.push_frame(IterationFrame {
                        this: item,
                        index: Some(index),
                        total: Some(total),
                    });
                    let result = self.evaluate(aggregator, ctx);
                    ctx.pop_frame();
                    total = result?;
                }
                total
            }
            ("iif", [test, then, rest @ ..]) if rest.len() <= 1 => {
                let matched = match &call.receiver {
                    Some(receiver) => {
                        let focus = self.evaluate(receiver, ctx)?;
                        ctx.push_frame(IterationFrame::focus(focus));
                        let result = self.evaluate(test, ctx);
                        ctx.pop_frame();
                        condition(&result?, "iif")?
                    }
                    None => condition(&self.evaluate(test, ctx)?, "iif")?,
                };
                match (matched, rest.first()) {
                    (Some(true), _) => self.evaluate(then, ctx)?,
                    (_, Some(otherwise)) => self.evaluate(otherwise, ctx)?,
                    (_, None) => Value::Null,
                }
            }
            ("ofType" | "is" | "as", [type_expr]) => {
                let Some(ty) = type_argument(type_expr) else {
                    return Ok(None);
                };
                let input = self.input_of(call, ctx)?;
                match call.name.as_str() {
                    "ofType" => type_ops::of_type(&input, &ty),
                    "is" => type_ops::is(&singleton(input, "is")?, &ty),
                    _ => type_ops::as_type(&singleton(input, "as")?, &ty, false)?,
                }
            }
            ("memberOf", [set]) => {
                let input = singleton(self.input_of(call, ctx)?, "memberOf")?;
                self.eval_terminology_in(&input, set, false, ctx)?
            }
            ("InValueSet" | "AnyInValueSet" | "InCodeSystem" | "AnyInCodeSystem", _) => {
                let code_system = call.name.ends_with("CodeSystem");
                let (value, set) = match (&call.receiver, args) {
                    (Some(receiver), [set]) => (self.evaluate(receiver, ctx)?, set),
                    (None, [value, set]) => (self.evaluate(value, ctx)?, set),
                    _ => return Ok(None),
                };
                self.eval_terminology_in(&value, set, code_system, ctx)?
            }
            _ => return Ok(None),
        };
        Ok(Some(result))
    }

    // === Built-in function table ===

    fn builtin(&self, name: &str, args: &[Value], ctx: &mut EvaluationContext) -> EvalResult<Option<Value>> {
        let value = match (name, args) {
            // Existence and filtering
            ("empty" | "IsEmpty", [x]) => list::empty(x),
            ("exists" | "Exists", [x]) => list::exists(x),
            ("count" | "Count", [x]) => aggregate::count(x),
            ("distinct" | "Distinct", [x]) => list::distinct(x),
            ("isDistinct", [x]) => list::is_distinct(x),
            ("allTrue" | "AllTrue", [x]) => list::all_true(x)?,
            ("anyTrue" | "AnyTrue", [x]) => list::any_true(x)?,
            ("allFalse" | "AllFalse", [x]) => list::all_false(x)?,
            ("anyFalse" | "AnyFalse", [x]) => list::any_false(x)?,
            ("subsetOf", [a, b]) => list::subset_of(a, b),
            ("supersetOf", [a, b]) => list::superset_of(a, b),
            ("hasValue", [x]) => Value::Boolean(matches!(items(x.clone()).as_slice(), [v] if !v.is_null())),

            // Subsetting
            ("first" | "First", [x]) => list::first(x),
            ("last" | "Last", [x]) => list::last(x),
            ("tail" | "Tail", [x]) => list::tail(x),
            ("skip" | "Skip", [x, n]) => list::skip(x, n)?,
            ("take" | "Take", [x, n]) => list::take(x, n)?,
            ("single" | "SingletonFrom", [x]) => list::single(x)?,
            ("flatten" | "Flatten", [x]) => list::flatten(x),
            ("IndexOf", [l, x]) => list::index_of(l, x),

            // Combining
            ("union", [a, b]) => apply_binary(BinaryOp::Union, a.clone(), b.clone())?,
            ("intersect", [a, b]) => apply_binary(BinaryOp::Intersect, a.clone(), b.clone())?,
            ("exclude", [a, b]) => apply_binary(BinaryOp::Except, a.clone(), b.clone())?,
            ("combine", [a, b]) => list::combine(a, b),
            ("Combine" | "join", [l]) => string::join(l, None)?,
            ("Combine" | "join", [l, sep]) => string::join(l, Some(sep))?,
            ("children", [x]) => list::children(x),
            ("descendants", [x]) => list::descendants(x),

            // Aggregates
            ("sum" | "Sum", [x]) => aggregate::sum(x)?,
            ("min" | "Min", [x]) => aggregate::min(x)?,
            ("max" | "Max", [x]) => aggregate::max(x)?,
            ("avg" | "Avg", [x]) => aggregate::avg(x)?,
            ("Product", [x]) => aggregate::product(x)?,
            ("Median", [x]) => aggregate::median(x)?,
            ("Mode", [x]) => aggregate::mode(x),
            ("Variance", [x]) => aggregate::variance(x)?,
            ("PopulationVariance", [x]) => aggregate::population_variance(x)?,
            ("StdDev", [x]) => aggregate::std_dev(x)?,
            ("PopulationStdDev", [x]) => aggregate::population_std_dev(x)?,
            ("GeometricMean", [x]) => aggregate::geometric_mean(x)?,

            // Nulls and logic
            ("not", [x]) => apply_unary(UnaryOp::Not, x.clone())?,
            ("Coalesce" | "coalesce", args) if !args.is_empty() => logical::coalesce(args),
            ("IsNull", [x]) => apply_unary(UnaryOp::IsNull, x.clone())?,
            ("IsTrue", [x]) => apply_unary(UnaryOp::IsTrue, x.clone())?,
            ("IsFalse", [x]) => apply_unary(UnaryOp::IsFalse, x.clone())?,

            // Strings
            ("startsWith" | "StartsWith", [s, p]) => string::starts_with(&singleton(s.clone(), name)?, p)?,
            ("endsWith" | "EndsWith", [s, p]) => string::ends_with(&singleton(s.clone(), name)?, p)?,
            ("contains", [s, f]) => string::contains(&singleton(s.clone(), name)?, f)?,
            ("indexOf", [s, f]) => string::index_of(&singleton(s.clone(), name)?, f)?,
            ("PositionOf", [p, s]) => string::position_of(p, s)?,
            ("LastPositionOf", [p, s]) => string::last_position_of(p, s)?,
            ("substring" | "Substring", [s, start]) => string::substring(&singleton(s.clone(), name)?, start, None)?,
            ("substring" | "Substring", [s, start, len]) => {
                string::substring(&singleton(s.clone(), name)?, start, Some(len))?
            }
            ("upper" | "Upper", [s]) => string::upper(&singleton(s.clone(), name)?)?,
            ("lower" | "Lower", [s]) => string::lower(&singleton(s.clone(), name)?)?,
            ("trim", [s]) => string::trim(&singleton(s.clone(), name)?)?,
            ("toChars", [s]) => string::to_chars(&singleton(s.clone(), name)?)?,
            ("replace", [s, p, r]) => string::replace(&singleton(s.clone(), name)?, p, r)?,
            ("matches", [s, p]) => string::matches(&singleton(s.clone(), name)?, p, false)?,
            ("Matches", [s, p]) => string::matches(s, p, true)?,
            ("replaceMatches" | "ReplaceMatches", [s, p, r]) => {
                string::replace_matches(&singleton(s.clone(), name)?, p, r)?
            }
            ("split" | "Split", [s, sep]) => string::split(&singleton(s.clone(), name)?, sep)?,
            ("Concatenate", args) if !args.is_empty() => string::concatenate(args)?,
            ("length" | "Length", [x]) => match x {
                Value::List(_) if name == "length" => string::length(&singleton(x.clone(), name)?)?,
                _ => string::length(x)?,
            },

            // Math
            ("abs" | "Abs", [x]) => arithmetic::abs(&singleton(x.clone(), name)?)?,
            ("ceiling" | "Ceiling", [x]) => arithmetic::ceiling(&singleton(x.clone(), name)?)?,
            ("floor" | "Floor", [x]) => arithmetic::floor(&singleton(x.clone(), name)?)?,
            ("truncate" | "Truncate", [x]) => arithmetic::truncate(&singleton(x.clone(), name)?)?,
            ("round" | "Round", [x]) => arithmetic::round(&singleton(x.clone(), name)?, None)?,
            ("round" | "Round", [x, p]) => arithmetic::round(&singleton(x.clone(), name)?, Some(p))?,
            ("sqrt" | "Sqrt", [x]) => arithmetic::sqrt(&singleton(x.clone(), name)?)?,
            ("ln" | "Ln", [x]) => arithmetic::ln(&singleton(x.clone(), name)?)?,
            ("exp" | "Exp", [x]) => arithmetic::exp(&singleton(x.clone(), name)?)?,
            ("log" | "Log", [x, base]) => arithmetic::log(&singleton(x.clone(), name)?, base)?,
            ("power" | "Power", [a, b]) => apply_binary(BinaryOp::Power, a.clone(), b.clone())?,
            ("Predecessor", [x]) => apply_unary(UnaryOp::Predecessor, x.clone())?,
            ("Successor", [x]) => apply_unary(UnaryOp::Successor, x.clone())?,

            // Date and time
            ("now" | "Now", []) => Value::DateTime(ctx.now()),
            ("today" | "Today", []) => Value::Date(ctx.today()),
            ("timeOfDay" | "TimeOfDay", []) => ctx.time_of_day().map_or(Value::Null, Value::Time),
            ("Date", args) if !args.is_empty() => datetime::date(args)?,
            ("DateTime", args) if !args.is_empty() => datetime::datetime(args)?,
            ("Time", args) if !args.is_empty() => datetime::time(args)?,

            // Intervals
            ("Start", [x]) => apply_unary(UnaryOp::Start, x.clone())?,
            ("End", [x]) => apply_unary(UnaryOp::End, x.clone())?,
            ("Width", [x]) => apply_unary(UnaryOp::Width, x.clone())?,
            ("Size", [x]) => apply_unary(UnaryOp::Size, x.clone())?,
            ("PointFrom", [x]) => apply_unary(UnaryOp::PointFrom, x.clone())?,
            ("Collapse", [x]) => interval::collapse(x, None)?,
            ("Collapse", [x, per]) => interval::collapse(x, Some(per))?,
            ("Expand", [x]) => interval::expand(x, None)?,
            ("Expand", [x, per]) => interval::expand(x, Some(per))?,

            // Resources
            ("resolve", [x]) => self.resolve_references(x, ctx)?,
            ("extension", [x, url]) => {
                let url = singleton(url.clone(), name)?;
                let extensions = items(property(x, "extension"));
                Value::List(
                    extensions
                        .into_iter()
                        .filter(|e| e.get("url").is_some_and(|u| list::same(u, &url)))
                        .collect(),
                )
            }

            // Diagnostics
            ("trace", [x]) => {
                log::info!("trace: {x}");
                x.clone()
            }
            ("trace", [x, label, ..]) => {
                log::info!("trace {}: {}", label.as_str().unwrap_or("value"), x);
                x.clone()
            }
            ("Message", [source, test, code, severity, message]) => message_of(source, test, code, severity, message)?,

            _ => match self.builtin_by_pattern(name, args, ctx)? {
                Some(value) => value,
                None => return Ok(None),
            },
        };
        Ok(Some(value))
    }

    /// Families of built-ins recognised by name: `toX`/`ToX`,
    /// `convertsToX` and the age functions
    fn builtin_by_pattern(&self, name: &str, args: &[Value], ctx: &EvaluationContext) -> EvalResult<Option<Value>> {
        if let Some((calculate, unit, at)) = age_function(name) {
            return Ok(match (calculate, at, args) {
                (false, false, []) => Some(self.subject_age(unit, None, ctx)?),
                (false, true, [as_of]) => Some(self.subject_age(unit, Some(as_of.clone()), ctx)?),
                (true, false, [birth]) => {
                    let as_of = match unit {
                        TemporalUnit::Hour | TemporalUnit::Minute | TemporalUnit::Second => Value::DateTime(ctx.now()),
                        _ => Value::Date(ctx.today()),
                    };
                    Some(calculate_age(birth, &as_of, unit)?)
                }
                (true, true, [birth, as_of]) => Some(calculate_age(birth, as_of, unit)?),
                _ => None,
            });
        }
        let [value] = args else {
            return Ok(None);
        };
        if let Some(target) = name.strip_prefix("convertsTo").or_else(|| name.strip_prefix("ConvertsTo")) {
            let Some(ty) = present_type(ValueType::from_name(target)) else {
                return Ok(None);
            };
            let value = singleton(value.clone(), name)?;
            return Ok(Some(converts_to(&value, &ty).map_or(Value::Null, Value::Boolean)));
        }
        if let Some(target) = name.strip_prefix("to").or_else(|| name.strip_prefix("To")) {
            let Some(ty) = present_type(ValueType::from_name(target)) else {
                return Ok(None);
            };
            return conversion(value, name, |v| {
                if is_type(v, &ty) { v.clone() } else { convert(v, &ty) }
            })
            .map(Some);
        }
        Ok(None)
    }

    /// `resolve()`: literal references looked up in the data source
    fn resolve_references(&self, value: &Value, ctx: &EvaluationContext) -> EvalResult<Value> {
        let Some(source) = ctx.data_source() else {
            return Ok(Value::List(Vec::new()));
        };
        let mut out = Vec::new();
        for item in items(value.clone()) {
            let reference = match &item {
                Value::String(s) => Some(s.clone()),
                other => other.get("reference").and_then(Value::as_str).map(str::to_string),
            };
            if let Some(reference) = reference {
                if let Some(resource) = source.resolve_reference(&reference)? {
                    out.push(resource);
                }
            }
        }
        Ok(Value::List(out))
    }
}

/// `Message(source, condition, code, severity, message)`: when the
/// condition is true, an `Error` severity fails the evaluation and anything
/// else is logged. The source is returned unchanged.
fn message_of(source: &Value, test: &Value, code: &Value, severity: &Value, message: &Value) -> EvalResult<Value> {
    if condition(test, "Message")? != Some(true) {
        return Ok(source.clone());
    }
    let code = code.as_str().unwrap_or_default();
    let message = message.as_str().unwrap_or_default();
    match severity.as_str().unwrap_or("Message") {
        "Error" => Err(EvalError::Message {
            code: code.to_string(),
            message: message.to_string(),
        }),
        "Warning" => {
            log::warn!("{code}: {message}");
            Ok(source.clone())
        }
        _ => {
            log::info!("{code}: {message}");
            Ok(source.clone())
        }
    }
}

/// Overload with the given arity whose operand types accept the arguments;
/// else the first with that arity
fn select_function<'a>(
    library: &'a CompiledLibrary,
    name: &str,
    args: &[Value],
    public_only: bool,
) -> Option<&'a FunctionDef> {
    let mut candidates = library
        .functions(name)
        .iter()
        .filter(|f| f.operands.len() == args.len())
        .filter(|f| !public_only || f.access == AccessModifier::Public)
        .peekable();
    let first = *candidates.peek()?;
    candidates
        .find(|f| {
            f.operands.iter().zip(args).all(|(operand, arg)| {
                arg.is_null() || is_type(arg, &ValueType::from_specifier(&operand.type_specifier))
            })
        })
        .or(Some(first))
}
