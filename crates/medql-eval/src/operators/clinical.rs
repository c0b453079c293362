//! Clinical operators
//!
//! Value set and code system membership, retrieves and patient ages.
//! Membership needs to know whether the right-hand side names a value set
//! or a code system, so those references are recognised from the syntax
//! tree before anything is evaluated.

use super::{boolean, datetime, singleton};
use crate::context::EvaluationContext;
use crate::engine::Engine;
use crate::error::{EvalError, EvalResult};
use crate::retrieve::{DataSourceError, RetrieveRequest};
use crate::terminology::value_in_codes;
use medql_ast::{Expression, Retrieve, Spanned};
use medql_types::{Code, Interval, TemporalUnit, Value, ValueType, coerce};

/// A terminology declaration referenced from an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminologyRef {
    ValueSet(String),
    CodeSystem(String),
}

/// `Code`s carried by a code, concept, coding-shaped tuple or list of those
pub fn codes_of(value: &Value) -> Vec<Code> {
    match value {
        Value::List(items) => items.iter().flat_map(codes_of).collect(),
        other => other.as_concept().map(|c| c.codes.into_vec()).unwrap_or_default(),
    }
}

/// Whether the coded value is in the code system. A known code system
/// decides by its contents; otherwise the code's system must match.
fn in_code_system(value: &Value, url: &str, ctx: &EvaluationContext) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let codes = codes_of(value);
    let member = |code: &Code| {
        if code.system.as_deref().is_some_and(|s| s != url) {
            return false;
        }
        match ctx.terminology().and_then(|t| t.code_system_contains(url, &code.code)) {
            Some(known) => known,
            None => code.system.as_deref() == Some(url),
        }
    };
    Value::Boolean(codes.iter().any(member))
}

/// `AgeInYears()`-style unit from a function name suffix
pub fn age_unit(suffix: &str) -> Option<TemporalUnit> {
    Some(match suffix {
        "Years" => TemporalUnit::Year,
        "Months" => TemporalUnit::Month,
        "Weeks" => TemporalUnit::Week,
        "Days" => TemporalUnit::Day,
        "Hours" => TemporalUnit::Hour,
        "Minutes" => TemporalUnit::Minute,
        "Seconds" => TemporalUnit::Second,
        _ => return None,
    })
}

/// Whole `unit`s elapsed from `birth` to `as_of`
pub fn calculate_age(birth: &Value, as_of: &Value, unit: TemporalUnit) -> EvalResult<Value> {
    let birth = match birth {
        Value::String(_) => match coerce(birth, &ValueType::Date) {
            Value::Null => coerce(birth, &ValueType::DateTime),
            date => date,
        },
        other => other.clone(),
    };
    datetime::between(&birth, as_of, unit, false)
}

impl Engine {
    /// Resolve `"Name"` or `Alias."Name"` to a declared value set or code
    /// system without evaluating anything
    pub fn terminology_ref(&self, expr: &Spanned<Expression>, ctx: &EvaluationContext) -> Option<TerminologyRef> {
        let library = ctx.current_library()?;
        match &expr.inner {
            Expression::IdentifierRef(id) if ctx.lookup(&id.name).is_none() => {
                if let Some(vs) = library.valueset(&id.name) {
                    return Some(TerminologyRef::ValueSet(vs.id.clone()));
                }
                library.codesystem(&id.name).map(|cs| TerminologyRef::CodeSystem(cs.id.clone()))
            }
            Expression::Property(p) => {
                let Expression::IdentifierRef(alias) = &p.source.inner else {
                    return None;
                };
                if ctx.lookup(&alias.name).is_some() {
                    return None;
                }
                let included = library.include(&alias.name)?;
                if let Some(vs) = included.valueset(&p.name) {
                    return Some(TerminologyRef::ValueSet(vs.id.clone()));
                }
                included.codesystem(&p.name).map(|cs| TerminologyRef::CodeSystem(cs.id.clone()))
            }
            _ => None,
        }
    }

    pub fn expand_valueset(&self, url: &str, ctx: &EvaluationContext) -> EvalResult<Vec<Code>> {
        ctx.terminology()
            .and_then(|t| t.expand(url))
            .ok_or_else(|| DataSourceError::UnknownValueSet(url.to_string()).into())
    }

    /// Membership of a value in a terminology reference
    pub fn terminology_membership(
        &self,
        value: &Value,
        reference: &TerminologyRef,
        ctx: &EvaluationContext,
    ) -> EvalResult<Value> {
        match reference {
            TerminologyRef::ValueSet(url) => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let codes = self.expand_valueset(url, ctx)?;
                Ok(boolean(value_in_codes(value, &codes)))
            }
            TerminologyRef::CodeSystem(url) => Ok(in_code_system(value, url, ctx)),
        }
    }

    /// `InValueSet(code, vs)`, `memberOf(url)` and friends where the set is a
    /// computed value: a url string or an already expanded list of codes
    pub fn membership_of_value(&self, value: &Value, set: &Value, ctx: &EvaluationContext) -> EvalResult<Value> {
        match set {
            Value::Null => Ok(Value::Null),
            Value::String(url) => self.terminology_membership(value, &TerminologyRef::ValueSet(url.clone()), ctx),
            other => Ok(boolean(value_in_codes(value, &codes_of(other)))),
        }
    }

    /// Membership test for `in` / `InValueSet` / `InCodeSystem` with the set
    /// given as an expression
    pub fn eval_terminology_in(
        &self,
        value: &Value,
        set: &Spanned<Expression>,
        code_system: bool,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Value> {
        if let Some(reference) = self.terminology_ref(set, ctx) {
            return self.terminology_membership(value, &reference, ctx);
        }
        let set = singleton(self.evaluate(set, ctx)?, "in")?;
        match (&set, code_system) {
            (Value::String(url), true) => Ok(in_code_system(value, url, ctx)),
            (Value::Tuple(t), true) => match t.get("id").and_then(Value::as_str) {
                Some(url) => Ok(in_code_system(value, url, ctx)),
                None => Ok(Value::Null),
            },
            _ => self.membership_of_value(value, &set, ctx),
        }
    }

    pub fn eval_retrieve(&self, retrieve: &Retrieve, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let mut request = RetrieveRequest::new(retrieve.data_type.name.clone());
        if let (Some(context), Some(subject)) = (ctx.context_name(), ctx.subject()) {
            request = request.with_subject(context.to_string(), subject.clone());
        }
        request.code_path = retrieve.code_path.clone();
        request.comparator = retrieve.code_comparator;
        request.date_path = retrieve.date_path.clone();

        if let Some(codes) = &retrieve.codes {
            match self.terminology_ref(codes, ctx) {
                Some(TerminologyRef::ValueSet(url)) => match ctx.terminology().and_then(|t| t.expand(&url)) {
                    Some(expansion) => request = request.with_codes(expansion).with_valueset(url),
                    None => request = request.with_valueset(url),
                },
                Some(TerminologyRef::CodeSystem(url)) => {
                    return Err(EvalError::type_error(
                        "retrieve",
                        format!("code system '{url}' cannot be used as a retrieve filter"),
                    ));
                }
                None => match self.evaluate(codes, ctx)? {
                    Value::Null => return Ok(Value::List(Vec::new())),
                    Value::String(url) => request = request.with_valueset(url),
                    other => request = request.with_codes(codes_of(&other)),
                },
            }
        }

        if let Some(range) = &retrieve.date_range {
            request.date_range = match singleton(self.evaluate(range, ctx)?, "retrieve")? {
                Value::Null => None,
                Value::Interval(i) => Some(i),
                point => Some(Interval::closed(point.clone(), point)),
            };
        }

        let Some(source) = ctx.data_source() else {
            log::warn!("retrieve of {} without a data source returns no records", request.data_type);
            return Ok(Value::List(Vec::new()));
        };
        log::debug!("retrieving {}", request.data_type);
        let records = source.retrieve(&request)?;
        Ok(Value::List(records))
    }

    /// `AgeInYears()` and friends: age of the context subject, now or at `as_of`
    pub fn subject_age(&self, unit: TemporalUnit, as_of: Option<Value>, ctx: &EvaluationContext) -> EvalResult<Value> {
        let Some(birth) = ctx.subject().and_then(|s| s.get("birthDate")).cloned() else {
            return Ok(Value::Null);
        };
        let as_of = match as_of {
            Some(v) => v,
            None if matches!(unit, TemporalUnit::Hour | TemporalUnit::Minute | TemporalUnit::Second) => {
                Value::DateTime(ctx.now())
            }
            None => Value::Date(ctx.today()),
        };
        calculate_age(&birth, &as_of, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminology::InMemoryTerminology;
    use medql_types::{Concept, Date};
    use std::sync::Arc;

    fn snomed(code: &str) -> Code {
        Code::new(code, "http://snomed.info/sct")
    }

    #[test]
    fn test_codes_of_flattens() {
        let value = Value::List(vec![
            Value::Code(snomed("1")),
            Value::Concept(Concept::new([snomed("2"), snomed("3")], None)),
        ]);
        assert_eq!(codes_of(&value).len(), 3);
    }

    #[test]
    fn test_code_system_membership() {
        let mut terminology = InMemoryTerminology::new();
        terminology.add_code_system("http://snomed.info/sct", ["1"]);
        let ctx = EvaluationContext::builder().terminology(Arc::new(terminology)).build();
        let url = "http://snomed.info/sct";
        assert_eq!(in_code_system(&Value::Code(snomed("1")), url, &ctx), Value::Boolean(true));
        assert_eq!(in_code_system(&Value::Code(snomed("2")), url, &ctx), Value::Boolean(false));
        assert_eq!(in_code_system(&Value::Null, url, &ctx), Value::Null);

        let bare = EvaluationContext::new();
        assert_eq!(in_code_system(&Value::Code(snomed("9")), url, &bare), Value::Boolean(true));
    }

    #[test]
    fn test_unknown_valueset_is_an_error() {
        let engine = Engine::new();
        let ctx = EvaluationContext::new();
        let err = engine.expand_valueset("http://example.org/vs/none", &ctx).err();
        assert!(matches!(err, Some(EvalError::DataSource(DataSourceError::UnknownValueSet(_)))));
    }

    #[test]
    fn test_calculate_age() {
        let birth = Value::string("1980-05-01");
        let as_of = Value::Date(Date::ymd(2024, 4, 30).unwrap_or(Date::MIN));
        assert_eq!(calculate_age(&birth, &as_of, TemporalUnit::Year).ok(), Some(Value::Integer(43)));
        assert_eq!(age_unit("Months"), Some(TemporalUnit::Month));
        assert_eq!(age_unit("Fortnights"), None);
    }
}
