//! Plugin function registry
//!
//! Host functions registered here are the last stop of function dispatch,
//! after the built-in table and the user-defined functions of the active
//! library. Each plugin declares its parameter types and, optionally, its
//! return type; arguments are checked before the call.

use crate::error::{EvalError, EvalResult};
use medql_types::{Value, ValueType, is_type};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type alias for plugin implementations
pub type PluginFn = Arc<dyn Fn(&[Value]) -> EvalResult<Value> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParameter {
    pub name: String,
    pub ty: ValueType,
    pub optional: bool,
}

impl FunctionParameter {
    pub fn required(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: true,
        }
    }
}

#[derive(Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub params: Vec<FunctionParameter>,
    pub return_type: Option<ValueType>,
    pub implementation: PluginFn,
}

impl fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

impl FunctionDefinition {
    pub fn new<F>(name: impl Into<String>, params: Vec<FunctionParameter>, implementation: F) -> Self
    where
        F: Fn(&[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params,
            return_type: None,
            implementation: Arc::new(implementation),
        }
    }

    pub fn returns(mut self, ty: ValueType) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn min_arity(&self) -> usize {
        self.params.iter().filter(|p| !p.optional).count()
    }

    pub fn max_arity(&self) -> usize {
        self.params.len()
    }

    pub fn accepts(&self, arity: usize) -> bool {
        (self.min_arity()..=self.max_arity()).contains(&arity)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    functions: HashMap<String, Vec<FunctionDefinition>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. Several definitions may share a name as long as
    /// their arities differ.
    pub fn register(&mut self, definition: FunctionDefinition) {
        log::debug!("registering plugin function {}", definition.name);
        self.functions.entry(definition.name.clone()).or_default().push(definition);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn get(&self, name: &str, arity: usize) -> Option<&FunctionDefinition> {
        self.functions.get(name)?.iter().find(|f| f.accepts(arity))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Check the arguments against the declared parameter types and run
    /// the function. Null passes every type check.
    pub fn call(&self, name: &str, args: &[Value]) -> EvalResult<Value> {
        let definition = self
            .get(name, args.len())
            .ok_or_else(|| EvalError::undefined_function(name, args.len()))?;
        for (param, arg) in definition.params.iter().zip(args) {
            if !arg.is_null() && !is_type(arg, &param.ty) {
                return Err(EvalError::plugin(
                    name,
                    format!("argument '{}' expects {}, got {}", param.name, param.ty, arg.type_name()),
                ));
            }
        }
        log::debug!("calling plugin function {name} with {} argument(s)", args.len());
        let result = (definition.implementation)(args).map_err(|e| match e {
            EvalError::Plugin { .. } => e,
            other => EvalError::plugin(name, other.to_string()),
        })?;
        if let Some(ty) = &definition.return_type {
            if !result.is_null() && !is_type(&result, ty) {
                return Err(EvalError::plugin(
                    name,
                    format!("returned {} where {ty} was declared", result.type_name()),
                ));
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry.register(
            FunctionDefinition::new(
                "BMI",
                vec![
                    FunctionParameter::required("weight", ValueType::Decimal),
                    FunctionParameter::required("height", ValueType::Decimal),
                ],
                |args| match (args[0].as_decimal(), args[1].as_decimal()) {
                    (Some(w), Some(h)) if !h.is_zero() => Ok(Value::Decimal((w / (h * h)).round_dp(1))),
                    _ => Ok(Value::Null),
                },
            )
            .returns(ValueType::Decimal),
        );
        registry
    }

    #[test]
    fn test_call_checks_types() {
        let registry = registry();
        let bmi = registry.call(
            "BMI",
            &[Value::Decimal(rust_decimal::Decimal::new(810, 1)), Value::Decimal(rust_decimal::Decimal::new(180, 2))],
        );
        assert_eq!(bmi.ok(), Some(Value::Decimal(rust_decimal::Decimal::new(250, 1))));

        let wrong = registry.call("BMI", &[Value::string("heavy"), Value::Null]);
        assert!(matches!(wrong, Err(EvalError::Plugin { .. })));
    }

    #[test]
    fn test_unknown_plugin_is_a_reference_error() {
        let err = registry().call("Nope", &[]).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Reference));
    }

    #[test]
    fn test_failures_are_wrapped() {
        let mut registry = PluginRegistry::new();
        registry.register(FunctionDefinition::new("Boom", vec![], |_| Err(EvalError::evaluation("kaput"))));
        match registry.call("Boom", &[]) {
            Err(EvalError::Plugin { name, message }) => {
                assert_eq!(name, "Boom");
                assert!(message.contains("kaput"));
            }
            other => panic!("expected plugin error, got {other:?}"),
        }
    }
}
