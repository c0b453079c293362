//! Eval command: a path expression against one resource

use super::output::{self, OutputFormat};
use super::run::parse_parameters;
use anyhow::{Context, Result};
use medql_eval::{Engine, EvaluationContext, InMemoryDataSource};
use medql_types::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

pub struct EvalConfig {
    pub expression: String,
    /// JSON resource or Bundle; without one the expression sees an empty
    /// input
    pub resource: Option<PathBuf>,
    /// `%name` constants as `name=value`
    pub constants: Vec<String>,
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
}

pub fn eval(config: EvalConfig) -> Result<()> {
    let result = evaluate(&config)?;
    let content = match config.format {
        OutputFormat::Text => result.to_string(),
        OutputFormat::Json => output::format_json(&result.to_json(), true)?,
        OutputFormat::Table => {
            let items = result.into_collection();
            let named: Vec<(String, Result<Value, medql_eval::EvalError>)> = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), Ok(item)))
                .collect();
            output::format_results(named.iter().map(|(n, r)| (n.as_str(), r)), OutputFormat::Table)?
        }
    };
    output::write_output(&content, config.output_file.as_deref())
}

/// Evaluate the configured expression. A Bundle input also serves as the
/// data source, so `resolve()` can follow references between its entries.
pub fn evaluate(config: &EvalConfig) -> Result<Value> {
    let mut builder = EvaluationContext::builder();
    let resource = match &config.resource {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            let json: serde_json::Value =
                serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))?;
            builder = builder.data_source(Arc::new(InMemoryDataSource::from_json(&json)));
            Value::from_json(&json)
        }
        None => Value::Null,
    };
    for (name, value) in parse_parameters(&config.constants)? {
        builder = builder.constant(name, value);
    }
    let mut ctx = builder.build();
    let value = Engine::new().evaluate_path_in(&config.expression, &resource, &mut ctx)?;
    Ok(value)
}
