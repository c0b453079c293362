//! Output formatting utilities

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use medql_eval::EvalError;
use medql_types::Value;
use std::fs;
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// How results are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// `name: value` lines using the language's literal syntax
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
    /// A bordered table
    Table,
}

/// When to colorize output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

pub fn setup_colors(mode: ColorMode) {
    match mode {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }
}

pub fn format_error(error: &anyhow::Error) -> String {
    format!("{} {error:#}", "Error:".red().bold())
}

pub fn format_warning(warning: &str) -> String {
    format!("{} {warning}", "Warning:".yellow().bold())
}

pub fn format_success(message: &str) -> String {
    format!("{} {message}", "Success:".green().bold())
}

/// `file:line:col` with the file highlighted
pub fn format_location(file: &str, line: usize, col: usize) -> String {
    format!("{}:{line}:{col}", file.cyan())
}

/// Write to a file when one is given, stdout otherwise
pub fn write_output(content: &str, output_file: Option<&Path>) -> Result<()> {
    match output_file {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("Failed to write output file: {}", path.display()))?;
            eprintln!("{}", format_success(&format!("Output written to {}", path.display())));
        }
        None => println!("{content}"),
    }
    Ok(())
}

pub fn format_json(value: &serde_json::Value, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(value).context("Failed to serialize JSON")
    } else {
        serde_json::to_string(value).context("Failed to serialize JSON")
    }
}

/// One evaluated definition or expression
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Result")]
    result: String,
}

/// Render named results. Failed entries show their error in place of a
/// value.
pub fn format_results<'a>(
    results: impl IntoIterator<Item = (&'a str, &'a Result<Value, EvalError>)>,
    format: OutputFormat,
) -> Result<String> {
    let results: Vec<_> = results.into_iter().collect();
    match format {
        OutputFormat::Text => Ok(results
            .iter()
            .map(|(name, result)| match result {
                Ok(value) => format!("{}: {value}", name.bold()),
                Err(e) => format!("{}: {} {e}", name.bold(), "error".red()),
            })
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => {
            let object: serde_json::Map<String, serde_json::Value> = results
                .iter()
                .map(|(name, result)| ((*name).to_string(), result_json(result)))
                .collect();
            format_json(&serde_json::Value::Object(object), true)
        }
        OutputFormat::Table => {
            let rows = results.iter().map(|(name, result)| ResultRow {
                name: (*name).to_string(),
                result: match result {
                    Ok(value) => value.to_string(),
                    Err(e) => format!("error: {e}"),
                },
            });
            Ok(Table::new(rows).with(Style::modern()).to_string())
        }
    }
}

/// JSON for a single result; errors become `{"error": ...}`
pub fn result_json(result: &Result<Value, EvalError>) -> serde_json::Value {
    match result {
        Ok(value) => value.to_json(),
        Err(e) => serde_json::json!({ "error": e.to_string(), "kind": e.kind().to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<(String, Result<Value, EvalError>)> {
        vec![
            ("Count".to_string(), Ok(Value::Integer(3))),
            ("Missing".to_string(), Err(EvalError::undefined_reference("Foo"))),
        ]
    }

    #[test]
    fn test_text_format() {
        colored::control::set_override(false);
        let sample = sample();
        let text = format_results(sample.iter().map(|(n, r)| (n.as_str(), r)), OutputFormat::Text)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(text, "Count: 3\nMissing: error Undefined reference: Foo");
    }

    #[test]
    fn test_json_format() {
        let sample = sample();
        let text = format_results(sample.iter().map(|(n, r)| (n.as_str(), r)), OutputFormat::Json)
            .unwrap_or_else(|e| panic!("{e}"));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(value["Count"], 3);
        assert_eq!(value["Missing"]["kind"], "ReferenceError");
    }

    #[test]
    fn test_table_format() {
        let sample = sample();
        let table = format_results(sample.iter().map(|(n, r)| (n.as_str(), r)), OutputFormat::Table)
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(table.contains("Name"));
        assert!(table.contains("Count"));
        assert!(table.contains("Undefined reference: Foo"));
    }
}
