//! Translate command: library source to the JSON interchange format

use super::output;
use super::validate::format_diagnostic;
use anyhow::{Context, Result, bail};
use medql_diagnostics::MedqlError;
use std::fs;
use std::path::PathBuf;

pub struct TranslateConfig {
    pub file: PathBuf,
    pub pretty: bool,
    pub output_file: Option<PathBuf>,
}

pub fn translate(config: TranslateConfig) -> Result<()> {
    let document = translate_file(&config)?;
    output::write_output(&document, config.output_file.as_deref())
}

/// Interchange text for the configured file. Syntax errors are listed with
/// their locations.
pub fn translate_file(config: &TranslateConfig) -> Result<String> {
    let text =
        fs::read_to_string(&config.file).with_context(|| format!("Failed to read {}", config.file.display()))?;
    let library = match medql_parser::parse_library(&text) {
        Ok(library) => library,
        Err(errors) => {
            let listing: Vec<String> = MedqlError::Syntax(errors)
                .diagnostics()
                .iter()
                .map(|d| format_diagnostic(&config.file, d))
                .collect();
            bail!("{} has syntax errors:\n{}", config.file.display(), listing.join("\n"));
        }
    };
    log::debug!(
        "translating library {} with {} statement(s)",
        library.name().unwrap_or("(anonymous)"),
        library.statements.len()
    );
    Ok(medql_elm::library_to_string(&library, config.pretty)?)
}
