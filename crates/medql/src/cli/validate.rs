//! Validate command: syntax, includes and duplicate definitions

use super::{output, resolver};
use anyhow::{Context, Result, bail};
use colored::Colorize;
use medql_diagnostics::{Diagnostic, MedqlError};
use medql_eval::LibraryManager;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ValidateConfig {
    pub files: Vec<PathBuf>,
    pub library_paths: Vec<PathBuf>,
}

/// Diagnostics for one file; empty when it is valid
pub struct FileReport {
    pub file: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

impl FileReport {
    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

pub fn validate(config: ValidateConfig) -> Result<()> {
    if config.files.is_empty() {
        bail!("No files specified for validation");
    }
    let reports = validate_files(&config)?;
    for report in &reports {
        print_report(report);
    }

    let invalid = reports.iter().filter(|r| !r.is_valid()).count();
    let errors: usize = reports.iter().map(|r| r.diagnostics.len()).sum();
    println!();
    if invalid == 0 {
        println!("{}", output::format_success(&format!("{} file(s) valid", reports.len())));
        Ok(())
    } else {
        bail!("{errors} error(s) in {invalid} of {} file(s)", reports.len())
    }
}

pub fn validate_files(config: &ValidateConfig) -> Result<Vec<FileReport>> {
    config
        .files
        .iter()
        .map(|file| {
            let manager =
                resolver::library_manager(resolver::search_paths(&config.library_paths, Some(file)));
            validate_file(&manager, file)
        })
        .collect()
}

/// Parse the file, then link it so missing or circular includes and
/// duplicate names are reported too
pub fn validate_file(manager: &LibraryManager, file: &Path) -> Result<FileReport> {
    let text = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let library = if resolver::is_interchange(file) {
        medql_elm::library_from_str(&text)
    } else {
        medql_parser::parse_library(&text).map_err(MedqlError::Syntax)
    };
    let diagnostics = match library.and_then(|library| manager.compile(library)) {
        Ok(_) => Vec::new(),
        Err(e) => e.diagnostics(),
    };
    Ok(FileReport {
        file: file.to_path_buf(),
        diagnostics,
    })
}

/// `file:line:col: CODE message`, or `file: CODE message` without a
/// location
pub fn format_diagnostic(file: &Path, diagnostic: &Diagnostic) -> String {
    let file = file.display().to_string();
    let place = match &diagnostic.location {
        Some(location) => output::format_location(&file, location.line, location.column),
        None => file.cyan().to_string(),
    };
    format!("{place}: {} {}", diagnostic.code.to_string().red(), diagnostic.message)
}

fn print_report(report: &FileReport) {
    if report.is_valid() {
        println!("{} {}", "✓".green(), report.file.display());
        return;
    }
    println!("{} {}", "✗".red(), report.file.display());
    for diagnostic in &report.diagnostics {
        println!("  {}", format_diagnostic(&report.file, diagnostic));
        if let Some(help) = &diagnostic.help {
            println!("    {} {help}", "help:".blue());
        }
    }
}
