//! Run command: evaluate a library's definitions for each subject

use super::output::{self, OutputFormat};
use super::resolver;
use anyhow::{Context, Result, bail};
use colored::Colorize;
use indexmap::IndexMap;
use medql_eval::{
    DataSource, Engine, EvalResult, EvaluationContext, InMemoryDataSource, InMemoryTerminology, RetrieveRequest,
    TerminologyProvider,
};
use medql_types::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct RunConfig {
    /// Library source (`.cql`) or interchange document (`.json`)
    pub file: PathBuf,
    /// Resource or Bundle to retrieve from
    pub data: Option<PathBuf>,
    /// ValueSet resources (or Bundles of them) with expansions
    pub terminology: Vec<PathBuf>,
    /// Only evaluate for the subject with this id
    pub subject: Option<String>,
    /// Parameter values as `name=value`
    pub params: Vec<String>,
    /// Definitions to evaluate; all public ones when empty
    pub defines: Vec<String>,
    pub library_paths: Vec<PathBuf>,
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
}

/// Results for one subject, in definition order
pub struct SubjectRun {
    /// `Type/id` of the subject, `None` for an unfiltered run
    pub subject: Option<String>,
    pub results: IndexMap<String, EvalResult<Value>>,
}

impl SubjectRun {
    pub fn failures(&self) -> usize {
        self.results.values().filter(|r| r.is_err()).count()
    }
}

pub fn run(config: RunConfig) -> Result<()> {
    let runs = evaluate(&config)?;
    let content = format_runs(&runs, config.format)?;
    output::write_output(&content, config.output_file.as_deref())?;

    let failures: usize = runs.iter().map(SubjectRun::failures).sum();
    if failures > 0 {
        eprintln!(
            "{}",
            output::format_warning(&format!("{failures} definition(s) failed to evaluate"))
        );
    }
    Ok(())
}

/// Compile the library, load data and evaluate for every subject
pub fn evaluate(config: &RunConfig) -> Result<Vec<SubjectRun>> {
    let manager = resolver::library_manager(resolver::search_paths(&config.library_paths, Some(&config.file)));
    let library = resolver::load_library(&manager, &config.file)?;

    let terminology = load_terminology(&config.terminology)?;
    let data = config
        .data
        .as_deref()
        .map(|path| load_data(path, terminology.clone()))
        .transpose()?;
    let parameters = parse_parameters(&config.params)?;
    for name in &config.defines {
        if library.definition(name).is_none() {
            bail!("Library has no definition named '{name}'");
        }
    }

    let context = library.context().map(str::to_string);
    let subjects = match &context {
        Some(context) => subjects(data.as_deref(), context, config.subject.as_deref())?,
        None => Vec::new(),
    };
    let subjects: Vec<Option<Value>> = if subjects.is_empty() {
        log::info!("no subjects found, evaluating once without a subject");
        vec![None]
    } else {
        subjects.into_iter().map(Some).collect()
    };

    let engine = Engine::new();
    let runs = subjects
        .into_iter()
        .map(|subject| {
            let label = subject.as_ref().map(subject_label);
            log::debug!("evaluating for {}", label.as_deref().unwrap_or("no subject"));

            let mut builder = EvaluationContext::builder().parameters(parameters.clone());
            if let Some(context) = &context {
                builder = builder.context_name(context.clone());
            }
            if let Some(subject) = subject {
                builder = builder.subject(subject);
            }
            if let Some(data) = &data {
                builder = builder.data_source(data.clone());
            }
            if let Some(terminology) = &terminology {
                builder = builder.terminology(terminology.clone());
            }
            let mut ctx = builder.build();

            let results = if config.defines.is_empty() {
                engine.evaluate_all(&library, &mut ctx)
            } else {
                config
                    .defines
                    .iter()
                    .map(|name| (name.clone(), engine.evaluate_definition(&library, name, &mut ctx)))
                    .collect()
            };
            SubjectRun { subject: label, results }
        })
        .collect();
    Ok(runs)
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn load_data(path: &Path, terminology: Option<Arc<dyn TerminologyProvider>>) -> Result<Arc<InMemoryDataSource>> {
    let mut source = InMemoryDataSource::from_json(&read_json(path)?);
    log::info!("loaded {} resource(s) from {}", source.len(), path.display());
    if let Some(terminology) = terminology {
        source = source.with_terminology(terminology);
    }
    Ok(Arc::new(source))
}

fn load_terminology(paths: &[PathBuf]) -> Result<Option<Arc<dyn TerminologyProvider>>> {
    if paths.is_empty() {
        return Ok(None);
    }
    let mut terminology = InMemoryTerminology::new();
    for path in paths {
        let resources = InMemoryDataSource::from_json(&read_json(path)?).retrieve(&RetrieveRequest::new("ValueSet"))?;
        if resources.is_empty() {
            bail!("No ValueSet resources in {}", path.display());
        }
        for resource in &resources {
            if !terminology.add_valueset_resource(resource) {
                log::warn!("skipping ValueSet without url in {}", path.display());
            }
        }
    }
    Ok(Some(Arc::new(terminology)))
}

/// Every resource of the context type, or only the one with the requested
/// id
fn subjects(data: Option<&InMemoryDataSource>, context: &str, wanted: Option<&str>) -> Result<Vec<Value>> {
    let Some(data) = data else {
        if let Some(id) = wanted {
            bail!("Subject '{id}' requested but no data was given");
        }
        return Ok(Vec::new());
    };
    let mut subjects = data.retrieve(&RetrieveRequest::new(context))?;
    if let Some(id) = wanted {
        subjects.retain(|s| s.get("id").and_then(Value::as_str) == Some(id));
        if subjects.is_empty() {
            bail!("No {context} with id '{id}' in the data");
        }
    }
    Ok(subjects)
}

fn subject_label(subject: &Value) -> String {
    let kind = subject.resource_type().unwrap_or("Resource");
    match subject.get("id").and_then(Value::as_str) {
        Some(id) => format!("{kind}/{id}"),
        None => kind.to_string(),
    }
}

/// Parse `name=value` pairs. The value is read as JSON when it is valid
/// JSON, then as a literal expression such as `@2024-01-01` or
/// `Interval[1, 5]`, and otherwise kept as a plain string.
pub fn parse_parameters(params: &[String]) -> Result<Vec<(String, Value)>> {
    let engine = Engine::new();
    params
        .iter()
        .map(|param| {
            let Some((name, raw)) = param.split_once('=') else {
                bail!("Invalid parameter format: '{param}'. Expected 'name=value'");
            };
            let name = name.trim();
            if name.is_empty() {
                bail!("Invalid parameter format: '{param}'. Missing name");
            }
            let raw = raw.trim();
            let value = match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(json) => Value::from_json(&json),
                Err(_) => engine
                    .evaluate_source(raw, &mut EvaluationContext::new())
                    .unwrap_or_else(|_| Value::string(raw)),
            };
            Ok((name.to_string(), value))
        })
        .collect()
}

/// Render every run. A single unfiltered run prints its results directly.
pub fn format_runs(runs: &[SubjectRun], format: OutputFormat) -> Result<String> {
    let results = |run: &SubjectRun| {
        output::format_results(run.results.iter().map(|(name, result)| (name.as_str(), result)), format)
    };
    match (runs, format) {
        ([single], _) if single.subject.is_none() => results(single),
        (_, OutputFormat::Json) => {
            let object: serde_json::Map<String, serde_json::Value> = runs
                .iter()
                .map(|run| {
                    let values = run
                        .results
                        .iter()
                        .map(|(name, result)| (name.clone(), output::result_json(result)))
                        .collect();
                    (
                        run.subject.clone().unwrap_or_default(),
                        serde_json::Value::Object(values),
                    )
                })
                .collect();
            output::format_json(&serde_json::Value::Object(object), true)
        }
        _ => {
            let sections = runs
                .iter()
                .map(|run| -> Result<String> {
                    let header = run.subject.as_deref().unwrap_or("(no subject)").bold().underline();
                    Ok(format!("{header}\n{}", results(run)?))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(sections.join("\n\n"))
        }
    }
}
