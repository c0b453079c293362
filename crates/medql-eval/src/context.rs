//! Evaluation context
//!
//! One context is built per subject. It owns everything that changes during
//! an evaluation: the definition cache, alias scopes, iteration frames and
//! depth counters. Compiled libraries stay immutable and may be shared by
//! many contexts at once.

use crate::library::CompiledLibrary;
use crate::retrieve::DataSource;
use crate::terminology::TerminologyProvider;
use indexmap::IndexMap;
use medql_types::{Date, DateTime, Time, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Hit and miss counts of the definition cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Names bound by a query row, a `let`, a function call or an aggregate
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: IndexMap<String, Value>,
}

impl Scope {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// `$this`, `$index` and `$total` of the innermost iteration
#[derive(Debug, Clone, Default)]
pub struct IterationFrame {
    pub this: Value,
    pub index: Option<usize>,
    pub total: Option<Value>,
}

impl IterationFrame {
    pub fn focus(this: Value) -> Self {
        Self {
            this,
            index: None,
            total: None,
        }
    }
}

type DefinitionKey = (u64, String);

/// State moved out while a definition or function body runs
pub(crate) struct SavedScopes {
    scopes: Vec<Scope>,
    frames: Vec<IterationFrame>,
}

pub struct EvaluationContext {
    subject: Option<Value>,
    context_name: Option<String>,
    now: DateTime,
    parameters: HashMap<String, Value>,
    constants: HashMap<String, Value>,
    data_source: Option<Arc<dyn DataSource>>,
    terminology: Option<Arc<dyn TerminologyProvider>>,

    definitions: HashMap<DefinitionKey, Value>,
    parameter_defaults: HashMap<DefinitionKey, Value>,
    in_progress: HashSet<DefinitionKey>,
    stats: CacheStats,

    scopes: Vec<Scope>,
    frames: Vec<IterationFrame>,
    libraries: Vec<Arc<CompiledLibrary>>,
    root: Option<Value>,
    pub(crate) call_depth: usize,
    pub(crate) expr_depth: usize,
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EvaluationContextBuilder {
        EvaluationContextBuilder::default()
    }

    pub fn subject(&self) -> Option<&Value> {
        self.subject.as_ref()
    }

    pub fn context_name(&self) -> Option<&str> {
        self.context_name.as_deref()
    }

    /// Frozen for the lifetime of the context
    pub fn now(&self) -> DateTime {
        self.now
    }

    pub fn today(&self) -> Date {
        self.now.date()
    }

    pub fn time_of_day(&self) -> Option<Time> {
        self.now.time()
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.insert(name.into(), value);
    }

    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    pub fn data_source(&self) -> Option<&Arc<dyn DataSource>> {
        self.data_source.as_ref()
    }

    pub fn terminology(&self) -> Option<&Arc<dyn TerminologyProvider>> {
        self.terminology.as_ref()
    }

    pub fn definition_cache_stats(&self) -> CacheStats {
        self.stats
    }

    // === Definition cache ===

    pub(crate) fn cached_definition(&mut self, library: u64, name: &str) -> Option<Value> {
        let key = (library, name.to_string());
        match self.definitions.get(&key) {
            Some(value) => {
                self.stats.hits += 1;
                log::trace!("definition cache hit: {name}");
                Some(value.clone())
            }
            None => {
                self.stats.misses += 1;
                log::trace!("definition cache miss: {name}");
                None
            }
        }
    }

    pub(crate) fn cache_definition(&mut self, library: u64, name: &str, value: Value) {
        self.definitions.insert((library, name.to_string()), value);
    }

    /// Marks a definition as being evaluated. Returns false when it already
    /// is, which means the definition refers to itself.
    pub(crate) fn begin_definition(&mut self, library: u64, name: &str) -> bool {
        self.in_progress.insert((library, name.to_string()))
    }

    pub(crate) fn end_definition(&mut self, library: u64, name: &str) {
        self.in_progress.remove(&(library, name.to_string()));
    }

    pub(crate) fn parameter_default(&self, library: u64, name: &str) -> Option<&Value> {
        self.parameter_defaults.get(&(library, name.to_string()))
    }

    pub(crate) fn cache_parameter_default(&mut self, library: u64, name: &str, value: Value) {
        self.parameter_defaults.insert((library, name.to_string()), value);
    }

    // === Scopes ===

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind in the innermost scope, opening one if none exists
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if self.scopes.is_empty() {
            self.push_scope();
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.into(), value);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub fn push_frame(&mut self, frame: IterationFrame) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub fn frame(&self) -> Option<&IterationFrame> {
        self.frames.last()
    }

    /// `$this` of the innermost iteration, the input of a path expression
    pub fn focus(&self) -> Option<&Value> {
        self.frame().map(|f| &f.this)
    }

    /// `%resource`: the resource a path expression started from, else the subject
    pub fn root(&self) -> Option<&Value> {
        self.root.as_ref().or(self.subject.as_ref())
    }

    /// A path expression is being evaluated; `=` and `!=` then give empty
    /// for an empty operand
    pub(crate) fn in_path(&self) -> bool {
        self.root.is_some()
    }

    pub(crate) fn set_root(&mut self, root: Option<Value>) -> Option<Value> {
        std::mem::replace(&mut self.root, root)
    }

    /// Detach local names so a definition or function body cannot see the
    /// caller's aliases
    pub(crate) fn isolate(&mut self) -> SavedScopes {
        SavedScopes {
            scopes: std::mem::take(&mut self.scopes),
            frames: std::mem::take(&mut self.frames),
        }
    }

    pub(crate) fn restore(&mut self, saved: SavedScopes) {
        self.scopes = saved.scopes;
        self.frames = saved.frames;
    }

    // === Libraries ===

    pub fn current_library(&self) -> Option<&Arc<CompiledLibrary>> {
        self.libraries.last()
    }

    pub(crate) fn push_library(&mut self, library: Arc<CompiledLibrary>) {
        self.libraries.push(library);
    }

    pub(crate) fn pop_library(&mut self) {
        self.libraries.pop();
    }
}

#[derive(Default)]
pub struct EvaluationContextBuilder {
    subject: Option<Value>,
    context_name: Option<String>,
    now: Option<DateTime>,
    parameters: HashMap<String, Value>,
    constants: HashMap<String, Value>,
    data_source: Option<Arc<dyn DataSource>>,
    terminology: Option<Arc<dyn TerminologyProvider>>,
}

impl EvaluationContextBuilder {
    /// The resource the evaluation is about. Its `resourceType` becomes the
    /// context name unless one is set explicitly.
    pub fn subject(mut self, subject: Value) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn context_name(mut self, name: impl Into<String>) -> Self {
        self.context_name = Some(name.into());
        self
    }

    pub fn now(mut self, now: DateTime) -> Self {
        self.now = Some(now);
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn parameters(mut self, parameters: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn data_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.data_source = Some(source);
        self
    }

    pub fn terminology(mut self, terminology: Arc<dyn TerminologyProvider>) -> Self {
        self.terminology = Some(terminology);
        self
    }

    /// External constant available as `%name`
    pub fn constant(mut self, name: impl Into<String>, value: Value) -> Self {
        self.constants.insert(name.into(), value);
        self
    }

    pub fn build(self) -> EvaluationContext {
        let context_name = self
            .context_name
            .or_else(|| self.subject.as_ref().and_then(Value::resource_type).map(str::to_string));
        EvaluationContext {
            subject: self.subject,
            context_name,
            now: self.now.unwrap_or_else(DateTime::now),
            parameters: self.parameters,
            constants: self.constants,
            data_source: self.data_source,
            terminology: self.terminology,
            definitions: HashMap::new(),
            parameter_defaults: HashMap::new(),
            in_progress: HashSet::new(),
            stats: CacheStats::default(),
            scopes: Vec::new(),
            frames: Vec::new(),
            libraries: Vec::new(),
            root: None,
            call_depth: 0,
            expr_depth: 0,
        }
    }
}
