//! medql evaluation engine
//!
//! Evaluates path expressions against resources and library definitions
//! against a subject, with Null-propagating three-valued semantics
//! throughout:
//!
//! - **Operators**: arithmetic, comparison, logic, strings, dates and times,
//!   intervals, lists and aggregates
//! - **Queries**: multi-source queries with `let`, `with`/`without`,
//!   `where`, `return`, `aggregate` and `sort`
//! - **Libraries**: definitions cached per context, parameters with
//!   defaults, user functions, includes resolved through a
//!   [`LibraryManager`]
//! - **Clinical**: retrieves from a [`DataSource`], value set and code
//!   system membership through a [`TerminologyProvider`], patient ages
//! - **Extension**: host functions registered in a [`PluginRegistry`]
//!
//! # Example
//!
//! ```
//! use medql_eval::{Engine, EvaluationContext};
//! use medql_types::Value;
//!
//! let engine = Engine::new();
//! let mut ctx = EvaluationContext::new();
//! let value = engine.evaluate_source("Sum({1, 2, 3, 4, 5})", &mut ctx).unwrap();
//! assert_eq!(value, Value::Integer(15));
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod functions;
pub mod library;
pub mod operators;
pub mod query;
pub mod registry;
pub mod retrieve;
pub mod terminology;

pub use context::{CacheStats, EvaluationContext, EvaluationContextBuilder, IterationFrame};
pub use engine::{Engine, EngineConfig};
pub use error::{ErrorKind, EvalError, EvalResult};
pub use library::{CompiledLibrary, FileLibrarySource, InMemoryLibrarySource, LibraryCache, LibraryManager, LibrarySource};
pub use registry::{FunctionDefinition, FunctionParameter, PluginRegistry};
pub use retrieve::{DataSource, DataSourceError, InMemoryDataSource, RetrieveRequest};
pub use terminology::{InMemoryTerminology, TerminologyProvider};
