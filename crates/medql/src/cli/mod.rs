//! Command-line front end for medql
//!
//! Each subcommand lives in its own module with a config struct and an
//! entry point; the binary only parses arguments and dispatches.

pub mod eval;
pub mod output;
pub mod resolver;
pub mod run;
pub mod translate;
pub mod validate;
