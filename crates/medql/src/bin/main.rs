//! medql command-line interface

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use medql::cli::output::{self, ColorMode, OutputFormat};
use medql::cli::{eval, run, translate, validate};
use std::path::PathBuf;

/// medql command-line tool
#[derive(Parser)]
#[command(name = "medql")]
#[command(author, version, about = "Clinical expression language tools", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Result format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Color output
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a path expression against a JSON resource
    Eval {
        /// Path expression, e.g. "name.given.first()"
        expression: String,

        /// Resource or Bundle (JSON)
        #[arg(short, long)]
        resource: Option<PathBuf>,

        /// External constants available as %name (name=value)
        #[arg(short, long = "constant")]
        constants: Vec<String>,
    },

    /// Evaluate a library's definitions for each subject in the data
    Run {
        /// Library source (.cql) or interchange document (.json)
        file: PathBuf,

        /// Resource or Bundle to retrieve from (JSON)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// ValueSet resources with expansions (JSON)
        #[arg(short, long)]
        terminology: Vec<PathBuf>,

        /// Only evaluate for the subject with this id
        #[arg(short, long)]
        subject: Option<String>,

        /// Parameters (name=value)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Definitions to evaluate (default: every public definition)
        #[arg(short = 'D', long = "define")]
        defines: Vec<String>,

        /// Library search paths
        #[arg(short = 'I', long = "library-path")]
        library_paths: Vec<PathBuf>,
    },

    /// Translate library source to the JSON interchange format
    Translate {
        /// Library source file
        file: PathBuf,

        /// Pretty-print output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Check libraries for syntax and linking errors
    Validate {
        /// Library files (.cql or .json)
        files: Vec<PathBuf>,

        /// Library search paths
        #[arg(short = 'I', long = "library-path")]
        library_paths: Vec<PathBuf>,
    },
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    output::setup_colors(cli.color);
    init_logging(cli.verbose);

    if let Err(e) = dispatch(cli) {
        eprintln!("{}", output::format_error(&e));
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Eval {
            expression,
            resource,
            constants,
        } => eval::eval(eval::EvalConfig {
            expression,
            resource,
            constants,
            format: cli.format,
            output_file: cli.output,
        }),

        Commands::Run {
            file,
            data,
            terminology,
            subject,
            params,
            defines,
            library_paths,
        } => run::run(run::RunConfig {
            file,
            data,
            terminology,
            subject,
            params,
            defines,
            library_paths,
            format: cli.format,
            output_file: cli.output,
        }),

        Commands::Translate { file, pretty } => translate::translate(translate::TranslateConfig {
            file,
            pretty,
            output_file: cli.output,
        }),

        Commands::Validate { files, library_paths } => {
            validate::validate(validate::ValidateConfig { files, library_paths })
        }
    }
}
