use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sluice_ast::ast::Module;
use sluice_cli::eval::{run_module, ExitRequest, RunConfig, RunOptions, RuntimeFault};
use sluice_cli::host::TraceEmitter;
use sluice_parse::{parse_str, tokenize, LexError, ParseError};
use sluice_types::{check_module, CheckError};
use thiserror::Error;

/// Maximum source file size in bytes (1MB)
const MAX_SOURCE_SIZE: usize = 1_000_000;

#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(about = "Sluice: a small scripting language with composition pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a Sluice program
    Run {
        /// Path to the source file
        file: String,

        /// Write a JSONL trace of host calls to this file
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Arguments exposed to the program as `args`
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Parse a source file and dump the AST
    Parse {
        /// Path to the source file
        file: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
    },

    /// Print the token stream of a source file
    Tokens {
        /// Path to the source file
        file: String,
    },

    /// Parse and statically check a source file without running it
    Check {
        /// Path to the source file
        file: String,
    },
}

#[derive(ValueEnum, Clone, Debug)]
enum Format {
    Pretty,
    Json,
}

/// Static check failures, reported together.
#[derive(Debug, Error)]
#[error("{} static check error(s)", .0.len())]
struct CheckFailed(Vec<CheckError>);

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { file, trace, args } => cmd_run(file, trace, args),
        Commands::Parse { file, format } => cmd_parse(&file, format),
        Commands::Tokens { file } => cmd_tokens(&file),
        Commands::Check { file } => cmd_check(&file),
    };

    if let Err(err) = result {
        if let Some(ExitRequest(code)) = err.downcast_ref::<ExitRequest>() {
            std::process::exit(*code);
        }
        eprintln!("{}", diagnostic(&err));
        std::process::exit(1);
    }
}

/// Logging goes to stderr, filtered by `SLUICE_LOG` (default `warn`).
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("SLUICE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn diagnostic(err: &anyhow::Error) -> String {
    if let Some(f) = err.downcast_ref::<RuntimeFault>() {
        return format!("error[{}]: {} at {}", f.kind, f.message, f.span);
    }
    if let Some(e) = err.downcast_ref::<ParseError>() {
        return format!(
            "error[ParseError]: expected {}, found {} at {}:{}",
            e.expected, e.found, e.line, e.col
        );
    }
    if let Some(e) = err.downcast_ref::<LexError>() {
        return format!("error[LexError]: {} at {}:{}", e.kind, e.line, e.col);
    }
    if let Some(CheckFailed(errors)) = err.downcast_ref::<CheckFailed>() {
        let lines: Vec<String> = errors
            .iter()
            .map(|e| match e {
                CheckError::ConstReassignment { name, span } => format!(
                    "error[ConstReassignment]: cannot reassign constant `{name}` at {span}"
                ),
            })
            .collect();
        return lines.join("\n");
    }
    format!("error: {err:#}")
}

fn load_source(path: &str) -> Result<String> {
    let src = std::fs::read_to_string(path).with_context(|| format!("reading `{path}`"))?;
    if src.len() > MAX_SOURCE_SIZE {
        bail!(
            "source file exceeds {}MB limit ({} bytes)",
            MAX_SOURCE_SIZE / 1_000_000,
            src.len()
        );
    }
    Ok(src)
}

fn load_and_check(path: &str) -> Result<Module> {
    let src = load_source(path)?;
    let module = parse_str(path, &src)?;
    check_module(&module).map_err(CheckFailed)?;
    Ok(module)
}

fn cmd_run(file: String, trace: Option<PathBuf>, args: Vec<String>) -> Result<()> {
    let module = load_and_check(&file)?;

    let tracer = match &trace {
        Some(path) => {
            let f = std::fs::File::create(path)
                .with_context(|| format!("creating trace file `{}`", path.display()))?;
            TraceEmitter::new(Box::new(std::io::BufWriter::new(f)), &file)?
        }
        None => TraceEmitter::disabled(),
    };
    let options = RunOptions {
        args,
        out: Box::new(std::io::stdout()),
        tracer,
        config: RunConfig::default(),
    };
    run_module(&module, options)?;
    if let Some(path) = &trace {
        eprintln!("Trace written to {}", path.display());
    }
    Ok(())
}

fn cmd_parse(file: &str, format: Format) -> Result<()> {
    let src = load_source(file)?;
    let module = parse_str(file, &src)?;

    match format {
        Format::Pretty => println!("{:#?}", module),
        Format::Json => println!("{}", serde_json::to_string_pretty(&module)?),
    }
    Ok(())
}

fn cmd_tokens(file: &str) -> Result<()> {
    let src = load_source(file)?;
    for tok in tokenize(&src)? {
        println!("{}:{}\t{:?}", tok.span.line, tok.span.col, tok.kind);
    }
    Ok(())
}

fn cmd_check(file: &str) -> Result<()> {
    load_and_check(file)?;
    println!("{file}: ok");
    Ok(())
}
