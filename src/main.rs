//! Command-line front end: compiles one IDL document into a C++ header and
//! source pair.

use std::{
    fs,
    io::{self, IsTerminal},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Context;
use clap::{ArgAction, Parser};
use idlgen::{
    GenerateError, GenerationTarget, GeneratorConfig, Outcome, generate_target,
    generators::EmitConfig, lexer::render_snippet,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "idlgen", version)]
#[command(about = "Generate C++ bindings from an IDL document")]
struct Cli {
    /// IDL document to compile
    input: PathBuf,

    /// Path of the generated header
    #[arg(long)]
    header: PathBuf,

    /// Path of the generated source
    #[arg(long)]
    source: PathBuf,

    /// Skip generation when the outputs are newer than the input
    #[arg(long)]
    incremental: bool,

    /// Spaces per indentation level in generated code
    #[arg(long, default_value_t = 4)]
    indent: u8,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "idlgen=warn",
        1 => "idlgen=info",
        2 => "idlgen=debug",
        _ => "idlgen=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let target = GenerationTarget::new(&cli.input, &cli.source, &cli.header);
    let config = GeneratorConfig {
        emit: EmitConfig {
            indent_spaces: cli.indent,
        },
        incremental: cli.incremental,
    };

    let outcome = generate_target(&target, &config)
        .with_context(|| format!("cannot generate bindings for {}", cli.input.display()))?;
    match outcome {
        Outcome::Generated => info!("wrote {} and {}", cli.header.display(), cli.source.display()),
        Outcome::UpToDate => info!("outputs are up to date"),
    }
    Ok(())
}

/// Prints the error chain, plus the offending source lines for load errors
/// that carry a location.
fn report(err: &anyhow::Error) {
    eprintln!("error: {err:#}");

    let Some(GenerateError::Load { path, source }) = err.downcast_ref::<GenerateError>() else {
        return;
    };
    let Some(location) = source.location() else {
        return;
    };
    if let Ok(text) = fs::read_to_string(path) {
        let snippet = render_snippet(&text, location, 1, io::stderr().is_terminal());
        eprintln!("  --> {}:{location}", path.display());
        eprint!("{snippet}");
    }
}
