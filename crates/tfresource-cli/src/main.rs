mod commands;

use clap::{Parser, Subcommand};
use commands::{
    EXIT_BACKEND_ERROR, EXIT_ENGINE_ERROR, EXIT_FAILURE, EXIT_INVALID_REQUEST, EXIT_MISSING_PLAN,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tfresource_engine::EngineConfig;

const LOG_ENV: &str = "TFRESOURCE_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "tfresource",
    version,
    about = "Pipeline resource that plans, applies and destroys Terraform environments"
)]
struct Cli {
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one lifecycle step. Reads the request JSON from stdin and prints
    /// the resulting version and metadata to stdout.
    Out {
        /// Directory the request's relative paths resolve against.
        source_dir: PathBuf,
        /// Read the request from a file instead of stdin.
        #[arg(long)]
        request: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    // stdout carries the response; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let result = match cli.command {
        Commands::Out {
            source_dir,
            request,
        } => commands::out::run(&source_dir, request.as_deref(), EngineConfig::from_env()),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("invalid request:") {
                EXIT_INVALID_REQUEST
            } else if msg.starts_with("missing plan:") {
                EXIT_MISSING_PLAN
            } else if msg.starts_with("engine failure:") {
                EXIT_ENGINE_ERROR
            } else if msg.starts_with("backend failure:") {
                EXIT_BACKEND_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
