use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::debugger::{wire, DebugManager};
use crate::program::ProgramFile;
use crate::runner::ProgramRunner;

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "weft - register bytecode VM", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a compiled program's main function
    Run {
        /// Program file (JSON)
        program: PathBuf,

        /// Arguments passed to main
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,

        /// Wait for a debug client before executing
        #[arg(long)]
        debug: bool,

        /// Breakpoint as <source>:<line> (repeatable)
        #[arg(short = 'b', long = "breakpoint")]
        breakpoints: Vec<String>,

        /// Serve the debug protocol on this TCP port (implies --debug)
        #[arg(long)]
        debug_port: Option<u16>,

        /// Maximum call depth per worker
        #[arg(long)]
        max_call_depth: Option<usize>,
    },

    /// List a program's packages, functions and workers
    Inspect {
        /// Program file (JSON)
        program: PathBuf,
    },
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            program,
            args,
            debug,
            breakpoints,
            debug_port,
            max_call_depth,
        } => {
            let settings = Settings::builder()
                .config_path(cli.config)
                .debug_enabled(debug.then_some(true))
                .debug_port(debug_port)
                .breakpoints(breakpoints)
                .max_call_depth(max_call_depth)
                .build()?;
            init_logging(&settings);
            run_program(&program, args, &settings).await
        }

        Commands::Inspect { program } => {
            let settings = Settings::builder().config_path(cli.config).build()?;
            init_logging(&settings);
            let program = ProgramFile::from_path(&program)?;
            print_inspection(&program);
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over the configured filter
fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_program(path: &Path, args: Vec<String>, settings: &Settings) -> Result<()> {
    let program = ProgramFile::from_path(path)?;
    let runner = ProgramRunner::new(program).with_settings(settings.runtime.clone());

    let debugger = if settings.debug.enabled {
        let (manager, client) = DebugManager::from_settings(&settings.debug)?;
        match settings.debug.port {
            Some(port) => {
                tokio::spawn(async move {
                    if let Err(e) = wire::listen(client, port).await {
                        warn!(error = %e, "debug server stopped");
                    }
                });
            }
            None => {
                tokio::spawn(async move {
                    let stdin = tokio::io::stdin();
                    let stderr = tokio::io::stderr();
                    if let Err(e) = wire::serve(client, stdin, stderr).await {
                        warn!(error = %e, "debug bridge stopped");
                    }
                });
            }
        }
        info!(breakpoints = manager.breakpoints().len(), "debugging enabled");
        Some(manager)
    } else {
        None
    };

    let outcome = runner
        .run_main(args, debugger)
        .await
        .with_context(|| format!("{} failed", path.display()))?;

    for value in &outcome.values {
        println!("{}", value.string_value());
    }
    Ok(())
}

fn print_inspection(program: &ProgramFile) {
    println!("Entry package: {}", program.entry_package);
    for package in &program.packages {
        match package.init_function.and_then(|id| program.function(id)) {
            Some(init) => println!("  package {} (init: {})", package.name, init.name),
            None => println!("  package {}", package.name),
        }
    }

    println!("\nFunctions:");
    for (i, function) in program.functions.iter().enumerate() {
        println!(
            "  #{} {}.{} @{}",
            i, function.package, function.name, function.default_worker.code_addr
        );
        for worker in &function.workers {
            println!("      worker {} @{}", worker.name, worker.code_addr);
        }
    }
    println!(
        "\n{} instruction(s), {} constant(s), {} line entries",
        program.code.len(),
        program.constants.len(),
        program.line_numbers.len()
    );
}
