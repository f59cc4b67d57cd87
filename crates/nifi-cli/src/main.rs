//! nifi-deploy CLI - Template deployment and flow state for NiFi
//!
//! This CLI gives operators a terminal interface to:
//! - Replace a deployed template instance with a new version
//! - Start or stop every processor and port of a process group
//! - Inspect a group or processor as JSON or YAML

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
mod output;

use commands::{deploy, inspect, status};
use config::CliConfig;
use error::{CliError, CliResult};
use output::{print_error, OutputFormat};

/// nifi-deploy CLI application
#[derive(Parser)]
#[command(name = "nifi-deploy")]
#[command(about = "Deploy NiFi templates and manage process group state", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "NIFI_DEPLOY_CONFIG", global = true)]
    config: Option<String>,

    /// Output format (table, json, yaml)
    #[arg(short, long, default_value = "table", global = true)]
    output: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Replace the deployed instance of a template
    Deploy(deploy::DeployArgs),

    /// Start or stop a process group
    Status(status::StatusArgs),

    /// Show a process group or processor
    Inspect(inspect::InspectArgs),

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();

    // Dropping the run stops any drain poll at its next await point
    let result = tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => Err(CliError::Cancelled),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e.to_string());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Deploy(args) => deploy::execute(args, &config, cli.output).await,
        Commands::Status(args) => status::execute(args, &config, cli.output).await,
        Commands::Inspect(args) => inspect::execute(args, &config, cli.output).await,
        Commands::Config => {
            let path = match &cli.config {
                Some(path) => path.clone(),
                None => CliConfig::default_config_path()?.display().to_string(),
            };
            println!("Config file: {}", path);
            println!("Endpoint: {}", config.endpoint.as_deref().unwrap_or("(not set)"));
            println!("Controller sections: {}", config.controller_dir().display());
            println!("Sensitive sections: {}", config.sensitive_file().display());
            let drain = config.drain_policy();
            println!("Drain poll interval: {:?}", drain.poll_interval);
            match drain.timeout {
                Some(timeout) => println!("Drain timeout: {:?}", timeout),
                None => println!("Drain timeout: none"),
            }
            println!("Request timeout: {:?}", config.request_timeout());
            Ok(())
        }
    }
}
