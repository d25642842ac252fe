//! Runbox CLI: the main entry point.
//!
//! Commands:
//! - `serve`   Start the HTTP task API
//! - `run`     Run one task in the foreground, printing events as JSON lines
//! - `worker`  Child-process worker (spawned by the supervisor)
//! - `tools`   List built-in tools
//! - `config`  Show, validate or locate the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use runbox_config::IsolationMode;

mod commands;

#[derive(Parser)]
#[command(
    name = "runbox",
    about = "Runbox: supervised LLM agent task runner",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP task API
    Serve {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Worker isolation: in-process or process
        #[arg(long)]
        isolation: Option<IsolationMode>,
    },

    /// Run a single task and print its events
    Run(commands::run::RunArgs),

    /// Run one task from a spec on stdin (used by the supervisor)
    #[command(hide = true)]
    Worker,

    /// List built-in tools
    Tools,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration, secrets redacted
    Show,
    /// Check the configuration file for errors
    Validate,
    /// Print the configuration file path
    Path,
    /// Print a default configuration file
    Init {
        /// Write to this path instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries events for `run` and `worker`
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve {
            host,
            port,
            isolation,
        } => commands::serve::run(host, port, isolation).await?,
        Commands::Run(args) => commands::run::run(args).await?,
        Commands::Worker => {
            let code = commands::worker::run().await;
            std::process::exit(code);
        }
        Commands::Tools => commands::tools::run().await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init { output } => commands::config_cmd::init(output).await?,
        },
    }

    Ok(())
}
