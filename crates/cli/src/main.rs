//! Groundwork CLI
//!
//! Main entry point for the groundwork command-line tool: ingest documents
//! into the local knowledge base and retrieve ranked, cited context from it.

mod commands;

use clap::{Parser, Subcommand};
use commands::{ImagesCommand, IngestCommand, RemoveCommand, RetrieveCommand, StatsCommand};
use groundwork_core::{
    config::AppConfig,
    logging::{self, LogFormat},
};
use std::path::PathBuf;

/// Groundwork - hybrid retrieval over a local knowledge base
#[derive(Parser, Debug)]
#[command(name = "groundwork")]
#[command(about = "Hybrid retrieval over a local knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the SQLite database
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest markdown and text documents
    Ingest(IngestCommand),

    /// Retrieve ranked context for a query
    Retrieve(RetrieveCommand),

    /// Remove a document
    Remove(RemoveCommand),

    /// Find images by description
    Images(ImagesCommand),

    /// Show knowledge base statistics
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load_with(cli.workspace, cli.config)?.with_overrides(
        cli.database,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    let format = if config.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init_logging(config.log_level.as_deref(), config.no_color, format)?;

    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Database: {:?}", config.database_path());

    config.validate()?;
    config.ensure_groundwork_dir()?;

    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Retrieve(_) => "retrieve",
        Commands::Remove(_) => "remove",
        Commands::Images(_) => "images",
        Commands::Stats(_) => "stats",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Retrieve(cmd) => cmd.execute(&config).await,
        Commands::Remove(cmd) => cmd.execute(&config).await,
        Commands::Images(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::debug!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    Ok(result?)
}
