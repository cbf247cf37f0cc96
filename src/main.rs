use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vaultfind::{commands, daemon, logging, Result};

#[derive(Parser)]
#[command(name = "vaultfind")]
#[command(about = "Semantic search for Markdown note vaults")]
#[command(version)]
struct Cli {
    /// Path to an alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for notes semantically related to a query
    Search {
        query: String,
        /// Max results
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        /// Minimum similarity score
        #[arg(short = 's', long, default_value_t = 0.6)]
        min_score: f32,
        /// Filter by tag (repeatable)
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,
        /// Filter by path prefix
        #[arg(short = 'p', long)]
        path_prefix: Option<String>,
    },
    /// Find notes similar to a reference file
    Similar {
        file_path: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// Check daemon and indexing status
    Status,
    /// Reindex vault contents
    Reindex {
        /// Drop and recreate the collection first
        #[arg(long)]
        force: bool,
    },
    /// Start the daemon
    Start {
        /// Run in the foreground instead of detaching
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the daemon
    Stop,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage vault paths
    Vault {
        #[command(subcommand)]
        command: VaultCommands,
    },
    /// Show the daemon log
    Logs {
        /// Keep following the log file
        #[arg(short = 'f', long)]
        follow: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Create a new default configuration file
    Init,
    /// View the current configuration
    View,
    /// Show the config file path
    Path,
    /// Set a configuration value
    Set { key: String, value: String },
    /// Print a configuration template for a setup
    Template { name: String },
}

#[derive(Subcommand)]
enum VaultCommands {
    /// List all configured vault paths
    List,
    /// Add a vault path to the configuration
    Add { path: PathBuf },
    /// Remove a vault path from the configuration
    Remove { path: PathBuf },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_ref())?;

    // The daemon child process logs to the configured file; everything else
    // logs to stderr.
    let daemon_mode = matches!(cli.command, Commands::Start { .. })
        && std::env::var_os(daemon::DAEMON_ENV).is_some();
    let _log_guard = if daemon_mode {
        logging::init(&config.daemon.log_level, Some(&config.daemon.log_file))?
    } else {
        logging::init(&config.daemon.log_level, None)?
    };

    match cli.command {
        Commands::Search {
            query,
            limit,
            min_score,
            tags,
            path_prefix,
        } => commands::search(&config, &query, limit, min_score, tags, path_prefix)?,
        Commands::Similar { file_path, limit } => commands::similar(&config, &file_path, limit)?,
        Commands::Status => commands::status(&config)?,
        Commands::Reindex { force } => commands::reindex(&config, force)?,
        Commands::Start { foreground } => {
            commands::start(config, cli.config.as_deref(), foreground || daemon_mode).await?;
        }
        Commands::Stop => commands::stop(&config)?,
        Commands::Config { command } => match command {
            ConfigCommands::Init => commands::config_init(cli.config.as_deref())?,
            ConfigCommands::View => commands::config_view(&config)?,
            ConfigCommands::Path => commands::config_path()?,
            ConfigCommands::Set { key, value } => commands::config_set(&key, &value)?,
            ConfigCommands::Template { name } => commands::config_template(&name)?,
        },
        Commands::Vault { command } => match command {
            VaultCommands::List => commands::vault_list(&config)?,
            VaultCommands::Add { path } => commands::vault_add(&path)?,
            VaultCommands::Remove { path } => commands::vault_remove(&path)?,
        },
        Commands::Logs { follow } => commands::logs(&config, follow)?,
    }

    Ok(())
}
