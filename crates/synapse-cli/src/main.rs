//! Synapse CLI
//!
//! Command-line client for Synapse: edits settings and tabs locally and keeps
//! them in sync with a Synapse server.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use synapse_core::{Config, SyncManager};

mod commands;
mod output;

use commands::Client;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "synapse")]
#[command(about = "Synapse - settings and tabs synced across devices")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in to a sync server and pull this account's state
    Login {
        /// Server URL, e.g. http://localhost:8080
        #[arg(long)]
        server: String,
        /// Session token issued for this account
        #[arg(long, env = "SYNAPSE_SESSION_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Push final state and sign out of this device
    Logout,
    /// Show sync status
    Status,
    /// Push local state to the server
    Sync {
        /// Overwrite the server copy even if it is newer
        #[arg(long)]
        force: bool,
    },
    /// Replace local state with the server copy
    Pull,
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        command: Option<SettingsCommands>,
    },
    /// Manage tabs
    Tabs {
        #[command(subcommand)]
        command: Option<TabCommands>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show settings (API keys masked)
    Show,
    /// Store an API key
    Key {
        /// Provider (gemini, deepseek)
        provider: String,
        key: String,
    },
    /// Set the default model
    Model {
        model: String,
        /// Provider serving the model (gemini, deepseek)
        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Set the sampling temperature (0.0 - 2.0)
    Temperature { value: f64 },
    /// Replace a system prompt
    Prompt {
        /// Prompt kind (improver, critic)
        kind: String,
        text: String,
    },
    /// Turn a feature on or off
    Feature {
        /// Feature name (show-token-usage, enable-gemini-cache)
        name: String,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Restore default settings
    Reset,
}

#[derive(Subcommand)]
enum TabCommands {
    /// List open tabs
    #[command(alias = "ls")]
    List,
    /// Show a tab and its contents
    Show {
        /// Tab ID (full UUID or prefix)
        id: String,
    },
    /// Open a new tab
    New {
        /// Tab type (chat, optimizer)
        #[arg(default_value = "chat")]
        kind: String,
    },
    /// Close a tab
    #[command(alias = "rm")]
    Close {
        /// Tab ID (full UUID or prefix)
        id: String,
    },
    /// Make a tab the active one
    Activate {
        /// Tab ID (full UUID or prefix)
        id: String,
    },
    /// Rename a tab
    Rename {
        /// Tab ID (full UUID or prefix)
        id: String,
        title: String,
    },
    /// Add a message to a chat tab
    Say {
        /// Tab ID (full UUID or prefix)
        id: String,
        message: String,
        /// Message role (user, assistant, system)
        #[arg(short, long, default_value = "user")]
        role: String,
    },
    /// Set the initial prompt of an optimizer tab
    Prompt {
        /// Tab ID (full UUID or prefix)
        id: String,
        text: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (server_url, sync_enabled, debounce_ms, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.clone().unwrap_or_else(Config::config_file_path);

    // Commands that don't need the sync client
    match &cli.command {
        Commands::Config { command } => {
            return handle_config_command(command.clone(), &config_path, &output);
        }
        Commands::Login { server, token } => {
            let config = Config::load_from_path(&config_path)?;
            init_logging(&config, cli.verbose);
            return commands::session::login(&config_path, server.clone(), token.clone(), &output)
                .await;
        }
        _ => {}
    }

    let mut config = Config::load_from_path(&config_path).context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);
    let client = SyncManager::open(&config)?;

    // Reconcile with the server before working on local state. Manual sync
    // and pull skip this so a conflict is reported instead of resolved.
    let bootstrap = config.sync_configured()
        && matches!(cli.command, Commands::Settings { .. } | Commands::Tabs { .. });
    if bootstrap {
        client.initialize().await;
    }

    let result = match cli.command {
        Commands::Login { .. } | Commands::Config { .. } => unreachable!(), // Handled above
        Commands::Logout => {
            commands::session::logout(&client, &mut config, &config_path, &output).await
        }
        Commands::Status => commands::status::show(&client, &config, &output),
        Commands::Sync { force } => commands::sync::sync(&client, &config, force, &output).await,
        Commands::Pull => commands::sync::pull(&client, &config, &output).await,
        Commands::Settings { command } => handle_settings_command(command, &client, &output),
        Commands::Tabs { command } => handle_tab_command(command, &client, &output),
    };

    // Debounced pushes would otherwise die with the process
    client.flush().await;
    if bootstrap {
        warn_on_sync_error(&client, &output);
    }

    result
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: &Path,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

fn handle_settings_command(
    command: Option<SettingsCommands>,
    client: &Client,
    output: &Output,
) -> Result<()> {
    use commands::settings;

    match command {
        Some(SettingsCommands::Show) | None => settings::show(client, output),
        Some(SettingsCommands::Key { provider, key }) => {
            settings::set_key(client, provider, key, output)
        }
        Some(SettingsCommands::Model { model, provider }) => {
            settings::set_model(client, model, provider, output)
        }
        Some(SettingsCommands::Temperature { value }) => {
            settings::set_temperature(client, value, output)
        }
        Some(SettingsCommands::Prompt { kind, text }) => {
            settings::set_prompt(client, kind, text, output)
        }
        Some(SettingsCommands::Feature { name, enabled }) => {
            settings::set_feature(client, name, enabled, output)
        }
        Some(SettingsCommands::Reset) => settings::reset(client, output),
    }
}

fn handle_tab_command(command: Option<TabCommands>, client: &Client, output: &Output) -> Result<()> {
    use commands::tabs;

    match command {
        Some(TabCommands::List) | None => tabs::list(client, output),
        Some(TabCommands::Show { id }) => tabs::show(client, id, output),
        Some(TabCommands::New { kind }) => tabs::create(client, kind, output),
        Some(TabCommands::Close { id }) => tabs::close(client, id, output),
        Some(TabCommands::Activate { id }) => tabs::activate(client, id, output),
        Some(TabCommands::Rename { id, title }) => tabs::rename(client, id, title, output),
        Some(TabCommands::Say { id, message, role }) => {
            tabs::say(client, id, role, message, output)
        }
        Some(TabCommands::Prompt { id, text }) => tabs::set_prompt(client, id, text, output),
    }
}

/// Auto-sync failures never fail the command, only show up as a warning
fn warn_on_sync_error(client: &Client, output: &Output) {
    let report = client.status();
    if report.overall() == synapse_core::SyncStatus::Error {
        output.warn("Sync failed, working from local state. See `synapse status`.");
    }
}

/// Initialize logging to stderr or the configured log file
///
/// `RUST_LOG` wins; otherwise warnings only, or debug with `--verbose`.
fn init_logging(config: &Config, verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "synapse_core={},synapse_cli={}",
            default_level, default_level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Ignore the error if a subscriber is already installed
    match config.log_file.as_ref() {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file {:?}: {}", path, e);
                let _ = builder.with_writer(std::io::stderr).try_init();
            }
        },
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }

    debug!("Logging initialized");
}
