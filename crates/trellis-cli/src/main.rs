//! Trellis CLI - extensible command-line host.
//!
//! The binary bootstraps the host (home directory, config, logging,
//! service container, entry-point discovery) and runs one plugin
//! lifecycle command per invocation.
//!
//! Exit codes: 0 success, 1 hard failure, 2 rejected input, 3 unhealthy
//! check result.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;
mod host;
mod output;

use host::Host;
use output::OutputFormat;

/// Trellis - extensible command-line host
#[derive(Parser)]
#[command(name = "trellis")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty (default) or json
    #[arg(long, global = true, default_value = "pretty")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage plugins
    Plugins {
        #[command(subcommand)]
        command: PluginCommands,
    },
}

#[derive(Subcommand)]
enum PluginCommands {
    /// Create a new plugin skeleton
    Scaffold {
        /// Plugin name
        name: String,

        /// Directory to create the plugin in (defaults to the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Template directory to copy instead of the built-in skeleton
        #[arg(long)]
        template: Option<PathBuf>,

        /// Sign the entry executable with the host's signing key
        #[arg(long)]
        sign: bool,

        /// Replace a non-empty target directory
        #[arg(short, long)]
        force: bool,
    },

    /// Install a plugin directory into the plugins root
    Install {
        /// Source directory containing plugin.run
        source: PathBuf,

        /// Replace an existing installation
        #[arg(short, long)]
        force: bool,

        /// Report the destination without installing
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove an installed plugin
    Uninstall {
        /// Plugin name
        name: String,
    },

    /// Probe an installed plugin's health hook
    Check {
        /// Plugin name
        name: String,
    },

    /// Show an installed plugin's metadata
    Info {
        /// Plugin name
        name: String,
    },

    /// List installed plugins
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::parse(&cli.format);

    let host = match Host::bootstrap(cli.verbose, format == OutputFormat::Json).await {
        Ok(host) => host,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let command_name = command_name(&cli.command);
    host.pre_execute(command_name).await;
    let result = run(&host, format, cli.command).await;
    host.post_execute(command_name, result.is_ok()).await;
    host.shutdown().await;

    match result {
        Ok(code) => code,
        Err(e) => {
            output::render_error(format, &e);
            if e.is_validation() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Plugins { command } => match command {
            PluginCommands::Scaffold { .. } => "plugins scaffold",
            PluginCommands::Install { .. } => "plugins install",
            PluginCommands::Uninstall { .. } => "plugins uninstall",
            PluginCommands::Check { .. } => "plugins check",
            PluginCommands::Info { .. } => "plugins info",
            PluginCommands::List => "plugins list",
        },
    }
}

async fn run(
    host: &Host,
    format: OutputFormat,
    command: Commands,
) -> trellis_plugins::PluginResult<ExitCode> {
    match command {
        Commands::Plugins { command } => match command {
            PluginCommands::Scaffold {
                name,
                output,
                template,
                sign,
                force,
            } => commands::plugins::scaffold(
                host,
                format,
                &name,
                output.as_deref(),
                template.as_deref(),
                sign,
                force,
            ),
            PluginCommands::Install {
                source,
                force,
                dry_run,
            } => commands::plugins::install(host, format, &source, force, dry_run),
            PluginCommands::Uninstall { name } => {
                commands::plugins::uninstall(host, format, &name)
            }
            PluginCommands::Check { name } => commands::plugins::check(host, format, &name).await,
            PluginCommands::Info { name } => commands::plugins::info(host, format, &name),
            PluginCommands::List => commands::plugins::list(host, format),
        },
    }
}
