// This is the core of the `devrig` application.
// It parses command-line arguments and dispatches to the appropriate subcommand logic.

mod commands; // Handles individual subcommand logic (apply, plan, version).
mod config; // The YAML configuration front-end.
mod core; // The resource model, resolver, reconciler, state cache and executor.
mod installers; // Concrete installer backends devrig ships.
mod logger; // Manages application logging.
mod paths; // Resolves the config dir / state file locations.

use std::path::PathBuf;

// Use 'clap' for command-line argument parsing.
use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::version;
use crate::log_debug;

/// Defines the command-line interface (CLI) for `devrig`.
#[derive(Parser)]
#[command(name = "devrig")]
struct Cli {
    /// Enables detailed debug output.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Defines available subcommands for `devrig`.
    #[command(subcommand)]
    command: Commands,
}

/// Enumerates all supported subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Reconciles declared resources against persisted state and installs,
    /// upgrades, reinstalls or removes whatever is needed.
    Apply {
        /// Declaration directory (defaults to `~/.devrig/config`).
        #[arg(long)]
        config: Option<PathBuf>,
        /// State file (defaults to `~/.devrig/state.json`).
        #[arg(long)]
        state: Option<PathBuf>,
        /// Maximum number of actions to run concurrently within a layer.
        #[arg(long, default_value_t = 4)]
        parallelism: usize,
        /// Refresh every floating-version ("latest") tool, even if it would
        /// not otherwise need an action.
        #[arg(long)]
        sync: bool,
    },
    /// Shows what `apply` would do, without making any changes.
    Plan {
        /// Declaration directory (defaults to `~/.devrig/config`).
        #[arg(long)]
        config: Option<PathBuf>,
        /// State file (defaults to `~/.devrig/state.json`).
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Show the current version of devrig.
    Version,
}

fn main() {
    let cli = Cli::parse();
    logger::init(cli.debug);
    log_debug!("[devrig] command line arguments parsed, debug={}", cli.debug);

    let result = match cli.command {
        Commands::Apply {
            config,
            state,
            parallelism,
            sync,
        } => commands::apply::run(commands::apply::ApplyOptions {
            config,
            state,
            parallelism,
            sync,
        }),
        Commands::Plan { config, state } => commands::plan::run(commands::plan::PlanOptions { config, state }),
        Commands::Version => {
            version::run();
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{} {}", "[ERROR]".bright_red(), err);
        std::process::exit(1);
    }
}
