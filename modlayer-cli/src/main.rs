//! modlayer command-line interface.
//!
//! A thin collaborator around the deployment engine: every subcommand
//! builds the service, issues one request and prints the resulting report.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "modlayer",
    version,
    about = "Deploy packaged content bundles into a shared target directory"
)]
struct Cli {
    /// State directory (default: ~/.modlayer).
    #[arg(long, global = true, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Answer prompts with their defaults (accept computed priority order,
    /// cancel on integrity drift).
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show settings, mode and per-package deployment state.
    Status,

    /// List installed packages.
    Packages,

    /// Import a content tree as a new package.
    Import {
        /// Directory holding the package's content.
        path: PathBuf,

        /// Display name (the package id is derived from it). Defaults to
        /// the directory name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Remove an installed package (must be disabled first).
    Uninstall {
        /// Package id.
        id: String,
    },

    /// Deploy a package into the target.
    Enable {
        /// Package id.
        id: String,

        /// Explicit priority order (highest first, comma-separated ids),
        /// overriding the computed one.
        #[arg(long, value_delimiter = ',', value_name = "ID,ID,...")]
        order: Option<Vec<String>>,
    },

    /// Withdraw a package from the target.
    Disable {
        /// Package id.
        id: String,
    },

    /// Reconcile the overlay with current priorities (overlay mode).
    Refresh,

    /// Compare a package's contents against its recorded listing.
    Check {
        /// Package id.
        id: String,
    },

    /// Persist an explicit priority order for a conflict set.
    Priority {
        /// Package ids, highest priority first.
        #[arg(value_delimiter = ',', value_name = "ID,ID,...", required = true)]
        order: Vec<String>,
    },

    /// Switch the target between plain and overlay deployment.
    Mode {
        #[command(subcommand)]
        command: ModeCommands,
    },

    /// Show or change deployment settings.
    Config {
        /// Set the target directory.
        #[arg(long, value_name = "DIR")]
        target: Option<PathBuf>,

        /// Enable or disable the sandbox ("on"/"off").
        #[arg(long, value_name = "on|off")]
        sandbox: Option<String>,
    },
}

#[derive(Subcommand)]
enum ModeCommands {
    /// Convert the target into the junction-backed overlay form.
    Setup,

    /// Restore the target to a plain, self-contained tree.
    Teardown,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let state = commands::state_dir(cli.state_dir.clone());
    let _log_guard = modlayer::telemetry::init_logging("modlayer=info", None);
    tracing::debug!(state = %state.root().display(), "Using state directory");

    let result = match cli.command {
        Commands::Status => commands::status::run(&state).await,
        Commands::Packages => commands::packages::list(&state).await,
        Commands::Import { path, name } => commands::packages::import(&state, path, name).await,
        Commands::Uninstall { id } => commands::packages::uninstall(&state, &id).await,
        Commands::Enable { id, order } => {
            commands::deploy::enable(&state, &id, order, cli.yes).await
        }
        Commands::Disable { id } => commands::deploy::disable(&state, &id).await,
        Commands::Refresh => commands::deploy::refresh(&state).await,
        Commands::Check { id } => commands::deploy::check(&state, &id).await,
        Commands::Priority { order } => commands::deploy::priority(&state, order).await,
        Commands::Mode { command } => match command {
            ModeCommands::Setup => commands::mode::setup(&state, cli.yes).await,
            ModeCommands::Teardown => commands::mode::teardown(&state).await,
        },
        Commands::Config { target, sandbox } => {
            commands::config::run(&state, target, sandbox).await
        }
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
