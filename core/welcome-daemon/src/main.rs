//! welcome-daemon: mirrors Welcome presence onto occupancy entries.
//!
//! Polls the Welcome directory on a fixed interval and keeps a SQLite registry
//! of boolean "someone is here" entries in step with it.
//!
//! ## Subcommands
//!
//! - `run`: Refresh loop (default when no subcommand is given)
//! - `once`: Single refresh, prints the cycle report as JSON
//! - `entries`: Prints the persisted entries as JSON
//! - `history`: Prints recent activation writes as JSON

mod config;
mod db;
mod http_directory;
mod logging;
mod scheduler;

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error, info};

use config::{DaemonConfig, Overrides, Settings};
use db::SqliteRegistry;
use http_directory::HttpDirectory;
use scheduler::Scheduler;
use welcome_core::{LoadOptions, MemoryRegistry, ReconciliationEngine, Registry};

#[derive(Parser)]
#[command(name = "welcome-daemon")]
#[command(about = "Welcome presence to occupancy entry mirror")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.welcome/daemon.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory server base URL
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Home whose rooms and presence are mirrored
    #[arg(long, global = true)]
    home_id: Option<String>,

    /// Seconds between refresh cycles
    #[arg(long, global = true, value_name = "SECS")]
    interval: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh on a fixed interval until killed
    Run,

    /// Run one refresh and print what it did
    Once {
        /// Reconcile against an in-memory copy; the database is not written
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the persisted entries
    Entries,

    /// Print recent activation changes, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match config::load_config(cli.config.clone()) {
        Ok(config) => config,
        Err(err) => {
            let _guard = logging::init(None);
            error!(error = %err, "Failed to load daemon config");
            std::process::exit(1);
        }
    };
    let config = config.with_overrides(Overrides {
        server_url: cli.server_url,
        home_id: cli.home_id,
        interval_secs: cli.interval,
    });

    let _guard = logging::init(config.log_directory());

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => resolve(&config).and_then(|settings| run(&settings)),
        Commands::Once { dry_run } => resolve(&config).and_then(|settings| once(&settings, dry_run)),
        Commands::Entries => open_registry(&config).and_then(|registry| {
            let entries = registry.entries().map_err(|err| err.to_string())?;
            print_json(&entries)
        }),
        Commands::History { limit } => open_registry(&config).and_then(|registry| {
            let events = registry.list_events(limit)?;
            print_json(&events)
        }),
    };

    if let Err(err) = result {
        error!(error = %err, "welcome-daemon failed");
        std::process::exit(1);
    }
}

fn resolve(config: &DaemonConfig) -> Result<Settings, String> {
    config.resolve().map_err(String::from)
}

fn open_registry(config: &DaemonConfig) -> Result<SqliteRegistry, String> {
    let path = config.database_path().map_err(String::from)?;
    SqliteRegistry::new(path)
}

fn load_options(settings: &Settings) -> LoadOptions {
    LoadOptions {
        home_id: settings.home_id.clone(),
        attrs_namespace: settings.attrs_namespace.clone(),
    }
}

fn run(settings: &Settings) -> Result<(), String> {
    let registry = SqliteRegistry::new(settings.database_path.clone())?;
    let directory = HttpDirectory::new(&settings.server_url, settings.request_timeout);
    let mut engine = ReconciliationEngine::new(registry);

    info!(
        server_url = %settings.server_url,
        database = %settings.database_path.display(),
        "welcome-daemon started"
    );

    Scheduler::new(settings.interval).run(
        &mut engine,
        &directory,
        &load_options(settings),
        |report| {
            if report.is_quiet() {
                debug!(entries = report.updates.len(), "Nothing changed");
            }
        },
    );
    Ok(())
}

fn once(settings: &Settings, dry_run: bool) -> Result<(), String> {
    let directory = HttpDirectory::new(&settings.server_url, settings.request_timeout);
    let options = load_options(settings);

    let result = if dry_run {
        let persisted = match SqliteRegistry::open_read_only(settings.database_path.clone())? {
            Some(registry) => registry.entries().map_err(String::from)?,
            None => Vec::new(),
        };
        ReconciliationEngine::new(MemoryRegistry::with_entries(persisted))
            .refresh(&directory, &options)
    } else {
        let registry = SqliteRegistry::new(settings.database_path.clone())?;
        ReconciliationEngine::new(registry).refresh(&directory, &options)
    };
    let report = result.map_err(String::from)?;

    print_json(&report)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| format!("Failed to encode output: {}", err))?;
    println!("{}", json);
    Ok(())
}
